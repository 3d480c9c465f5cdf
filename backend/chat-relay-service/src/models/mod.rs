pub mod chat;
pub mod message;
pub mod user;

use serde::{de, Deserialize, Deserializer};

pub use chat::{ChatKind, ChatListEntry, ChatMemberSummary};
pub use message::{Message, MessageKind, NewMessage, ReadReceipt};
pub use user::{PublicUser, User};

pub type UserId = i64;
pub type ChatId = i64;
pub type MessageId = i64;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    fn into_id<E: de::Error>(self) -> Result<i64, E> {
        match self {
            RawId::Number(n) => Ok(n),
            RawId::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid id: {s:?}"))),
        }
    }
}

/// Accepts an identifier as either a JSON number or a numeric string.
///
/// Browser clients frequently send ids read back from DOM attributes, so
/// `"7"` and `7` must both resolve to chat 7.
pub fn flexible_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer)?.into_id()
}

pub fn flexible_id_opt<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawId>::deserialize(deserializer)?
        .map(RawId::into_id)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(deserialize_with = "flexible_id")]
        id: i64,
        #[serde(default, deserialize_with = "flexible_id_opt")]
        other: Option<i64>,
    }

    #[test]
    fn test_flexible_id_accepts_number_and_string() {
        let a: Probe = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        let b: Probe = serde_json::from_str(r#"{"id": "7", "other": "12"}"#).unwrap();
        assert_eq!(a.id, 7);
        assert_eq!(a.other, None);
        assert_eq!(b.id, 7);
        assert_eq!(b.other, Some(12));
    }

    #[test]
    fn test_flexible_id_rejects_non_numeric() {
        assert!(serde_json::from_str::<Probe>(r#"{"id": "seven"}"#).is_err());
        assert!(serde_json::from_str::<Probe>(r#"{"id": true}"#).is_err());
    }

    #[test]
    fn test_flexible_id_opt_accepts_null() {
        let p: Probe = serde_json::from_str(r#"{"id": 1, "other": null}"#).unwrap();
        assert_eq!(p.other, None);
    }
}

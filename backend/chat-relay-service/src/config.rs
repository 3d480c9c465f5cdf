use crate::error::AppError;
use dotenvy::dotenv;
use std::env;

/// Key material for the credential verifier.
#[derive(Debug, Clone)]
pub enum JwtKey {
    /// Shared HS256 secret, as issued by the portal's login handler
    Secret(String),
    /// RS256 public key in PEM format
    RsaPublicPem(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    pub ws_path: String,
    pub jwt_key: JwtKey,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
    pub history_page_size: i64,
}

impl Config {
    fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
        match env::var(name) {
            Ok(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse()
                .map_err(|_| AppError::Config(format!("{name} has an invalid value: {raw}"))),
            _ => Ok(default),
        }
    }

    fn load_jwt_key() -> Result<JwtKey, AppError> {
        if let Ok(pem) = env::var("JWT_PUBLIC_KEY_PEM") {
            if !pem.trim().is_empty() {
                return Ok(JwtKey::RsaPublicPem(pem));
            }
        }

        if let Ok(path) = env::var("JWT_PUBLIC_KEY_FILE") {
            tracing::info!(jwt_public_key_file=%path, "loading JWT public key from file");
            let pem = std::fs::read_to_string(&path)
                .map_err(|e| AppError::Config(format!("read jwt public key file: {e}")))?;
            return Ok(JwtKey::RsaPublicPem(pem));
        }

        match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => Ok(JwtKey::Secret(secret)),
            _ => Err(AppError::Config(
                "JWT_SECRET or JWT_PUBLIC_KEY_PEM/JWT_PUBLIC_KEY_FILE missing".into(),
            )),
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;

        let ws_path = env::var("WS_PATH").unwrap_or_else(|_| "/ws".into());
        if !ws_path.starts_with('/') {
            return Err(AppError::Config("WS_PATH must start with '/'".into()));
        }

        let heartbeat_interval_secs = Self::parse_or("HEARTBEAT_INTERVAL_SECS", 5u64)?;
        let client_timeout_secs = Self::parse_or("CLIENT_TIMEOUT_SECS", 30u64)?;
        if client_timeout_secs <= heartbeat_interval_secs {
            return Err(AppError::Config(
                "CLIENT_TIMEOUT_SECS must be greater than HEARTBEAT_INTERVAL_SECS".into(),
            ));
        }

        Ok(Self {
            database_url,
            database_max_connections: Self::parse_or("DATABASE_MAX_CONNECTIONS", 10u32)?,
            port: Self::parse_or("PORT", 3000u16)?,
            ws_path,
            jwt_key: Self::load_jwt_key()?,
            heartbeat_interval_secs,
            client_timeout_secs,
            history_page_size: Self::parse_or("CHAT_HISTORY_PAGE_SIZE", 50i64)?.max(1),
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/chat_test".into(),
            database_max_connections: 2,
            port: 3000,
            ws_path: "/ws".into(),
            jwt_key: JwtKey::Secret("test-secret".into()),
            heartbeat_interval_secs: 5,
            client_timeout_secs: 30,
            history_page_size: 50,
        }
    }
}

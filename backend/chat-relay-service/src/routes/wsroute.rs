use crate::middleware::auth::bearer_token;
use crate::state::AppState;
use crate::websocket::session::ChatSession;
use crate::websocket::{ConnectionHandle, ConnectionId, Outbound};
use actix::{Actor, ActorContext, AsyncContext, StreamHandler, WrapFuture};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc::UnboundedReceiver, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Transport actor for one WebSocket connection.
///
/// Inbound frames are handled with `ctx.wait`, so the session sees them one at
/// a time and in arrival order.
struct WsConnection {
    connection_id: ConnectionId,
    session: Arc<Mutex<ChatSession>>,
    token: Option<String>,
    outbound: Option<UnboundedReceiver<Outbound>>,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsConnection {
    fn new(state: AppState, token: Option<String>) -> Self {
        let (handle, outbound) = ConnectionHandle::channel();
        let connection_id = handle.id;
        let heartbeat_interval = Duration::from_secs(state.config.heartbeat_interval_secs);
        let client_timeout = Duration::from_secs(state.config.client_timeout_secs);

        Self {
            connection_id,
            session: Arc::new(Mutex::new(ChatSession::new(state, handle))),
            token,
            outbound: Some(outbound),
            hb: Instant::now(),
            heartbeat_interval,
            client_timeout,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(connection_id = %act.connection_id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::debug!(connection_id = %self.connection_id, "WebSocket session started");

        self.hb(ctx);

        if let Some(rx) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx));
        }

        let session = self.session.clone();
        let token = self.token.take();
        ctx.wait(
            async move {
                session.lock().await.open(token.as_deref()).await;
            }
            .into_actor(self),
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::debug!(connection_id = %self.connection_id, "WebSocket session stopped");

        let session = self.session.clone();
        actix::spawn(async move {
            session.lock().await.close().await;
        });
    }
}

/// Any data or control frame from the client proves the connection is alive
fn is_client_activity(msg: &ws::Message) -> bool {
    matches!(
        msg,
        ws::Message::Ping(_) | ws::Message::Pong(_) | ws::Message::Text(_) | ws::Message::Binary(_)
    )
}

// Frames queued by the session or by other sessions' broadcasts
impl StreamHandler<Outbound> for WsConnection {
    fn handle(&mut self, item: Outbound, ctx: &mut Self::Context) {
        match item {
            Outbound::Frame(text) => ctx.text(text),
            Outbound::Close => {
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Policy,
                    description: None,
                }));
                ctx.stop();
            }
        }
    }

    fn finished(&mut self, _ctx: &mut Self::Context) {}
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        if matches!(&msg, Ok(m) if is_client_activity(m)) {
            self.hb = Instant::now();
        }

        match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => {
                let session = self.session.clone();
                let text = text.to_string();
                ctx.wait(
                    async move {
                        session.lock().await.dispatch(&text).await;
                    }
                    .into_actor(self),
                );
            }
            Ok(ws::Message::Binary(_)) => {
                let session = self.session.clone();
                ctx.wait(
                    async move {
                        session.lock().await.dispatch_binary();
                    }
                    .into_actor(self),
                );
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(connection_id = %self.connection_id, ?reason, "WebSocket close received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(connection_id = %self.connection_id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Upgrade to a WebSocket. Authentication happens inside the session so a
/// missing or bad token is answered with an error frame before closing.
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let token = query.into_inner().token.or_else(|| {
        req.headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_owned)
    });

    ws::start(WsConnection::new(state.get_ref().clone(), token), &req, stream)
}

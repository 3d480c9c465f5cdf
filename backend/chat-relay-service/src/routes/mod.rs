pub mod chats;
pub mod wsroute;

use actix_web::web;

/// Register every HTTP and WebSocket route on an app.
///
/// `ws_path` is configurable, so the WebSocket handler is registered as a
/// resource instead of through an attribute macro.
pub fn configure_routes(cfg: &mut web::ServiceConfig, ws_path: &str) {
    cfg.route("/health", web::get().to(|| async { "OK" }))
        .service(web::resource(ws_path).route(web::get().to(wsroute::ws_handler)))
        .service(web::scope("/api").configure(chats::configure));
}

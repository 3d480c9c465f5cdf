use actix_web::{web, App, HttpServer};
use chat_relay_service::{
    config, db, error, logging,
    middleware::JwtVerifier,
    routes,
    services::PgChatStore,
    state::AppState,
    websocket::ConnectionRegistry,
};
use std::sync::Arc;
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let pool = db::init_pool(&cfg).await?;
    let store = Arc::new(PgChatStore::new(pool));
    store.health_check().await?;

    let verifier = Arc::new(JwtVerifier::from_key(&cfg.jwt_key)?);

    let state = AppState {
        store: store.clone(),
        users: store,
        verifier,
        registry: ConnectionRegistry::new(),
        config: cfg.clone(),
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, ws_path = %cfg.ws_path, "starting chat relay");

    let ws_path = cfg.ws_path.clone();
    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(|c| routes::configure_routes(c, &ws_path))
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("server: {e}")))
}

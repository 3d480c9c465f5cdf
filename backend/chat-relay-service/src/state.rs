use crate::{
    config::Config,
    middleware::TokenVerifier,
    services::{ChatStore, UserDirectory},
    websocket::ConnectionRegistry,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub users: Arc<dyn UserDirectory>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub registry: ConnectionRegistry,
    pub config: Arc<Config>,
}

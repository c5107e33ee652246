use crate::sink::Sink;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post, put};
use std::sync::{Arc, RwLock};

pub mod handlers;
pub mod responses;

/// Shared handles the HTTP handlers work against.
#[derive(Clone)]
pub struct ApiContext {
    pub state: Arc<RwLock<AppState>>,
    pub sink: Arc<dyn Sink>,
    pub database: String,
}

pub fn router(context: ApiContext) -> Router {
    Router::new()
        .route("/api/health", get(handlers::get_health))
        .route("/api/status", get(handlers::get_status))
        .route("/api/brews/{id}", put(handlers::put_brew_correction))
        .route("/api/actions", post(handlers::post_action))
        .with_state(context)
}

//! API module - HTTP handlers and routes for the tester dashboard

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::dispatch::CommandDispatcher;
use crate::poll::PollCoordinator;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<PollCoordinator>,
    pub dispatcher: Arc<CommandDispatcher>,
}

impl AppState {
    pub fn new(coordinator: Arc<PollCoordinator>) -> Self {
        let dispatcher = Arc::new(CommandDispatcher::new(coordinator.clone()));
        Self {
            coordinator,
            dispatcher,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::health_check))
        // Device registry
        .route(
            "/api/devices",
            get(handlers::list_devices).post(handlers::add_device),
        )
        .route(
            "/api/devices/:id",
            get(handlers::get_device)
                .patch(handlers::update_device)
                .delete(handlers::delete_device),
        )
        // Polling
        .route("/api/devices/refresh", post(handlers::refresh_all))
        .route("/api/devices/:id/refresh", post(handlers::refresh_device))
        .route("/api/devices/:id/session", get(handlers::get_session))
        // Commands
        .route("/api/devices/:id/interval", post(handlers::set_interval))
        .route(
            "/api/devices/:id/session/start",
            post(handlers::start_session),
        )
        .route("/api/devices/:id/session/stop", post(handlers::stop_session))
        .route(
            "/api/devices/:id/motor/trigger",
            post(handlers::trigger_motor),
        )
}

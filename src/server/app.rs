//! Axum application setup
//!
//! Creates and configures the Axum application with routes and middleware.

use crate::{monitor::RefreshOrchestrator, navigation::NavigationRouter, session::ChannelPrompter};
use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;

/// Application state shared across handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Refresh batches and the aggregate snapshot
    pub orchestrator: Arc<RefreshOrchestrator>,
    /// Pending OTP prompts, when they are answered over HTTP
    pub prompter: Option<ChannelPrompter>,
    /// Dashboard window routing
    pub navigator: Arc<NavigationRouter>,
    /// Server start time for uptime calculation
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<RefreshOrchestrator>,
        prompter: Option<ChannelPrompter>,
        navigator: Arc<NavigationRouter>,
    ) -> Self {
        Self {
            orchestrator,
            prompter,
            navigator,
            start_time: std::time::Instant::now(),
        }
    }
}

/// Create the main Axum application with routes and middleware
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(handlers::ping))
        .route("/snapshot", get(handlers::snapshot))
        .route("/refresh", post(handlers::refresh_all))
        .route("/tenants/{id}/refresh", post(handlers::refresh_tenant))
        .route("/tenants/{id}/token", delete(handlers::invalidate_token))
        .route("/tenants/{id}/open", post(handlers::open_dashboard))
        .route("/otp", get(handlers::list_otp))
        .route(
            "/otp/{id}",
            post(handlers::submit_otp).delete(handlers::cancel_otp),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

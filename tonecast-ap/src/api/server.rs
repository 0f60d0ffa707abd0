//! HTTP routing
//!
//! Builds the axum router over the player controller. Binding and
//! serving happen in `main`; tests drive the router directly.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::player::controller::PlayerController;

/// Shared application context passed to all handlers
///
/// **Note:** AppContext implements Clone, which gives us `FromRef<AppContext>`
/// for free via Axum's blanket implementation.
#[derive(Clone)]
pub struct AppContext {
    pub controller: Arc<PlayerController>,
}

/// Build the full route table.
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))
        // Channel directory
        .route("/channels", get(super::handlers::list_channels))
        // Player registry
        .route("/players", get(super::handlers::list_players))
        .route("/players", post(super::handlers::create_player))
        .route("/players/:id", get(super::handlers::get_player))
        .route("/players/:id", delete(super::handlers::delete_player))
        // Playback control
        .route("/players/:id/play", post(super::handlers::play))
        .route("/players/:id/stop", post(super::handlers::stop))
        .route("/players/:id/next", post(super::handlers::next_track))
        .route("/players/:id/previous", post(super::handlers::previous_track))
        // Playlist inspection
        .route("/players/:id/tracks", get(super::handlers::list_tracks))
        .route("/players/:id/position", get(super::handlers::position))
        .route("/players/:id/seek", post(super::handlers::seek))
        .route("/players/:id/refresh", post(super::handlers::refresh))
        // Channel routing
        .route(
            "/players/:id/channels",
            get(super::handlers::enabled_channels),
        )
        .route(
            "/players/:id/channels/:index/enable",
            post(super::handlers::enable_channel),
        )
        .route(
            "/players/:id/channels/:index/disable",
            post(super::handlers::disable_channel),
        )
        // Attach application context
        .with_state(ctx)
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

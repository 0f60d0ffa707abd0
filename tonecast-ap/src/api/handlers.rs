//! HTTP request handlers
//!
//! Implements the REST endpoints for player and channel control.
//!
//! Every controller call runs on the blocking thread pool: player
//! operations take std mutexes, open native devices, and (for catalogue
//! playlists) issue blocking HTTP requests, none of which may run on an
//! async worker thread.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tonecast_common::api::{
    ChannelDto, CreatePlayerRequest, ErrorResponse, PlayRequest, PlaybackPositionDto, PlayerDto,
    SeekRequest, StatusResponse, TrackDto,
};
use tracing::error;
use uuid::Uuid;

use crate::api::server::AppContext;
use crate::error::Error;
use crate::player::controller::PlayerController;
use crate::player::playlist::PlaylistPlayer;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct PlayerListResponse {
    players: Vec<PlayerDto>,
}

#[derive(Debug, Serialize)]
pub struct ChannelListResponse {
    channels: Vec<ChannelDto>,
}

#[derive(Debug, Serialize)]
pub struct TrackListResponse {
    tracks: Vec<TrackDto>,
}

#[derive(Debug, Serialize)]
pub struct EnabledChannelsResponse {
    channels: Vec<usize>,
}

// ============================================================================
// Plumbing
// ============================================================================

/// Maps a service error onto the HTTP status space.
fn error_reply(e: Error) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::BadRequest(_) | Error::Config(_) => StatusCode::BAD_REQUEST,
        Error::NoChannels | Error::NoTracks | Error::Disposed(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::new(e.to_string())))
}

/// Run a controller call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, Error> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Worker(format!("Blocking task failed: {}", e)))?
}

/// Resolve a player id to its playlist interface.
fn playlist_player(controller: &PlayerController, id: Uuid) -> Result<PlaylistPlayer, Error> {
    controller.player(id)?.playlist().cloned().ok_or_else(|| {
        Error::BadRequest("Player does not support playlist operations".to_string())
    })
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "audio_player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
    })
}

// ============================================================================
// Channel Directory
// ============================================================================

/// GET /channels - List all sound cards with their display names
pub async fn list_channels(
    State(ctx): State<AppContext>,
) -> Result<Json<ChannelListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    match blocking(move || controller.channels()).await {
        Ok(channels) => Ok(Json(ChannelListResponse { channels })),
        Err(e) => {
            error!("Failed to list channels: {}", e);
            Err(error_reply(e))
        }
    }
}

// ============================================================================
// Player Registry
// ============================================================================

/// GET /players - List registered players
pub async fn list_players(
    State(ctx): State<AppContext>,
) -> Result<Json<PlayerListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    match blocking(move || controller.list_players()).await {
        Ok(players) => Ok(Json(PlayerListResponse { players })),
        Err(e) => {
            error!("Failed to list players: {}", e);
            Err(error_reply(e))
        }
    }
}

/// POST /players - Create a player over a playlist source
pub async fn create_player(
    State(ctx): State<AppContext>,
    Json(req): Json<CreatePlayerRequest>,
) -> Result<Json<PlayerDto>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    match blocking(move || controller.create_player(&req.name, &req.source)).await {
        Ok(player) => Ok(Json(player)),
        Err(e) => {
            error!("Failed to create player: {}", e);
            Err(error_reply(e))
        }
    }
}

/// GET /players/:id - One player's registration data
pub async fn get_player(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlayerDto>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    match blocking(move || controller.player_info(id)).await {
        Ok(player) => Ok(Json(player)),
        Err(e) => Err(error_reply(e)),
    }
}

/// DELETE /players/:id - Remove a player and release its devices
pub async fn delete_player(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    match blocking(move || controller.remove_player(id)).await {
        Ok(()) => Ok(Json(StatusResponse::ok())),
        Err(e) => {
            error!("Failed to remove player {}: {}", id, e);
            Err(error_reply(e))
        }
    }
}

// ============================================================================
// Playback Control
// ============================================================================

/// POST /players/:id/play - Start or resume playback
///
/// An optional JSON body selects a specific track index first.
pub async fn play(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    body: Option<Json<PlayRequest>>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let track_index = body.and_then(|Json(req)| req.track_index);
    let controller = ctx.controller.clone();
    let result = blocking(move || {
        let player = playlist_player(&controller, id)?;
        match track_index {
            Some(index) => player.play_at(index),
            None => player.play(),
        }
    })
    .await;
    match result {
        Ok(()) => Ok(Json(StatusResponse::ok())),
        Err(e) => {
            error!("Play failed for player {}: {}", id, e);
            Err(error_reply(e))
        }
    }
}

/// POST /players/:id/stop - Stop playback, holding the current track
pub async fn stop(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    let result = blocking(move || playlist_player(&controller, id)?.stop()).await;
    match result {
        Ok(()) => Ok(Json(StatusResponse::ok())),
        Err(e) => {
            error!("Stop failed for player {}: {}", id, e);
            Err(error_reply(e))
        }
    }
}

/// POST /players/:id/next - Skip to the next track
pub async fn next_track(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    let result = blocking(move || playlist_player(&controller, id)?.next()).await;
    match result {
        Ok(()) => Ok(Json(StatusResponse::ok())),
        Err(e) => {
            error!("Next failed for player {}: {}", id, e);
            Err(error_reply(e))
        }
    }
}

/// POST /players/:id/previous - Return to the previous track
pub async fn previous_track(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    let result = blocking(move || playlist_player(&controller, id)?.previous()).await;
    match result {
        Ok(()) => Ok(Json(StatusResponse::ok())),
        Err(e) => {
            error!("Previous failed for player {}: {}", id, e);
            Err(error_reply(e))
        }
    }
}

// ============================================================================
// Playlist Inspection
// ============================================================================

/// GET /players/:id/tracks - The player's playlist
pub async fn list_tracks(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<TrackListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    match blocking(move || playlist_player(&controller, id)?.tracks()).await {
        Ok(tracks) => Ok(Json(TrackListResponse { tracks })),
        Err(e) => Err(error_reply(e)),
    }
}

/// GET /players/:id/position - Playback position snapshot
pub async fn position(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlaybackPositionDto>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    match blocking(move || playlist_player(&controller, id)?.position()).await {
        Ok(position) => Ok(Json(position)),
        Err(e) => Err(error_reply(e)),
    }
}

/// POST /players/:id/seek - Seek within the current track
///
/// The position is a fraction of the track length in 0..1.
pub async fn seek(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<SeekRequest>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    let result = blocking(move || playlist_player(&controller, id)?.seek(req.position)).await;
    match result {
        Ok(()) => Ok(Json(StatusResponse::ok())),
        Err(e) => {
            error!("Seek failed for player {}: {}", id, e);
            Err(error_reply(e))
        }
    }
}

/// POST /players/:id/refresh - Re-query the playlist source
pub async fn refresh(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    let result = blocking(move || playlist_player(&controller, id)?.refresh()).await;
    match result {
        Ok(()) => Ok(Json(StatusResponse::ok())),
        Err(e) => {
            error!("Refresh failed for player {}: {}", id, e);
            Err(error_reply(e))
        }
    }
}

// ============================================================================
// Channel Routing
// ============================================================================

/// GET /players/:id/channels - Channel indexes this player plays to
pub async fn enabled_channels(
    State(ctx): State<AppContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<EnabledChannelsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    match blocking(move || Ok(playlist_player(&controller, id)?.enabled_channels())).await {
        Ok(channels) => Ok(Json(EnabledChannelsResponse { channels })),
        Err(e) => Err(error_reply(e)),
    }
}

/// POST /players/:id/channels/:index/enable - Route playback to a sound card
pub async fn enable_channel(
    State(ctx): State<AppContext>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    let result = blocking(move || {
        let player = playlist_player(&controller, id)?;
        if !controller.channel_exists(index)? {
            return Err(Error::NotFound(format!(
                "No output device at index {}",
                index
            )));
        }
        player.enable_channel(index)
    })
    .await;
    match result {
        Ok(()) => Ok(Json(StatusResponse::ok())),
        Err(e) => {
            error!("Enable channel {} failed for player {}: {}", index, id, e);
            Err(error_reply(e))
        }
    }
}

/// POST /players/:id/channels/:index/disable - Stop playing to a sound card
///
/// No device existence check here: a channel must remain disableable
/// after its device has vanished from the backend's list.
pub async fn disable_channel(
    State(ctx): State<AppContext>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let controller = ctx.controller.clone();
    let result = blocking(move || playlist_player(&controller, id)?.disable_channel(index)).await;
    match result {
        Ok(()) => Ok(Json(StatusResponse::ok())),
        Err(e) => {
            error!("Disable channel {} failed for player {}: {}", index, id, e);
            Err(error_reply(e))
        }
    }
}

//! Shared API request/response types
//!
//! Types exchanged over the tonecast HTTP API. Players are addressed by
//! UUID, sound cards by backend ordinal, tracks by playlist position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ========================================
// Player Types
// ========================================

/// What a player can do. Only playlist players exist today; the tag is
/// carried so clients do not have to guess when other kinds appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerKind {
    /// Sequences a playlist of tracks, auto-advancing on completion.
    Playlist,
}

/// A registered player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerDto {
    /// Player identifier, assigned at creation.
    pub id: Uuid,
    /// Display name supplied by the creating client.
    pub name: String,
    /// Player capability tag.
    pub kind: PlayerKind,
    /// Whether the player is currently producing audio.
    pub playing: bool,
    /// Creation time (UTC).
    pub created_at: DateTime<Utc>,
}

/// Where a new player gets its playlist from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerSourceDto {
    /// Local directory scanned for supported audio files.
    Directory {
        /// Absolute path on the daemon host.
        path: String,
    },
    /// Remote catalogue profile.
    Catalog {
        /// Profile whose track list is pulled from the catalogue.
        profile_id: u64,
    },
}

/// Body of `POST /players`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlayerRequest {
    /// Display name for the new player.
    pub name: String,
    /// Playlist source.
    pub source: PlayerSourceDto,
}

// ========================================
// Channel and Track Types
// ========================================

/// One sound card known to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDto {
    /// Backend ordinal used to address the device.
    pub index: usize,
    /// Configured display name, or `Channel-{index}` when unconfigured.
    pub name: String,
    /// Device name reported by the audio backend.
    pub native_name: String,
}

/// One playlist entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackDto {
    /// Position within the playlist.
    pub index: usize,
    /// Track display name.
    pub name: String,
}

/// Snapshot of a player's playback position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackPositionDto {
    /// Index of the current track, absent when nothing has been played.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_index: Option<usize>,
    /// Name of the current track, absent when nothing has been played.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_name: Option<String>,
    /// Normalized position within the current track, 0.0 through 1.0.
    pub position: f64,
    /// Whether the player is currently producing audio.
    pub playing: bool,
}

// ========================================
// Command Bodies
// ========================================

/// Body of `POST /players/:id/play`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayRequest {
    /// Play this playlist position instead of the current one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_index: Option<usize>,
}

/// Body of `POST /players/:id/seek`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeekRequest {
    /// Normalized target position, clamped to 0.0 through 1.0.
    pub position: f64,
}

// ========================================
// Status and Error Responses
// ========================================

/// Generic success acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Always "ok" on success paths.
    pub status: String,
}

impl StatusResponse {
    /// The standard success body.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

impl ErrorResponse {
    /// Create an error body.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

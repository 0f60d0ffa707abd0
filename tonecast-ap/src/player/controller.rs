//! Player registry
//!
//! Owns every live player, addressed by UUID, and surfaces the sound
//! cards known to the backend with their configured display names.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tonecast_common::api::{ChannelDto, PlayerDto, PlayerKind, PlayerSourceDto};
use tonecast_common::DisposedGuard;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audio::backend::OutputBackend;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::playback::engine::EngineSettings;
use crate::player::catalog::{CatalogClient, CatalogProvider};
use crate::player::playlist::PlaylistPlayer;
use crate::player::provider::{DirectoryProvider, PlaylistProvider};

/// A registered player, tagged by capability.
///
/// The HTTP surface checks the capability explicitly before exposing
/// playlist operations; there is no downcasting.
#[derive(Clone)]
pub enum PlayerHandle {
    Playlist(PlaylistPlayer),
}

impl PlayerHandle {
    pub fn kind(&self) -> PlayerKind {
        match self {
            PlayerHandle::Playlist(_) => PlayerKind::Playlist,
        }
    }

    /// Playlist operations, when this player supports them.
    pub fn playlist(&self) -> Option<&PlaylistPlayer> {
        match self {
            PlayerHandle::Playlist(player) => Some(player),
        }
    }

    pub fn is_playing(&self) -> bool {
        match self {
            PlayerHandle::Playlist(player) => player.is_playing(),
        }
    }

    fn dispose(&self) -> Result<()> {
        match self {
            PlayerHandle::Playlist(player) => player.dispose(),
        }
    }
}

struct PlayerEntry {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    player: PlayerHandle,
}

/// Registry of live players plus the channel directory.
pub struct PlayerController {
    backend: Arc<dyn OutputBackend>,
    settings: EngineSettings,
    config: Config,
    catalog: Option<Arc<CatalogClient>>,
    players: Mutex<Vec<PlayerEntry>>,
    guard: DisposedGuard,
}

impl PlayerController {
    pub fn new(config: Config, backend: Arc<dyn OutputBackend>) -> Result<Self> {
        let catalog = match config.catalog.as_ref() {
            Some(catalog_config) => Some(Arc::new(CatalogClient::new(catalog_config)?)),
            None => None,
        };
        Ok(Self {
            backend,
            settings: EngineSettings::from(config.playback),
            config,
            catalog,
            players: Mutex::new(Vec::new()),
            guard: DisposedGuard::new("PlayerController"),
        })
    }

    /// Create a playlist player over `source` and register it.
    pub fn create_player(&self, name: &str, source: &PlayerSourceDto) -> Result<PlayerDto> {
        self.guard.check()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::BadRequest(
                "Player name must not be empty".to_string(),
            ));
        }
        let provider = self.build_provider(source)?;
        let player = PlaylistPlayer::new(provider, Arc::clone(&self.backend), self.settings)?;
        let entry = PlayerEntry {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
            player: PlayerHandle::Playlist(player),
        };
        let dto = entry_dto(&entry);
        info!("Created player {} ({})", entry.name, entry.id);
        self.players.lock().unwrap().push(entry);
        Ok(dto)
    }

    /// All registered players, in creation order.
    pub fn list_players(&self) -> Result<Vec<PlayerDto>> {
        self.guard.check()?;
        let players = self.players.lock().unwrap();
        Ok(players.iter().map(entry_dto).collect())
    }

    /// Snapshot of one player's registration data.
    pub fn player_info(&self, id: Uuid) -> Result<PlayerDto> {
        self.guard.check()?;
        let players = self.players.lock().unwrap();
        players
            .iter()
            .find(|e| e.id == id)
            .map(entry_dto)
            .ok_or_else(|| not_found(id))
    }

    /// Handle to one player for playback operations.
    pub fn player(&self, id: Uuid) -> Result<PlayerHandle> {
        self.guard.check()?;
        let players = self.players.lock().unwrap();
        players
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.player.clone())
            .ok_or_else(|| not_found(id))
    }

    /// Remove a player and release its audio resources.
    pub fn remove_player(&self, id: Uuid) -> Result<()> {
        self.guard.check()?;
        let mut players = self.players.lock().unwrap();
        let Some(position) = players.iter().position(|e| e.id == id) else {
            return Err(not_found(id));
        };
        let entry = players.remove(position);
        drop(players);
        info!("Removed player {} ({})", entry.name, entry.id);
        entry.player.dispose()
    }

    /// Sound cards known to the backend, with configured display names.
    pub fn channels(&self) -> Result<Vec<ChannelDto>> {
        self.guard.check()?;
        let devices = self.backend.enumerate()?;
        Ok(devices
            .into_iter()
            .map(|device| ChannelDto {
                index: device.index,
                name: self
                    .config
                    .channel_name(device.index)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Channel-{}", device.index)),
                native_name: device.name,
            })
            .collect())
    }

    /// Whether a sound card ordinal is currently valid.
    pub fn channel_exists(&self, index: usize) -> Result<bool> {
        self.guard.check()?;
        Ok(index < self.backend.enumerate()?.len())
    }

    /// Dispose every player. Called once at daemon shutdown.
    pub fn dispose(&self) -> Result<()> {
        self.guard.dispose()?;
        let mut players = self.players.lock().unwrap();
        for entry in players.drain(..) {
            if let Err(e) = entry.player.dispose() {
                warn!("Failed to dispose player {}: {}", entry.id, e);
            }
        }
        Ok(())
    }

    fn build_provider(&self, source: &PlayerSourceDto) -> Result<Box<dyn PlaylistProvider>> {
        match source {
            PlayerSourceDto::Directory { path } => Ok(Box::new(DirectoryProvider::new(
                path.as_str(),
            )?)),
            PlayerSourceDto::Catalog { profile_id } => {
                let client = self
                    .catalog
                    .clone()
                    .ok_or_else(|| Error::Config("No catalogue endpoint configured".to_string()))?;
                Ok(Box::new(CatalogProvider::new(client, *profile_id)?))
            }
        }
    }
}

fn entry_dto(entry: &PlayerEntry) -> PlayerDto {
    PlayerDto {
        id: entry.id,
        name: entry.name.clone(),
        kind: entry.player.kind(),
        playing: entry.player.is_playing(),
        created_at: entry.created_at,
    }
}

fn not_found(id: Uuid) -> Error {
    Error::NotFound(format!("No player with id {}", id))
}

//! Playlist sequencer
//!
//! Holds an ordered track list and owns at most one live playable
//! track. When the live track completes naturally the player advances
//! to the next entry, wrapping to the start at the end of the list. The
//! enabled channel set outlives individual tracks and is re-applied to
//! every newly constructed one.
//!
//! A manual stop also surfaces as a completion from the engine, so the
//! player arms a one-shot suppression flag before stopping; the flag is
//! consumed by the resulting completion and cleared again by any play
//! command. Completions additionally carry the epoch of the session
//! that produced them, so a completion racing with an explicit track
//! switch cannot advance the playlist a second time.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tonecast_common::api::{PlaybackPositionDto, TrackDto};
use tonecast_common::DisposedGuard;
use tracing::{debug, error, info, warn};

use crate::audio::backend::OutputBackend;
use crate::error::{Error, Result};
use crate::playback::engine::EngineSettings;
use crate::playback::state::PlaybackState;
use crate::playback::track::PlayableTrack;
use crate::player::provider::{PlaylistProvider, TrackInfo};

/// Sequences a playlist across a persistent set of sound cards.
#[derive(Clone)]
pub struct PlaylistPlayer {
    shared: Arc<PlayerShared>,
}

struct PlayerShared {
    backend: Arc<dyn OutputBackend>,
    settings: EngineSettings,
    inner: Mutex<PlayerInner>,
    guard: DisposedGuard,
}

struct PlayerInner {
    provider: Box<dyn PlaylistProvider>,
    tracks: Vec<TrackInfo>,
    current_index: usize,
    current: Option<PlayableTrack>,
    channels: BTreeSet<usize>,
    manual_stop: bool,
    /// Bumped on every track switch; stale completions are ignored.
    epoch: u64,
}

impl PlaylistPlayer {
    /// Create a player over `provider`, loading the initial track list.
    pub fn new(
        provider: Box<dyn PlaylistProvider>,
        backend: Arc<dyn OutputBackend>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let tracks = provider.tracks()?;
        info!("Playlist loaded with {} tracks", tracks.len());
        Ok(Self {
            shared: Arc::new(PlayerShared {
                backend,
                settings,
                inner: Mutex::new(PlayerInner {
                    provider,
                    tracks,
                    current_index: 0,
                    current: None,
                    channels: BTreeSet::new(),
                    manual_stop: false,
                    epoch: 0,
                }),
                guard: DisposedGuard::new("PlaylistPlayer"),
            }),
        })
    }

    /// Start or resume playback of the current track.
    pub fn play(&self) -> Result<()> {
        self.shared.guard.check()?;
        let mut inner = self.shared.inner.lock().unwrap();
        inner.manual_stop = false;
        if inner.channels.is_empty() {
            return Err(Error::NoChannels);
        }
        if let Some(track) = inner.current.as_ref() {
            return track.play();
        }
        let index = inner.current_index;
        PlayerShared::switch_to(&self.shared, &mut inner, index)
    }

    /// Play the track at `index`, clamped to the last playlist entry.
    /// Selecting the track that is already current restarts it from the
    /// beginning instead of rebuilding the session.
    pub fn play_at(&self, index: usize) -> Result<()> {
        self.shared.guard.check()?;
        let mut inner = self.shared.inner.lock().unwrap();
        inner.manual_stop = false;
        if inner.channels.is_empty() {
            return Err(Error::NoChannels);
        }
        if inner.tracks.is_empty() {
            return Err(Error::NoTracks);
        }
        let index = index.min(inner.tracks.len() - 1);
        if index == inner.current_index {
            if let Some(track) = inner.current.as_ref() {
                track.seek(0.0)?;
                return track.play();
            }
        }
        PlayerShared::switch_to(&self.shared, &mut inner, index)
    }

    /// Advance to the next track, wrapping at the end of the playlist.
    pub fn next(&self) -> Result<()> {
        self.shared.guard.check()?;
        let mut inner = self.shared.inner.lock().unwrap();
        inner.manual_stop = false;
        if inner.channels.is_empty() {
            return Err(Error::NoChannels);
        }
        if inner.tracks.is_empty() {
            return Err(Error::NoTracks);
        }
        let next = (inner.current_index + 1) % inner.tracks.len();
        PlayerShared::switch_to(&self.shared, &mut inner, next)
    }

    /// Step back one track, staying on the first entry at the start.
    pub fn previous(&self) -> Result<()> {
        self.shared.guard.check()?;
        let mut inner = self.shared.inner.lock().unwrap();
        inner.manual_stop = false;
        if inner.channels.is_empty() {
            return Err(Error::NoChannels);
        }
        if inner.tracks.is_empty() {
            return Err(Error::NoTracks);
        }
        let previous = inner.current_index.saturating_sub(1);
        PlayerShared::switch_to(&self.shared, &mut inner, previous)
    }

    /// Stop the current track without advancing. Playback restarts from
    /// the same position on the next play.
    pub fn stop(&self) -> Result<()> {
        self.shared.guard.check()?;
        let mut inner = self.shared.inner.lock().unwrap();
        let stopping = inner
            .current
            .as_ref()
            .map(|t| t.state() != PlaybackState::Stopped)
            .unwrap_or(false);
        if stopping {
            inner.manual_stop = true;
        }
        match inner.current.as_ref() {
            Some(track) => track.stop(),
            None => Ok(()),
        }
    }

    /// Add a sound card to the player's output set. Applied to the live
    /// track first; recorded only if that succeeds.
    pub fn enable_channel(&self, index: usize) -> Result<()> {
        self.shared.guard.check()?;
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.channels.contains(&index) {
            return Ok(());
        }
        if let Some(track) = inner.current.as_ref() {
            track.enable_channel(index)?;
        }
        inner.channels.insert(index);
        Ok(())
    }

    /// Remove a sound card from the player's output set. Removing the
    /// last card leaves a playing session running without a sink until
    /// a card is enabled again or the player is stopped.
    pub fn disable_channel(&self, index: usize) -> Result<()> {
        self.shared.guard.check()?;
        let mut inner = self.shared.inner.lock().unwrap();
        inner.channels.remove(&index);
        match inner.current.as_ref() {
            Some(track) => track.disable_channel(index),
            None => Ok(()),
        }
    }

    /// Sound cards this player outputs to.
    pub fn enabled_channels(&self) -> Vec<usize> {
        let inner = self.shared.inner.lock().unwrap();
        inner.channels.iter().copied().collect()
    }

    /// The playlist as shown to clients.
    pub fn tracks(&self) -> Result<Vec<TrackDto>> {
        self.shared.guard.check()?;
        let inner = self.shared.inner.lock().unwrap();
        Ok(inner
            .tracks
            .iter()
            .enumerate()
            .map(|(index, track)| TrackDto {
                index,
                name: track.name.clone(),
            })
            .collect())
    }

    /// Number of tracks currently in the playlist.
    pub fn track_count(&self) -> usize {
        self.shared.inner.lock().unwrap().tracks.len()
    }

    /// Index the player is on, meaningful only while the playlist is
    /// non-empty.
    pub fn current_index(&self) -> usize {
        self.shared.inner.lock().unwrap().current_index
    }

    /// The track the player is on, if any.
    pub fn current_track(&self) -> Option<TrackDto> {
        let inner = self.shared.inner.lock().unwrap();
        inner.tracks.get(inner.current_index).map(|track| TrackDto {
            index: inner.current_index,
            name: track.name.clone(),
        })
    }

    /// Re-query the provider for the track list. The live track is not
    /// interrupted; the current index is rewound to the start if it no
    /// longer fits the new list.
    pub fn refresh(&self) -> Result<()> {
        self.shared.guard.check()?;
        let mut inner = self.shared.inner.lock().unwrap();
        let tracks = inner.provider.tracks()?;
        info!("Playlist refreshed: {} tracks", tracks.len());
        inner.tracks = tracks;
        if inner.current_index >= inner.tracks.len() {
            inner.current_index = 0;
        }
        Ok(())
    }

    /// Position snapshot with the track position normalized to 0..1.
    pub fn position(&self) -> Result<PlaybackPositionDto> {
        self.shared.guard.check()?;
        let inner = self.shared.inner.lock().unwrap();
        match inner.current.as_ref() {
            Some(track) => {
                let length = track.length()?;
                let seconds = track.position()?;
                let position = if length > 0.0 {
                    (seconds / length).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                Ok(PlaybackPositionDto {
                    track_index: Some(inner.current_index),
                    track_name: Some(track.name().to_string()),
                    position,
                    playing: track.is_playing(),
                })
            }
            None => Ok(PlaybackPositionDto {
                track_index: None,
                track_name: None,
                position: 0.0,
                playing: false,
            }),
        }
    }

    /// Scrub within the current track; `position` is normalized 0..1.
    /// Without a live track there is nothing to scrub.
    pub fn seek(&self, position: f64) -> Result<()> {
        self.shared.guard.check()?;
        if !position.is_finite() {
            return Err(Error::BadRequest("position must be finite".to_string()));
        }
        let inner = self.shared.inner.lock().unwrap();
        let Some(track) = inner.current.as_ref() else {
            return Ok(());
        };
        let length = track.length()?;
        track.seek(position.clamp(0.0, 1.0) * length)
    }

    /// Whether the live track is currently producing audio.
    pub fn is_playing(&self) -> bool {
        if self.shared.guard.is_disposed() {
            return false;
        }
        let inner = self.shared.inner.lock().unwrap();
        inner
            .current
            .as_ref()
            .map(|t| t.is_playing())
            .unwrap_or(false)
    }

    /// Tear the player down, disposing the live track.
    pub fn dispose(&self) -> Result<()> {
        self.shared.guard.dispose()?;
        debug!("Disposing playlist player");
        let mut inner = self.shared.inner.lock().unwrap();
        inner.channels.clear();
        if let Some(track) = inner.current.take() {
            if let Err(e) = track.dispose() {
                warn!("Failed to dispose current track: {}", e);
            }
        }
        Ok(())
    }
}

impl PlayerShared {
    /// Dispose the current track and start the one at `index`. The
    /// caller holds the inner lock.
    fn switch_to(shared: &Arc<Self>, inner: &mut PlayerInner, index: usize) -> Result<()> {
        if inner.tracks.is_empty() {
            return Err(Error::NoTracks);
        }
        let index = index.min(inner.tracks.len() - 1);

        if let Some(old) = inner.current.take() {
            if let Err(e) = old.dispose() {
                warn!("Failed to dispose previous track: {}", e);
            }
        }

        let info = inner.tracks[index].clone();
        info!("Starting track {}: {}", index, info.name);
        let source = inner.provider.open(&info)?;
        let track = PlayableTrack::new(
            info.name,
            source,
            Arc::clone(&shared.backend),
            shared.settings,
        );
        for &channel in &inner.channels {
            track.enable_channel(channel)?;
        }

        inner.epoch += 1;
        let epoch = inner.epoch;
        let weak = Arc::downgrade(shared);
        track.set_completed(move |error| {
            if let Some(shared) = weak.upgrade() {
                PlayerShared::on_completed(&shared, epoch, error);
            }
        });

        track.play()?;
        inner.current_index = index;
        inner.current = Some(track);
        Ok(())
    }

    /// Completion bridge, called on the engine worker thread after the
    /// session has fully stopped.
    fn on_completed(shared: &Arc<Self>, epoch: u64, error: Option<Error>) {
        if shared.guard.is_disposed() {
            return;
        }
        let mut inner = shared.inner.lock().unwrap();
        if shared.guard.is_disposed() || inner.epoch != epoch {
            return;
        }
        if inner.manual_stop {
            inner.manual_stop = false;
            debug!("Playback stopped by request");
            return;
        }
        match &error {
            Some(e) => warn!("Track failed, skipping to next: {}", e),
            None => debug!("Track completed"),
        }
        if inner.tracks.is_empty() {
            return;
        }
        let next = (inner.current_index + 1) % inner.tracks.len();
        if let Err(e) = Self::switch_to(shared, &mut inner, next) {
            error!("Failed to start next track: {}", e);
        }
    }
}

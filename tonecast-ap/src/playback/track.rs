//! Playable track facade
//!
//! Wraps one decoded source as the externally visible one-track player.
//! The underlying engine session is created lazily by the first `play`
//! or `enable_channel`, so a track can be constructed cheaply without
//! touching any audio hardware.

use std::sync::{Arc, Mutex};

use tonecast_common::DisposedGuard;
use tracing::debug;

use crate::audio::backend::OutputBackend;
use crate::audio::source::{shared, AudioSource, SharedSource};
use crate::error::{Error, Result};
use crate::playback::engine::{EngineSettings, FanoutEngine};
use crate::playback::state::PlaybackState;

/// Callback fired once per play session when playback stops, carrying
/// the failure if the session did not end normally.
pub type CompletedHandler = Arc<dyn Fn(Option<Error>) + Send + Sync>;

/// One track, playable on a changeable set of sound cards.
pub struct PlayableTrack {
    name: String,
    source: SharedSource,
    backend: Arc<dyn OutputBackend>,
    settings: EngineSettings,
    session: Mutex<Option<FanoutEngine>>,
    completed: Arc<Mutex<Option<CompletedHandler>>>,
    guard: DisposedGuard,
}

impl PlayableTrack {
    pub fn new(
        name: impl Into<String>,
        source: Box<dyn AudioSource>,
        backend: Arc<dyn OutputBackend>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            name: name.into(),
            source: shared(source),
            backend,
            settings,
            session: Mutex::new(None),
            completed: Arc::new(Mutex::new(None)),
            guard: DisposedGuard::new("PlayableTrack"),
        }
    }

    /// Display name of the track.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register the completion callback. Replaces any previous handler.
    pub fn set_completed<F>(&self, handler: F)
    where
        F: Fn(Option<Error>) + Send + Sync + 'static,
    {
        *self.completed.lock().unwrap() = Some(Arc::new(handler));
    }

    /// Start playback, creating the engine session on first use.
    pub fn play(&self) -> Result<()> {
        self.guard.check()?;
        let mut session = self.session.lock().unwrap();
        if session.is_none() {
            *session = Some(self.build_session()?);
        }
        if let Some(session) = session.as_ref() {
            session.play()?;
        }
        Ok(())
    }

    /// Stop playback. A track that was never played is left untouched.
    pub fn stop(&self) -> Result<()> {
        self.guard.check()?;
        let session = self.session.lock().unwrap();
        match session.as_ref() {
            Some(session) => session.stop(),
            None => Ok(()),
        }
    }

    /// Session state; a track without a live session counts as stopped.
    pub fn state(&self) -> PlaybackState {
        let session = self.session.lock().unwrap();
        session
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(PlaybackState::Stopped)
    }

    /// Whether a live session is currently playing.
    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// Add a sound card to this track's fan-out, creating the engine
    /// session if none exists yet. Adding a card that already
    /// participates fails.
    pub fn enable_channel(&self, device_index: usize) -> Result<()> {
        self.guard.check()?;
        let mut session = self.session.lock().unwrap();
        if session.is_none() {
            *session = Some(self.build_session()?);
        }
        match session.as_ref() {
            Some(session) => session.add_channel(device_index),
            None => Ok(()),
        }
    }

    /// Remove a sound card from this track's fan-out. Without a live
    /// session there is nothing to remove.
    pub fn disable_channel(&self, device_index: usize) -> Result<()> {
        self.guard.check()?;
        let session = self.session.lock().unwrap();
        match session.as_ref() {
            Some(session) => session.remove_channel(device_index),
            None => Ok(()),
        }
    }

    /// Playback position in seconds, measured at the source cursor.
    pub fn position(&self) -> Result<f64> {
        self.guard.check()?;
        let source = self.source.lock().unwrap();
        Ok(source.position() as f64 / source.format().byte_rate() as f64)
    }

    /// Track length in seconds.
    pub fn length(&self) -> Result<f64> {
        self.guard.check()?;
        let source = self.source.lock().unwrap();
        Ok(source.length() as f64 / source.format().byte_rate() as f64)
    }

    /// Move the source cursor to `seconds`, clamped to the track bounds
    /// and aligned to a whole frame. Blocks already in flight finish
    /// playing before the new position is heard.
    pub fn seek(&self, seconds: f64) -> Result<()> {
        self.guard.check()?;
        let mut source = self.source.lock().unwrap();
        let format = source.format();
        let length = source.length();
        let offset = (seconds.max(0.0) * format.byte_rate() as f64) as u64;
        source.seek(format.align_down(offset.min(length)))
    }

    /// Tear the track down, ending any live session.
    pub fn dispose(&self) -> Result<()> {
        self.guard.dispose()?;
        debug!("Disposing track {}", self.name);
        *self.completed.lock().unwrap() = None;
        let mut session = self.session.lock().unwrap();
        match session.take() {
            Some(session) => session.dispose(),
            None => Ok(()),
        }
    }

    fn build_session(&self) -> Result<FanoutEngine> {
        let session = FanoutEngine::new(
            Arc::clone(&self.source),
            Arc::clone(&self.backend),
            self.settings,
        )?;

        // Bridge session termination to the track callback. The guard
        // keeps a callback from escaping a disposed track.
        let guard = self.guard.clone();
        let completed = Arc::clone(&self.completed);
        session.set_stopped_handler(move |error| {
            if guard.is_disposed() {
                return;
            }
            let handler = completed.lock().unwrap().clone();
            if let Some(handler) = handler {
                handler(error);
            }
        });

        Ok(session)
    }
}

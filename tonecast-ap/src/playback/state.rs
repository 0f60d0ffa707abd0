//! Playback state management
//!
//! The fan-out engine's three-state machine. The state cell is read from
//! control threads, the engine worker and completion callbacks, so it is
//! a plain atomic rather than a lock.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Stopped => write!(f, "stopped"),
        }
    }
}

const STATE_STOPPED: u8 = 0;
const STATE_PLAYING: u8 = 1;
const STATE_PAUSED: u8 = 2;

/// Lock-free cell holding a [`PlaybackState`].
#[derive(Debug)]
pub struct StateCell {
    value: AtomicU8,
}

impl StateCell {
    /// New cell in the Stopped state.
    pub fn new() -> Self {
        Self {
            value: AtomicU8::new(STATE_STOPPED),
        }
    }

    /// Current state.
    pub fn get(&self) -> PlaybackState {
        match self.value.load(Ordering::SeqCst) {
            STATE_PLAYING => PlaybackState::Playing,
            STATE_PAUSED => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }

    /// Replace the state.
    pub fn set(&self, state: PlaybackState) {
        self.value.store(Self::encode(state), Ordering::SeqCst);
    }

    /// Replace the state only when it currently equals `from`. Returns
    /// true on success. Used for the Stopped-to-Playing transition so two
    /// racing play calls spawn a single worker.
    pub fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        self.value
            .compare_exchange(
                Self::encode(from),
                Self::encode(to),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    fn encode(state: PlaybackState) -> u8 {
        match state {
            PlaybackState::Stopped => STATE_STOPPED,
            PlaybackState::Playing => STATE_PLAYING,
            PlaybackState::Paused => STATE_PAUSED,
        }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

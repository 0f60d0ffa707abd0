//! # Tonecast Audio Player (tonecast-ap)
//!
//! Home audio playback daemon. Decodes one audio stream per player and
//! fans the decoded blocks out to any number of sound cards in
//! lock-step, with channels addable and removable mid-playback.
//!
//! **Architecture:** shared buffer pool + per-device output channels
//! driven by one fan-out worker per playing track, a playlist sequencer
//! on top, and an HTTP control surface (axum) in front.

pub mod api;
pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod player;

pub use error::{Error, Result};

//! Synchronized multi-device playback

pub mod channel;
pub mod engine;
pub mod pool;
pub mod reader;
pub mod state;
pub mod track;

pub use channel::OutputChannel;
pub use engine::{EngineSettings, FanoutEngine};
pub use pool::BufferPool;
pub use state::PlaybackState;
pub use track::PlayableTrack;

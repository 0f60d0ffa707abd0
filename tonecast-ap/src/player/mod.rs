//! Playlist players and their registry

pub mod catalog;
pub mod controller;
pub mod playlist;
pub mod provider;

pub use catalog::{CatalogClient, CatalogProvider};
pub use controller::{PlayerController, PlayerHandle};
pub use playlist::PlaylistPlayer;
pub use provider::{DirectoryProvider, PlaylistProvider, TrackInfo, TrackLocation};

//! Playlist sources
//!
//! A provider names the tracks a player can play and opens them for
//! decoding. Two sources exist: a local directory scanned for audio
//! files, and a remote catalogue profile.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::audio::decoder::SymphoniaSource;
use crate::audio::source::AudioSource;
use crate::error::{Error, Result};

/// File extensions the decoder can open.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["flac", "m4a", "mp3", "ogg", "wav"];

/// Where a track's audio bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackLocation {
    /// Local file on the daemon host.
    File(PathBuf),
    /// Remote URL fetched through the catalogue client.
    Remote(String),
}

/// One playable entry of a playlist.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    /// Display name.
    pub name: String,
    /// Where to read the audio from.
    pub location: TrackLocation,
}

/// Source of a player's playlist.
pub trait PlaylistProvider: Send {
    /// Current track list, in playback order.
    fn tracks(&self) -> Result<Vec<TrackInfo>>;

    /// Open a track for decoding.
    fn open(&self, track: &TrackInfo) -> Result<Box<dyn AudioSource>>;
}

/// Playlist built from the audio files directly inside one directory.
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    /// Create a provider over `root`. The directory must exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::BadRequest(format!(
                "Not a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }
}

impl PlaylistProvider for DirectoryProvider {
    /// Supported files directly under the root, sorted by name.
    /// Subdirectories are not descended into.
    fn tracks(&self) -> Result<Vec<TrackInfo>> {
        let mut tracks = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() || !is_supported(&path) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            tracks.push(TrackInfo {
                name: stem.to_string(),
                location: TrackLocation::File(path),
            });
        }
        tracks.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("Found {} tracks under {}", tracks.len(), self.root.display());
        Ok(tracks)
    }

    fn open(&self, track: &TrackInfo) -> Result<Box<dyn AudioSource>> {
        match &track.location {
            TrackLocation::File(path) => Ok(Box::new(SymphoniaSource::open(path)?)),
            TrackLocation::Remote(_) => Err(Error::BadRequest(
                "Directory players cannot open remote tracks".to_string(),
            )),
        }
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

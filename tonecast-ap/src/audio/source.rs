//! Decoded audio source seam
//!
//! Everything the playback engine knows about where audio comes from.
//! A source is a seekable stream of decoded PCM bytes in one fixed
//! format; decoding, downloading and container parsing all happen behind
//! this trait. Tests substitute scripted sources.

use std::sync::{Arc, Mutex};

use crate::audio::types::AudioFormat;
use crate::error::Result;

/// A seekable stream of decoded PCM bytes.
pub trait AudioSource: Send {
    /// PCM layout of the bytes this source produces.
    fn format(&self) -> AudioFormat;

    /// Read up to `buf.len()` bytes at the cursor, advancing it.
    ///
    /// Returns the number of bytes read; `Ok(0)` means end of stream.
    /// Short reads before the end are allowed.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Move the cursor to an absolute byte offset.
    ///
    /// Implementations clamp to the stream length and align to a frame
    /// boundary so playback never resumes mid-frame.
    fn seek(&mut self, position: u64) -> Result<()>;

    /// Current cursor offset in bytes.
    fn position(&self) -> u64;

    /// Total stream length in bytes.
    fn length(&self) -> u64;
}

/// A source shared between the engine's reader and its owning track.
///
/// The reader locks the source for each block; control surfaces lock it
/// for seek and position queries.
pub type SharedSource = Arc<Mutex<Box<dyn AudioSource>>>;

/// Wrap a source for sharing.
pub fn shared(source: Box<dyn AudioSource>) -> SharedSource {
    Arc::new(Mutex::new(source))
}

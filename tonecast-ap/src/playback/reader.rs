//! Stream source reader
//!
//! Pulls fixed-size blocks from a shared [`AudioSource`] for the engine's
//! slot pass. One persistent staging buffer is reused for every block; a
//! short read near end-of-stream is zero-filled to the block boundary so
//! devices always receive whole slots.

use tracing::debug;

use crate::audio::source::SharedSource;
use crate::error::Result;

/// Reads one block at a time from the shared source.
pub struct BlockReader {
    source: SharedSource,
    staging: Vec<u8>,
}

impl BlockReader {
    /// Create a reader producing blocks of `block_len` bytes.
    pub fn new(source: SharedSource, block_len: usize) -> Self {
        Self {
            source,
            staging: vec![0u8; block_len],
        }
    }

    /// Block size in bytes.
    pub fn block_len(&self) -> usize {
        self.staging.len()
    }

    /// Pull the next block.
    ///
    /// Returns `Ok(None)` only when the source delivers zero bytes (end
    /// of stream). A partial read is padded with silence.
    pub fn read(&mut self) -> Result<Option<&[u8]>> {
        let count = {
            let mut source = self.source.lock().unwrap();
            source.read(&mut self.staging)?
        };

        if count == 0 {
            debug!("Source exhausted");
            return Ok(None);
        }

        if count < self.staging.len() {
            self.staging[count..].fill(0);
        }

        Ok(Some(&self.staging))
    }
}

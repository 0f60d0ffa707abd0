//! Core audio data types
//!
//! The playback pipeline works on raw interleaved PCM bytes; `AudioFormat`
//! describes their layout and provides the latency-to-byte-size math used
//! to size pool slots.

use serde::{Deserialize, Serialize};

/// PCM byte-stream format shared by a decoded source and the devices
/// playing it.
///
/// Samples are interleaved little-endian signed integers, one frame per
/// sample period across all channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Frames per second
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: u16,

    /// Bits per sample (16 for the whole pipeline today)
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Create a format description.
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// 16-bit PCM, the format the decoder produces.
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self::new(sample_rate, channels, 16)
    }

    /// Bytes per frame (all channels of one sample period).
    pub fn block_align(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Bytes per second of audio.
    pub fn byte_rate(&self) -> usize {
        self.sample_rate as usize * self.block_align()
    }

    /// Byte size of `latency_ms` of audio, rounded up to a whole number
    /// of frames and never smaller than one frame.
    pub fn latency_to_bytes(&self, latency_ms: u32) -> usize {
        let bytes = (self.byte_rate() / 1000) * latency_ms as usize;
        let align = self.block_align();
        let aligned = match bytes % align {
            0 => bytes,
            rem => bytes + (align - rem),
        };
        aligned.max(align)
    }

    /// Largest multiple of the frame size at or below `offset`, so seeks
    /// always land on a frame boundary.
    pub fn align_down(&self, offset: u64) -> u64 {
        offset - (offset % self.block_align() as u64)
    }
}

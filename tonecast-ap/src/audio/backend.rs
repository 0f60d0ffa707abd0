//! Native audio output seam
//!
//! The playback engine drives sound cards only through these traits. The
//! production implementation wraps cpal ([`crate::audio::output`]); tests
//! substitute fake devices that record submissions and complete them under
//! test control.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::audio::types::AudioFormat;
use crate::error::Result;
use crate::playback::pool::Slot;

/// Completion signal endpoint handed to a device at open time. The device
/// sends one unit per finished (or reset) submission.
pub type CompletionSender = crossbeam_channel::Sender<()>;

/// Receiving end of a channel's completion signal, waited on by the
/// engine worker.
pub type CompletionReceiver = crossbeam_channel::Receiver<()>;

/// One sound card as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Ordinal used to address the device. Stable for the lifetime of the
    /// backend instance.
    pub index: usize,
    /// Name reported by the driver.
    pub name: String,
}

/// A block of audio handed to a device for playback.
///
/// The slot bytes are shared, not copied: the device reads them while the
/// engine guarantees the slot is not rewritten until every device playing
/// it has completed. `queued` is the wrapper's in-queue flag; the device
/// clears it and signals completion when the block has been fully
/// consumed or thrown away by a reset.
pub struct Submission {
    /// Pool slot whose current contents are to be played.
    pub slot: Arc<Slot>,
    /// Cleared by the device when the submission completes.
    pub queued: Arc<AtomicBool>,
}

/// An opened output device bound to one completion signal.
pub trait OutputDevice: Send {
    /// Queue a block for playback. Returns immediately; completion is
    /// reported through the completion signal.
    fn submit(&mut self, submission: Submission) -> Result<()>;

    /// Halt playback, keeping queued blocks in place.
    fn pause(&mut self) -> Result<()>;

    /// Continue playback of queued blocks after a pause.
    fn resume(&mut self) -> Result<()>;

    /// Drop every queued block, completing each immediately, and rewind
    /// the playback position to zero. Works while paused.
    fn reset(&mut self) -> Result<()>;

    /// Bytes played since open or the last reset.
    fn position(&self) -> Result<u64>;

    /// Release the native device. Further calls fail.
    fn close(&mut self) -> Result<()>;
}

/// Factory for output devices.
pub trait OutputBackend: Send + Sync {
    /// List available output devices in ordinal order.
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Open the device at `index` for playback of `format`, wiring its
    /// completion signal to `completions`.
    fn open(
        &self,
        index: usize,
        format: &AudioFormat,
        completions: CompletionSender,
    ) -> Result<Box<dyn OutputDevice>>;
}

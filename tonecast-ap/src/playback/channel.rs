//! Device output channel
//!
//! Binds one opened output device to the slot pool. Each pool slot gets a
//! permanent [`SlotBinding`] whose `queued` flag tracks whether this
//! device still has that slot's block in flight; the engine reads those
//! flags to decide which slots are free to refill.
//!
//! The native device sits behind a mutex. The underlying APIs are not
//! reentrant, so every control call is serialized per channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};
use tonecast_common::DisposedGuard;

use crate::audio::backend::{
    CompletionReceiver, OutputBackend, OutputDevice, Submission,
};
use crate::audio::types::AudioFormat;
use crate::error::{Error, Result};
use crate::playback::pool::{BufferPool, Slot};

/// Permanent binding of one pool slot to this channel.
struct SlotBinding {
    slot: Arc<Slot>,
    queued: Arc<AtomicBool>,
}

/// One output device participating in fan-out.
pub struct OutputChannel {
    device_index: usize,
    device: Mutex<Box<dyn OutputDevice>>,
    bindings: Vec<SlotBinding>,
    completions: CompletionReceiver,
    guard: DisposedGuard,
}

impl OutputChannel {
    /// Open the device at `device_index` and bind it to every pool slot.
    pub fn open(
        backend: &dyn OutputBackend,
        device_index: usize,
        format: &AudioFormat,
        pool: &BufferPool,
    ) -> Result<Self> {
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        let device = backend.open(device_index, format, completion_tx)?;

        let mut bindings = Vec::with_capacity(pool.slot_count());
        for index in 0..pool.slot_count() {
            bindings.push(SlotBinding {
                slot: pool.slot(index)?,
                queued: Arc::new(AtomicBool::new(false)),
            });
        }

        info!("Output channel {} ready", device_index);
        Ok(Self {
            device_index,
            device: Mutex::new(device),
            bindings,
            completions: completion_rx,
            guard: DisposedGuard::new("OutputChannel"),
        })
    }

    /// Backend ordinal of the bound device.
    pub fn device_index(&self) -> usize {
        self.device_index
    }

    /// Receiver signaled once per completed submission on this channel.
    pub fn completions(&self) -> &CompletionReceiver {
        &self.completions
    }

    /// Queue the current contents of slot `slot_index` on the device.
    ///
    /// Marks the slot in flight for this channel before handing it to the
    /// device; a rejected submission clears the mark again so the slot is
    /// not stranded.
    pub fn submit(&self, slot_index: usize) -> Result<()> {
        self.guard.check()?;
        let binding = self
            .bindings
            .get(slot_index)
            .ok_or_else(|| Error::Config(format!("No slot binding at index {}", slot_index)))?;

        binding.queued.store(true, Ordering::SeqCst);
        let submission = Submission {
            slot: Arc::clone(&binding.slot),
            queued: Arc::clone(&binding.queued),
        };

        let result = self.device.lock().unwrap().submit(submission);
        if result.is_err() {
            binding.queued.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Whether this channel still has slot `slot_index` in flight.
    pub fn is_queued(&self, slot_index: usize) -> bool {
        self.bindings
            .get(slot_index)
            .map(|b| b.queued.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Halt the device, keeping queued blocks in place.
    pub fn pause(&self) -> Result<()> {
        self.guard.check()?;
        self.device.lock().unwrap().pause()
    }

    /// Continue after a pause.
    pub fn resume(&self) -> Result<()> {
        self.guard.check()?;
        self.device.lock().unwrap().resume()
    }

    /// Abandon everything queued on the device. The device completes each
    /// abandoned block, so the bindings' flags clear and the completion
    /// signal fires.
    pub fn reset(&self) -> Result<()> {
        self.guard.check()?;
        self.device.lock().unwrap().reset()
    }

    /// Bytes this device has played since open or the last reset.
    pub fn position(&self) -> Result<u64> {
        self.guard.check()?;
        self.device.lock().unwrap().position()
    }

    /// Release the slot bindings, then close the device.
    pub fn dispose(&mut self) -> Result<()> {
        self.guard.dispose()?;
        debug!("Disposing output channel {}", self.device_index);
        self.bindings.clear();
        self.device.lock().unwrap().close()
    }
}

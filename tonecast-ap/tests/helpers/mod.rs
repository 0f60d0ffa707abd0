//! Test helper infrastructure for tonecast-ap integration tests
//!
//! Provides reusable test doubles for the playback engine's seams:
//! - FakeBackend / fake devices: record every submission and complete
//!   them under test control (or instantly, in auto mode)
//! - ScriptedSource: decoded-PCM source over fixed bytes, optionally
//!   failing at a chosen offset
//! - Tagged block constructors and a polling wait

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tonecast_ap::audio::backend::{
    CompletionSender, DeviceDescriptor, OutputBackend, OutputDevice, Submission,
};
use tonecast_ap::audio::source::AudioSource;
use tonecast_ap::audio::types::AudioFormat;
use tonecast_ap::error::{Error, Result};

// ========================================
// Fake output backend
// ========================================

/// Backend handing out fake devices. Every opened device is retained in
/// open order so tests can inspect and drive it after the fact.
pub struct FakeBackend {
    device_count: usize,
    auto_complete: bool,
    opened: Mutex<Vec<Arc<FakeDeviceHandle>>>,
}

impl FakeBackend {
    /// Backend whose devices hold submissions until the test completes
    /// them with [`FakeDeviceHandle::complete_one`].
    pub fn manual(device_count: usize) -> Arc<Self> {
        Arc::new(Self {
            device_count,
            auto_complete: false,
            opened: Mutex::new(Vec::new()),
        })
    }

    /// Backend whose devices complete every submission instantly.
    pub fn auto(device_count: usize) -> Arc<Self> {
        Arc::new(Self {
            device_count,
            auto_complete: true,
            opened: Mutex::new(Vec::new()),
        })
    }

    /// The n-th device opened through this backend, in open order across
    /// all sessions. Panics when fewer devices have been opened.
    pub fn opened(&self, n: usize) -> Arc<FakeDeviceHandle> {
        Arc::clone(&self.opened.lock().unwrap()[n])
    }

    /// How many devices have been opened so far.
    pub fn opened_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }
}

impl OutputBackend for FakeBackend {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        Ok((0..self.device_count)
            .map(|index| DeviceDescriptor {
                index,
                name: format!("Fake Card {}", index),
            })
            .collect())
    }

    fn open(
        &self,
        index: usize,
        _format: &AudioFormat,
        completions: CompletionSender,
    ) -> Result<Box<dyn OutputDevice>> {
        if index >= self.device_count {
            return Err(Error::device(
                "open",
                format!("no output device at index {}", index),
            ));
        }
        let handle = Arc::new(FakeDeviceHandle {
            index,
            auto_complete: self.auto_complete,
            completions,
            state: Mutex::new(FakeDeviceState::default()),
        });
        self.opened.lock().unwrap().push(Arc::clone(&handle));
        Ok(Box::new(FakeDevice {
            handle,
        }))
    }
}

// ========================================
// Fake device
// ========================================

/// Shared state of one opened fake device, inspectable from tests even
/// after the engine has taken ownership of the device itself.
pub struct FakeDeviceHandle {
    /// Backend ordinal the device was opened with.
    pub index: usize,
    auto_complete: bool,
    completions: CompletionSender,
    state: Mutex<FakeDeviceState>,
}

#[derive(Default)]
struct FakeDeviceState {
    submitted: Vec<Vec<u8>>,
    pending: VecDeque<Submission>,
    played: u64,
    pauses: usize,
    resumes: usize,
    resets: usize,
    closed: bool,
}

impl FakeDeviceHandle {
    /// Snapshot of every block submitted to this device, in order.
    pub fn submissions(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().submitted.clone()
    }

    /// Number of blocks submitted so far.
    pub fn submission_count(&self) -> usize {
        self.state.lock().unwrap().submitted.len()
    }

    /// Number of submissions handed over and not yet completed.
    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Complete the oldest pending submission, as the hardware would
    /// after draining it. Panics when nothing is pending.
    pub fn complete_one(&self) {
        let mut state = self.state.lock().unwrap();
        let submission = state
            .pending
            .pop_front()
            .expect("no pending submission to complete");
        state.played += submission.slot.len() as u64;
        drop(state);
        Self::finish(&self.completions, submission);
    }

    pub fn pauses(&self) -> usize {
        self.state.lock().unwrap().pauses
    }

    pub fn resumes(&self) -> usize {
        self.state.lock().unwrap().resumes
    }

    pub fn resets(&self) -> usize {
        self.state.lock().unwrap().resets
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Clear the in-queue flag before signaling, in that order, so the
    /// engine never observes a completion for a still-queued slot.
    fn finish(completions: &CompletionSender, submission: Submission) {
        submission.queued.store(false, Ordering::SeqCst);
        let _ = completions.send(());
    }

    fn drain_pending(&self, state: &mut FakeDeviceState) {
        while let Some(submission) = state.pending.pop_front() {
            Self::finish(&self.completions, submission);
        }
    }
}

/// The device object handed to the engine; all state lives in the handle.
struct FakeDevice {
    handle: Arc<FakeDeviceHandle>,
}

impl FakeDevice {
    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.handle.state.lock().unwrap().closed {
            return Err(Error::device(operation, "device is closed"));
        }
        Ok(())
    }
}

impl OutputDevice for FakeDevice {
    fn submit(&mut self, submission: Submission) -> Result<()> {
        self.ensure_open("submit")?;
        let mut state = self.handle.state.lock().unwrap();
        state.submitted.push(submission.slot.read().to_vec());
        if self.handle.auto_complete {
            state.played += submission.slot.len() as u64;
            drop(state);
            FakeDeviceHandle::finish(&self.handle.completions, submission);
        } else {
            state.pending.push_back(submission);
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.ensure_open("pause")?;
        self.handle.state.lock().unwrap().pauses += 1;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.ensure_open("resume")?;
        self.handle.state.lock().unwrap().resumes += 1;
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.ensure_open("reset")?;
        let mut state = self.handle.state.lock().unwrap();
        self.handle.drain_pending(&mut state);
        state.played = 0;
        state.resets += 1;
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        self.ensure_open("position")?;
        Ok(self.handle.state.lock().unwrap().played)
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open("close")?;
        let mut state = self.handle.state.lock().unwrap();
        self.handle.drain_pending(&mut state);
        state.closed = true;
        Ok(())
    }
}

// ========================================
// Scripted audio source
// ========================================

/// Decoded-PCM source over a fixed byte string. `failing_at` makes the
/// read that reaches the given offset fail, for worker-error tests.
pub struct ScriptedSource {
    format: AudioFormat,
    data: Vec<u8>,
    cursor: usize,
    fail_at: Option<usize>,
}

impl ScriptedSource {
    pub fn new(format: AudioFormat, data: Vec<u8>) -> Self {
        Self {
            format,
            data,
            cursor: 0,
            fail_at: None,
        }
    }

    pub fn failing_at(format: AudioFormat, data: Vec<u8>, fail_at: usize) -> Self {
        Self {
            format,
            data,
            cursor: 0,
            fail_at: Some(fail_at),
        }
    }
}

impl AudioSource for ScriptedSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(fail_at) = self.fail_at {
            if self.cursor >= fail_at {
                return Err(Error::Decode("scripted source failure".to_string()));
            }
        }
        let remaining = self.data.len() - self.cursor;
        let count = buf.len().min(remaining);
        buf[..count].copy_from_slice(&self.data[self.cursor..self.cursor + count]);
        self.cursor += count;
        Ok(count)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        self.cursor = (position as usize).min(self.data.len());
        Ok(())
    }

    fn position(&self) -> u64 {
        self.cursor as u64
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }
}

// ========================================
// Block and timing utilities
// ========================================

/// One block of `block_len` bytes, every byte set to `tag`.
pub fn tagged_block(block_len: usize, tag: u8) -> Vec<u8> {
    vec![tag; block_len]
}

/// `count` consecutive tagged blocks (tags 1..=count) as one stream.
pub fn tagged_stream(block_len: usize, count: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(block_len * count);
    for tag in 1..=count {
        data.extend_from_slice(&tagged_block(block_len, tag as u8));
    }
    data
}

/// Poll `condition` until it holds or `timeout` expires. Returns the
/// final evaluation, so callers can assert on it directly.
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

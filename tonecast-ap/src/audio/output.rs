//! cpal output backend
//!
//! Implements the [`OutputBackend`] seam on top of cpal. Devices are
//! addressed by enumeration ordinal. A `cpal::Stream` is not `Send`, so
//! each opened device runs a small owner thread that builds the stream,
//! holds it, and services pause/resume/reset/close commands over a
//! channel. Submissions bypass the owner thread: they land in a shared
//! pending queue that the stream callback drains.
//!
//! Completion semantics match the engine's queue protocol: a submission's
//! in-queue flag is cleared and one completion signal is sent exactly
//! when its final byte has been consumed by the callback, or immediately
//! when a reset throws it away. Underruns play silence without touching
//! the queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, Stream, StreamConfig};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::audio::backend::{
    CompletionSender, DeviceDescriptor, OutputBackend, OutputDevice, Submission,
};
use crate::audio::types::AudioFormat;
use crate::error::{Error, Result};

/// Backend over the host's default cpal audio host.
pub struct CpalBackend {
    host: cpal::Host,
}

impl CpalBackend {
    /// Create a backend over the default host.
    pub fn new() -> Self {
        let host = cpal::default_host();
        info!("Audio host: {:?}", host.id());
        Self { host }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBackend for CpalBackend {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        let devices = self
            .host
            .output_devices()
            .map_err(|e| Error::device("enumerate", e))?;

        // Keep ordinals stable even when a name query fails
        Ok(devices
            .enumerate()
            .map(|(index, device)| DeviceDescriptor {
                index,
                name: device.name().unwrap_or_else(|_| "Unknown".to_string()),
            })
            .collect())
    }

    fn open(
        &self,
        index: usize,
        format: &AudioFormat,
        completions: CompletionSender,
    ) -> Result<Box<dyn OutputDevice>> {
        let device = self
            .host
            .output_devices()
            .map_err(|e| Error::device("open", e))?
            .nth(index)
            .ok_or_else(|| Error::device("open", format!("no output device at index {}", index)))?;

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Opening output device {} ({})", index, name);

        let sample_format = device
            .default_output_config()
            .map_err(|e| Error::device("open", e))?
            .sample_format();

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let queue = Arc::new(PlayQueue::new(completions));
        let failed = Arc::new(AtomicBool::new(false));
        let (cmd_tx, cmd_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        let thread_queue = Arc::clone(&queue);
        let thread_failed = Arc::clone(&failed);
        std::thread::Builder::new()
            .name(format!("cpal-device-{}", index))
            .spawn(move || {
                device_thread(
                    device,
                    config,
                    sample_format,
                    thread_queue,
                    thread_failed,
                    cmd_rx,
                    ready_tx,
                );
            })
            .map_err(|e| Error::device("open", e))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(message)) => return Err(Error::device("open", message)),
            Err(_) => {
                return Err(Error::device("open", "device thread exited before ready"));
            }
        }

        debug!(
            "Device {} open: {} Hz, {} ch, {:?}",
            index, format.sample_rate, format.channels, sample_format
        );

        Ok(Box::new(CpalDevice {
            index,
            cmd_tx,
            queue,
            failed,
            closed: false,
        }))
    }
}

// ========================================
// Owner thread
// ========================================

enum DeviceCommand {
    Pause(Sender<std::result::Result<(), String>>),
    Resume(Sender<std::result::Result<(), String>>),
    Reset(Sender<std::result::Result<(), String>>),
    Close(Sender<std::result::Result<(), String>>),
}

/// Builds the stream, reports readiness, then services commands until
/// close or until every device handle is gone.
fn device_thread(
    device: cpal::Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    queue: Arc<PlayQueue>,
    failed: Arc<AtomicBool>,
    cmd_rx: Receiver<DeviceCommand>,
    ready_tx: Sender<std::result::Result<(), String>>,
) {
    let stream = match build_stream(&device, &config, sample_format, Arc::clone(&queue), failed) {
        Ok(stream) => stream,
        Err(message) => {
            let _ = ready_tx.send(Err(message));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(format!("Failed to start stream: {}", e)));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    for command in cmd_rx {
        match command {
            DeviceCommand::Pause(reply) => {
                let _ = reply.send(stream.pause().map_err(|e| e.to_string()));
            }
            DeviceCommand::Resume(reply) => {
                let _ = reply.send(stream.play().map_err(|e| e.to_string()));
            }
            DeviceCommand::Reset(reply) => {
                queue.reset();
                let _ = reply.send(Ok(()));
            }
            DeviceCommand::Close(reply) => {
                let _ = reply.send(Ok(()));
                break;
            }
        }
    }

    // Complete anything still queued so no wrapper stays marked in-queue
    queue.reset();
    drop(stream);
    debug!("Device thread exiting");
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    queue: Arc<PlayQueue>,
    failed: Arc<AtomicBool>,
) -> std::result::Result<Stream, String> {
    let err_fn = move |err| {
        error!("Audio stream error: {}", err);
        failed.store(true, Ordering::SeqCst);
    };

    let stream = match sample_format {
        SampleFormat::I16 => device
            .build_output_stream(
                config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    queue.fill_i16(data);
                },
                err_fn,
                None,
            )
            .map_err(|e| format!("Failed to build stream: {}", e))?,
        SampleFormat::F32 => device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    queue.fill_f32(data);
                },
                err_fn,
                None,
            )
            .map_err(|e| format!("Failed to build stream: {}", e))?,
        other => return Err(format!("Unsupported sample format: {:?}", other)),
    };

    Ok(stream)
}

// ========================================
// Shared play queue
// ========================================

struct ActiveSubmission {
    slot: Arc<crate::playback::pool::Slot>,
    queued: Arc<AtomicBool>,
    offset: usize,
}

/// Pending submissions shared between device handle, owner thread and
/// stream callback. Critical sections stay short: the callback copies
/// samples out under the lock, submit pushes one entry.
struct PlayQueue {
    pending: Mutex<VecDeque<ActiveSubmission>>,
    played_bytes: AtomicU64,
    completions: CompletionSender,
}

impl PlayQueue {
    fn new(completions: CompletionSender) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            played_bytes: AtomicU64::new(0),
            completions,
        }
    }

    fn push(&self, submission: Submission) {
        let mut pending = self.pending.lock().unwrap();
        pending.push_back(ActiveSubmission {
            slot: submission.slot,
            queued: submission.queued,
            offset: 0,
        });
    }

    /// Throw away all pending submissions, completing each, and rewind
    /// the played-byte counter.
    fn reset(&self) {
        let mut pending = self.pending.lock().unwrap();
        while Self::complete_front(&mut pending, &self.completions) {}
        self.played_bytes.store(0, Ordering::SeqCst);
    }

    fn fill_i16(&self, data: &mut [i16]) {
        let mut pending = self.pending.lock().unwrap();
        let mut consumed = 0u64;
        for sample in data.iter_mut() {
            *sample = Self::next_sample(&mut pending, &self.completions, &mut consumed);
        }
        drop(pending);
        if consumed > 0 {
            self.played_bytes.fetch_add(consumed, Ordering::SeqCst);
        }
    }

    fn fill_f32(&self, data: &mut [f32]) {
        let mut pending = self.pending.lock().unwrap();
        let mut consumed = 0u64;
        for sample in data.iter_mut() {
            let raw = Self::next_sample(&mut pending, &self.completions, &mut consumed);
            *sample = raw as f32 / 32768.0;
        }
        drop(pending);
        if consumed > 0 {
            self.played_bytes.fetch_add(consumed, Ordering::SeqCst);
        }
    }

    /// Pull the next sample from the front submission, completing it when
    /// its final byte goes out. Silence on an empty queue.
    fn next_sample(
        pending: &mut VecDeque<ActiveSubmission>,
        completions: &CompletionSender,
        consumed: &mut u64,
    ) -> i16 {
        while let Some(active) = pending.front_mut() {
            let bytes = active.slot.read();
            if active.offset + 2 <= bytes.len() {
                let value = i16::from_le_bytes([bytes[active.offset], bytes[active.offset + 1]]);
                active.offset += 2;
                *consumed += 2;
                let finished = active.offset >= bytes.len();
                drop(bytes);
                if finished {
                    Self::complete_front(pending, completions);
                }
                return value;
            }
            // Exhausted entry (or odd trailing byte): complete, try next
            drop(bytes);
            Self::complete_front(pending, completions);
        }
        0
    }

    fn complete_front(
        pending: &mut VecDeque<ActiveSubmission>,
        completions: &CompletionSender,
    ) -> bool {
        match pending.pop_front() {
            Some(done) => {
                done.queued.store(false, Ordering::SeqCst);
                let _ = completions.send(());
                true
            }
            None => false,
        }
    }
}

// ========================================
// Device handle
// ========================================

/// Handle to an opened cpal device. Control calls round-trip through the
/// owner thread; submissions go straight to the shared queue.
pub struct CpalDevice {
    index: usize,
    cmd_tx: Sender<DeviceCommand>,
    queue: Arc<PlayQueue>,
    failed: Arc<AtomicBool>,
    closed: bool,
}

impl CpalDevice {
    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.closed {
            return Err(Error::device(operation, "device is closed"));
        }
        Ok(())
    }

    fn command(
        &mut self,
        operation: &'static str,
        make: impl FnOnce(Sender<std::result::Result<(), String>>) -> DeviceCommand,
    ) -> Result<()> {
        self.ensure_open(operation)?;
        let (reply_tx, reply_rx) = bounded(1);
        self.cmd_tx
            .send(make(reply_tx))
            .map_err(|_| Error::device(operation, "device thread is gone"))?;
        match reply_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(Error::device(operation, message)),
            Err(_) => Err(Error::device(operation, "no reply from device thread")),
        }
    }
}

impl OutputDevice for CpalDevice {
    fn submit(&mut self, submission: Submission) -> Result<()> {
        self.ensure_open("submit")?;
        if self.failed.load(Ordering::SeqCst) {
            return Err(Error::device("submit", "output stream failed"));
        }
        self.queue.push(submission);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.command("pause", DeviceCommand::Pause)
    }

    fn resume(&mut self) -> Result<()> {
        self.command("resume", DeviceCommand::Resume)
    }

    fn reset(&mut self) -> Result<()> {
        self.command("reset", DeviceCommand::Reset)
    }

    fn position(&self) -> Result<u64> {
        self.ensure_open("position")?;
        Ok(self.queue.played_bytes.load(Ordering::SeqCst))
    }

    fn close(&mut self) -> Result<()> {
        self.command("close", DeviceCommand::Close)?;
        self.closed = true;
        debug!("Closed output device {}", self.index);
        Ok(())
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Output device {} dropped without close", self.index);
        }
        // Dropping cmd_tx disconnects the owner thread, which tears the
        // stream down and completes anything still queued.
    }
}

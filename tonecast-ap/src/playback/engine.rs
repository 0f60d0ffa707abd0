//! Output fan-out engine
//!
//! Plays one decoded stream on any number of output devices in lock-step.
//! A dedicated worker thread keeps the slot pool full: it waits for a
//! completion on any channel (or a control kick), then scans the slots.
//! A slot that no channel has in flight is refilled with the next source
//! block and submitted to every channel; a slot still queued anywhere is
//! left untouched, which keeps all devices on the same block sequence.
//!
//! Channels can join and leave mid-playback. The channel set is locked
//! for the duration of a slot pass, so a joining channel starts receiving
//! blocks at the next pass and never observes a partial one.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{bounded, Receiver, Select, Sender};
use tonecast_common::DisposedGuard;
use tracing::{debug, error, info, warn};

use crate::audio::backend::{CompletionReceiver, OutputBackend};
use crate::audio::source::SharedSource;
use crate::audio::types::AudioFormat;
use crate::config::PlaybackConfig;
use crate::error::{Error, Result};
use crate::playback::channel::OutputChannel;
use crate::playback::pool::BufferPool;
use crate::playback::reader::BlockReader;
use crate::playback::state::{PlaybackState, StateCell};

/// Callback fired exactly once per play session when the worker stops,
/// carrying the failure if the session did not end normally.
pub type StoppedHandler = Arc<dyn Fn(Option<Error>) + Send + Sync>;

/// Buffering settings for an engine session.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Total buffered latency across all slots, in milliseconds.
    pub desired_latency_ms: u32,

    /// Number of pool slots the latency is divided across.
    pub buffer_count: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            desired_latency_ms: 300,
            buffer_count: 2,
        }
    }
}

impl From<PlaybackConfig> for EngineSettings {
    fn from(config: PlaybackConfig) -> Self {
        Self {
            desired_latency_ms: config.desired_latency_ms,
            buffer_count: config.buffer_count,
        }
    }
}

/// One playback session fanning a source out to N devices.
pub struct FanoutEngine {
    shared: Arc<EngineShared>,
}

struct EngineShared {
    pool: BufferPool,
    format: AudioFormat,
    backend: Arc<dyn OutputBackend>,
    reader: Mutex<BlockReader>,
    channels: Mutex<Vec<OutputChannel>>,
    state: StateCell,
    kick_tx: Sender<()>,
    kick_rx: Receiver<()>,
    stopped_handler: Mutex<Option<StoppedHandler>>,
    guard: DisposedGuard,
}

impl FanoutEngine {
    /// Build a session around `source`.
    ///
    /// Slot sizing follows the latency budget: each of the
    /// `buffer_count` slots holds `ceil(desired_latency_ms /
    /// buffer_count)` milliseconds of audio, rounded up to a whole frame.
    pub fn new(
        source: SharedSource,
        backend: Arc<dyn OutputBackend>,
        settings: EngineSettings,
    ) -> Result<Self> {
        if settings.buffer_count == 0 {
            return Err(Error::Config("buffer_count must be at least 1".to_string()));
        }
        if settings.desired_latency_ms == 0 {
            return Err(Error::Config(
                "desired_latency_ms must be at least 1".to_string(),
            ));
        }

        let format = source.lock().unwrap().format();
        let slot_ms = (settings.desired_latency_ms + settings.buffer_count as u32 - 1)
            / settings.buffer_count as u32;
        let slot_len = format.latency_to_bytes(slot_ms);
        let pool = BufferPool::new(settings.buffer_count, slot_len)?;
        let reader = BlockReader::new(source, slot_len);
        let (kick_tx, kick_rx) = bounded(1);

        debug!(
            "Engine session: {} slots x {} bytes ({} ms each)",
            settings.buffer_count, slot_len, slot_ms
        );

        Ok(Self {
            shared: Arc::new(EngineShared {
                pool,
                format,
                backend,
                reader: Mutex::new(reader),
                channels: Mutex::new(Vec::new()),
                state: StateCell::new(),
                kick_tx,
                kick_rx,
                stopped_handler: Mutex::new(None),
                guard: DisposedGuard::new("FanoutEngine"),
            }),
        })
    }

    /// Current state of the session.
    pub fn state(&self) -> PlaybackState {
        self.shared.state.get()
    }

    /// PCM format this session plays.
    pub fn format(&self) -> AudioFormat {
        self.shared.format
    }

    /// The slot pool backing this session.
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.shared.pool
    }

    /// Number of channels currently fanned out to.
    pub fn channel_count(&self) -> usize {
        self.shared.channels.lock().unwrap().len()
    }

    /// Whether the device at `device_index` participates in this session.
    pub fn has_channel(&self, device_index: usize) -> bool {
        self.shared
            .channels
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.device_index() == device_index)
    }

    /// Register the stopped callback. Replaces any previous handler.
    pub fn set_stopped_handler<F>(&self, handler: F)
    where
        F: Fn(Option<Error>) + Send + Sync + 'static,
    {
        *self.shared.stopped_handler.lock().unwrap() = Some(Arc::new(handler));
    }

    /// Start or resume playback.
    ///
    /// From Stopped this spawns a fresh worker; from Paused it resumes
    /// every device natively; while Playing it is a no-op.
    pub fn play(&self) -> Result<()> {
        self.shared.guard.check()?;
        match self.shared.state.get() {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => {
                {
                    let channels = self.shared.channels.lock().unwrap();
                    for channel in channels.iter() {
                        channel.resume()?;
                    }
                }
                self.shared.state.set(PlaybackState::Playing);
                self.kick();
                Ok(())
            }
            PlaybackState::Stopped => {
                // CAS so two racing play calls spawn one worker
                if self
                    .shared
                    .state
                    .transition(PlaybackState::Stopped, PlaybackState::Playing)
                {
                    if let Err(e) = self.spawn_worker() {
                        self.shared.state.set(PlaybackState::Stopped);
                        return Err(e);
                    }
                    info!("Playback started");
                    self.kick();
                }
                Ok(())
            }
        }
    }

    /// Pause all devices. No-op unless playing.
    pub fn pause(&self) -> Result<()> {
        self.shared.guard.check()?;
        if self.shared.state.get() != PlaybackState::Playing {
            return Ok(());
        }
        let channels = self.shared.channels.lock().unwrap();
        for channel in channels.iter() {
            channel.pause()?;
        }
        drop(channels);
        self.shared.state.set(PlaybackState::Paused);
        info!("Playback paused");
        Ok(())
    }

    /// Stop the session.
    ///
    /// The state flips to Stopped before the devices are reset, so the
    /// worker observes the stop no matter which wake arrives first. Does
    /// not wait for the worker to exit; termination is reported through
    /// the stopped callback.
    pub fn stop(&self) -> Result<()> {
        self.shared.guard.check()?;
        if self.shared.state.get() == PlaybackState::Stopped {
            return Ok(());
        }
        self.shared.state.set(PlaybackState::Stopped);
        {
            let channels = self.shared.channels.lock().unwrap();
            for channel in channels.iter() {
                channel.reset()?;
            }
        }
        self.kick();
        info!("Playback stopped");
        Ok(())
    }

    /// Open the device at `device_index` and fold it into the fan-out.
    ///
    /// The new channel receives blocks from the next slot pass onward.
    /// Opening is allowed in every state; a device added while paused is
    /// paused immediately so it stays in step on resume.
    pub fn add_channel(&self, device_index: usize) -> Result<()> {
        self.shared.guard.check()?;
        let mut channels = self.shared.channels.lock().unwrap();
        if channels.iter().any(|c| c.device_index() == device_index) {
            return Err(Error::BadRequest(format!(
                "Device {} is already part of this session",
                device_index
            )));
        }

        let channel = OutputChannel::open(
            self.shared.backend.as_ref(),
            device_index,
            &self.shared.format,
            &self.shared.pool,
        )?;
        if self.shared.state.get() == PlaybackState::Paused {
            channel.pause()?;
        }
        channels.push(channel);
        drop(channels);

        self.kick();
        info!("Added output channel {}", device_index);
        Ok(())
    }

    /// Remove the device at `device_index` from the fan-out and close it.
    /// Removing a device that is not part of the session is a no-op.
    pub fn remove_channel(&self, device_index: usize) -> Result<()> {
        self.shared.guard.check()?;
        let mut channels = self.shared.channels.lock().unwrap();
        let Some(position) = channels.iter().position(|c| c.device_index() == device_index)
        else {
            warn!("Device {} is not part of this session", device_index);
            return Ok(());
        };
        let mut channel = channels.remove(position);
        drop(channels);

        let result = channel.dispose();
        self.kick();
        info!("Removed output channel {}", device_index);
        result
    }

    /// Bytes played by the first channel, zero with no channels.
    pub fn position(&self) -> Result<u64> {
        self.shared.guard.check()?;
        let channels = self.shared.channels.lock().unwrap();
        match channels.first() {
            Some(channel) => channel.position(),
            None => Ok(0),
        }
    }

    /// Tear the session down: unhook the stopped callback, stop the
    /// worker, dispose every channel.
    pub fn dispose(&self) -> Result<()> {
        self.shared.guard.dispose()?;
        debug!("Disposing engine session");

        *self.shared.stopped_handler.lock().unwrap() = None;
        self.shared.state.set(PlaybackState::Stopped);

        let mut channels = self.shared.channels.lock().unwrap();
        for mut channel in channels.drain(..) {
            let index = channel.device_index();
            if let Err(e) = channel.dispose() {
                warn!("Failed to dispose channel {}: {}", index, e);
            }
        }
        drop(channels);

        self.kick();
        Ok(())
    }

    /// Wake the worker; a wake already pending is enough.
    fn kick(&self) {
        let _ = self.shared.kick_tx.try_send(());
    }

    fn spawn_worker(&self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("fanout-engine".to_string())
            .spawn(move || worker_main(shared))
            .map_err(|e| Error::Worker(format!("Failed to spawn worker: {}", e)))?;
        Ok(())
    }
}

// ========================================
// Worker
// ========================================

fn worker_main(shared: Arc<EngineShared>) {
    debug!("Engine worker started");
    let outcome = catch_unwind(AssertUnwindSafe(|| run_session(&shared)));
    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            error!("Playback session failed: {}", e);
            Some(e)
        }
        Err(panic) => {
            let message = panic_message(panic);
            error!("Playback worker panicked: {}", message);
            Some(Error::Worker(message))
        }
    };

    shared.state.set(PlaybackState::Stopped);
    notify_stopped(&shared, error);
    debug!("Engine worker exited");
}

/// The wait-then-scan loop. Returns when stopped or when the source is
/// drained and nothing is queued anywhere.
fn run_session(shared: &EngineShared) -> Result<()> {
    loop {
        if shared.state.get() == PlaybackState::Stopped {
            return Ok(());
        }

        wait_for_wake(shared);

        match shared.state.get() {
            PlaybackState::Stopped => return Ok(()),
            PlaybackState::Paused => continue,
            PlaybackState::Playing => {}
        }

        if !fill_pass(shared)? {
            info!("End of stream reached");
            return Ok(());
        }
    }
}

/// Block until any channel completes a submission or a kick arrives.
///
/// The wait set is rebuilt from the live channel list on every call, so
/// channels added or removed while waiting take effect at the next wake.
fn wait_for_wake(shared: &EngineShared) {
    let completions: Vec<CompletionReceiver> = {
        let channels = shared.channels.lock().unwrap();
        channels.iter().map(|c| c.completions().clone()).collect()
    };

    let mut select = Select::new();
    let kick_index = select.recv(&shared.kick_rx);
    for receiver in &completions {
        select.recv(receiver);
    }

    let operation = select.select();
    let index = operation.index();
    if index == kick_index {
        let _ = operation.recv(&shared.kick_rx);
    } else {
        // A disconnected receiver wakes us too; the next snapshot drops it
        let _ = operation.recv(&completions[index - 1]);
    }
}

/// One slot pass. Returns false when the source is exhausted and no
/// channel holds any block in flight, which ends the session.
fn fill_pass(shared: &EngineShared) -> Result<bool> {
    let channels = shared.channels.lock().unwrap();

    // Nothing to feed. Idle without consuming the source, so a channel
    // added later resumes exactly where fan-out left off.
    if channels.is_empty() {
        return Ok(true);
    }

    let mut have_audio = false;
    for slot_index in 0..shared.pool.slot_count() {
        if channels.iter().any(|c| c.is_queued(slot_index)) {
            // Still in flight somewhere; never refill under a reader
            have_audio = true;
            continue;
        }

        let block_written = {
            let mut reader = shared.reader.lock().unwrap();
            match reader.read()? {
                Some(block) => {
                    shared.pool.write(slot_index, block)?;
                    true
                }
                None => false,
            }
        };

        if block_written {
            for channel in channels.iter() {
                channel.submit(slot_index)?;
            }
            have_audio = true;
        }
    }

    Ok(have_audio)
}

fn notify_stopped(shared: &EngineShared, error: Option<Error>) {
    let handler = shared.stopped_handler.lock().unwrap().clone();
    if let Some(handler) = handler {
        handler(error);
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

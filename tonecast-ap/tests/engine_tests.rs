//! Integration tests for the output fan-out engine
//!
//! Each test drives a real engine worker against fake devices whose
//! completions the test controls, so slot passes happen at precisely
//! chosen moments. The scripted sources use 8 kHz mono 16-bit PCM (16
//! bytes per millisecond) with 2 ms of latency over 2 slots, giving a
//! 16-byte slot that holds exactly one tagged block.

mod helpers;

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use tonecast_ap::audio::source::shared;
use tonecast_ap::audio::types::AudioFormat;
use tonecast_ap::error::Error;
use tonecast_ap::playback::engine::{EngineSettings, FanoutEngine};
use tonecast_ap::playback::state::PlaybackState;

use helpers::{tagged_block, tagged_stream, wait_until, FakeBackend, ScriptedSource};

const BLOCK: usize = 16;
const WAIT: Duration = Duration::from_secs(5);
const SETTINGS: EngineSettings = EngineSettings {
    desired_latency_ms: 2,
    buffer_count: 2,
};

fn test_format() -> AudioFormat {
    AudioFormat::pcm16(8000, 1)
}

fn block(tag: u8) -> Vec<u8> {
    tagged_block(BLOCK, tag)
}

/// Engine over a source of `blocks` tagged blocks.
fn engine_over(blocks: usize, backend: Arc<FakeBackend>) -> FanoutEngine {
    let source = shared(Box::new(ScriptedSource::new(
        test_format(),
        tagged_stream(BLOCK, blocks),
    )));
    FanoutEngine::new(source, backend, SETTINGS).unwrap()
}

#[test]
fn three_blocks_two_slots_play_in_order_then_stop() {
    let backend = FakeBackend::manual(1);
    let engine = engine_over(3, Arc::clone(&backend));
    let (stopped_tx, stopped_rx) = mpsc::channel();
    engine.set_stopped_handler(move |error| {
        stopped_tx.send(error).unwrap();
    });

    engine.add_channel(0).unwrap();
    engine.play().unwrap();
    assert_eq!(engine.state(), PlaybackState::Playing);

    // The first pass fills both slots
    let device = backend.opened(0);
    assert!(wait_until(WAIT, || device.submission_count() == 2));
    assert_eq!(device.submissions(), vec![block(1), block(2)]);

    // Draining the first slot frees it for the third block
    device.complete_one();
    assert!(wait_until(WAIT, || device.submission_count() == 3));
    assert_eq!(device.submissions()[2], block(3));

    // Draining the rest exhausts the source and ends the session
    device.complete_one();
    device.complete_one();
    let error = stopped_rx.recv_timeout(WAIT).unwrap();
    assert!(error.is_none());
    assert_eq!(engine.state(), PlaybackState::Stopped);
    assert_eq!(device.submission_count(), 3);
}

#[test]
fn slot_is_not_refilled_while_any_channel_still_queues_it() {
    let backend = FakeBackend::manual(2);
    let engine = engine_over(4, Arc::clone(&backend));
    engine.add_channel(0).unwrap();
    engine.add_channel(1).unwrap();
    engine.play().unwrap();

    let first = backend.opened(0);
    let second = backend.opened(1);
    assert!(wait_until(WAIT, || {
        first.submission_count() == 2 && second.submission_count() == 2
    }));

    // One device drains the first slot; the other still holds it
    first.complete_one();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(first.submission_count(), 2);
    assert_eq!(second.submission_count(), 2);

    // Once the slot drains everywhere it is refilled for both devices
    second.complete_one();
    assert!(wait_until(WAIT, || {
        first.submission_count() == 3 && second.submission_count() == 3
    }));
    assert_eq!(first.submissions()[2], block(3));
    assert_eq!(second.submissions()[2], block(3));

    engine.dispose().unwrap();
}

#[test]
fn channel_added_mid_stream_receives_the_block_suffix() {
    let backend = FakeBackend::manual(2);
    let engine = engine_over(4, Arc::clone(&backend));
    engine.add_channel(0).unwrap();
    engine.play().unwrap();

    let veteran = backend.opened(0);
    assert!(wait_until(WAIT, || veteran.submission_count() == 2));

    // Joins while both slots are still in flight on the veteran device,
    // so it gets nothing until the next refill
    engine.add_channel(1).unwrap();
    let newcomer = backend.opened(1);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(newcomer.submission_count(), 0);

    veteran.complete_one();
    assert!(wait_until(WAIT, || {
        veteran.submission_count() == 3 && newcomer.submission_count() == 1
    }));
    veteran.complete_one();
    assert!(wait_until(WAIT, || {
        veteran.submission_count() == 4 && newcomer.submission_count() == 2
    }));

    // The newcomer received exactly the suffix the veteran got
    assert_eq!(
        veteran.submissions(),
        vec![block(1), block(2), block(3), block(4)]
    );
    assert_eq!(newcomer.submissions(), vec![block(3), block(4)]);

    engine.dispose().unwrap();
}

#[test]
fn source_with_five_blocks_submits_exactly_five_and_stops_clean() {
    let backend = FakeBackend::auto(1);
    let engine = engine_over(5, Arc::clone(&backend));
    let (stopped_tx, stopped_rx) = mpsc::channel();
    engine.set_stopped_handler(move |error| {
        stopped_tx.send(error.map(|e| e.to_string())).unwrap();
    });

    engine.add_channel(0).unwrap();
    engine.play().unwrap();

    assert_eq!(stopped_rx.recv_timeout(WAIT).unwrap(), None);
    assert_eq!(engine.state(), PlaybackState::Stopped);
    let expected: Vec<Vec<u8>> = (1..=5u8).map(block).collect();
    assert_eq!(backend.opened(0).submissions(), expected);
}

#[test]
fn pause_resume_does_not_reread_or_skip_blocks() {
    let backend = FakeBackend::manual(1);
    let engine = engine_over(3, Arc::clone(&backend));
    engine.add_channel(0).unwrap();
    engine.play().unwrap();

    let device = backend.opened(0);
    assert!(wait_until(WAIT, || device.submission_count() == 2));

    engine.pause().unwrap();
    assert_eq!(engine.state(), PlaybackState::Paused);
    assert_eq!(device.pauses(), 1);

    // A completion while paused must not trigger a refill
    device.complete_one();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(device.submission_count(), 2);

    engine.play().unwrap();
    assert_eq!(engine.state(), PlaybackState::Playing);
    assert_eq!(device.resumes(), 1);

    // The refill picks up exactly where the fill left off
    assert!(wait_until(WAIT, || device.submission_count() == 3));
    assert_eq!(device.submissions(), vec![block(1), block(2), block(3)]);

    engine.dispose().unwrap();
}

#[test]
fn channel_added_while_paused_joins_paused() {
    let backend = FakeBackend::manual(2);
    let engine = engine_over(4, Arc::clone(&backend));
    engine.add_channel(0).unwrap();
    engine.play().unwrap();

    let first = backend.opened(0);
    assert!(wait_until(WAIT, || first.submission_count() == 2));

    engine.pause().unwrap();
    engine.add_channel(1).unwrap();
    let second = backend.opened(1);
    assert_eq!(second.pauses(), 1);
    assert_eq!(second.submission_count(), 0);

    // Resume feeds the newcomer as slots drain
    engine.play().unwrap();
    assert_eq!(second.resumes(), 1);
    first.complete_one();
    assert!(wait_until(WAIT, || second.submission_count() == 1));
    assert_eq!(second.submissions(), vec![block(3)]);

    engine.dispose().unwrap();
}

#[test]
fn removing_the_last_channel_idles_without_consuming_the_source() {
    let backend = FakeBackend::manual(2);
    let source = shared(Box::new(ScriptedSource::new(
        test_format(),
        tagged_stream(BLOCK, 4),
    )));
    let engine = FanoutEngine::new(Arc::clone(&source), backend.clone(), SETTINGS).unwrap();

    engine.add_channel(0).unwrap();
    engine.play().unwrap();

    let first = backend.opened(0);
    assert!(wait_until(WAIT, || first.submission_count() == 2));
    assert_eq!(source.lock().unwrap().position(), (2 * BLOCK) as u64);

    // Dropping the only channel stops consumption but not the session
    engine.remove_channel(0).unwrap();
    assert!(first.is_closed());
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(engine.state(), PlaybackState::Playing);
    assert_eq!(source.lock().unwrap().position(), (2 * BLOCK) as u64);

    // A rejoining channel picks up at the first unplayed block
    engine.add_channel(1).unwrap();
    let second = backend.opened(1);
    assert!(wait_until(WAIT, || second.submission_count() == 2));
    assert_eq!(second.submissions(), vec![block(3), block(4)]);

    engine.dispose().unwrap();
}

#[test]
fn source_failure_stops_the_session_and_reports_the_error() {
    let backend = FakeBackend::auto(1);
    let source = shared(Box::new(ScriptedSource::failing_at(
        test_format(),
        tagged_stream(BLOCK, 4),
        2 * BLOCK,
    )));
    let engine = FanoutEngine::new(Arc::clone(&source), backend.clone(), SETTINGS).unwrap();
    let (stopped_tx, stopped_rx) = mpsc::channel();
    engine.set_stopped_handler(move |error| {
        stopped_tx.send(error).unwrap();
    });

    engine.add_channel(0).unwrap();
    engine.play().unwrap();

    let error = stopped_rx.recv_timeout(WAIT).unwrap();
    assert!(matches!(error, Some(Error::Decode(_))));
    assert_eq!(engine.state(), PlaybackState::Stopped);

    // The first two blocks made it out before the failure
    assert_eq!(backend.opened(0).submissions(), vec![block(1), block(2)]);
}

#[test]
fn stop_flips_state_immediately_and_resets_devices() {
    let backend = FakeBackend::manual(1);
    let engine = engine_over(8, Arc::clone(&backend));
    let (stopped_tx, stopped_rx) = mpsc::channel();
    engine.set_stopped_handler(move |error| {
        stopped_tx.send(error.is_none()).unwrap();
    });

    engine.add_channel(0).unwrap();
    engine.play().unwrap();

    let device = backend.opened(0);
    assert!(wait_until(WAIT, || device.submission_count() == 2));

    engine.stop().unwrap();
    assert_eq!(engine.state(), PlaybackState::Stopped);
    assert_eq!(device.resets(), 1);
    assert_eq!(device.pending_count(), 0);

    // The worker exits and reports a clean stop
    assert!(stopped_rx.recv_timeout(WAIT).unwrap());
}

// C5 — Playback Stage: accepts streamed 24 kHz PCM chunks into a ring,
// waits for a pre-buffer threshold, then continuously writes to I²S with
// in-place volume scaling. State machine: `Stopped → Streaming → Draining
// → Stopped`.

use crate::error::{CoreError, CoreResult};
use crate::i2s::I2sOutput;
use crate::ring::{PcmRing, PushMode};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Effectively-unbounded wait for `stream_write`'s blocking push — the
/// network producer is the only thing expected to apply backpressure here.
const UNBOUNDED_WAIT: Duration = Duration::from_secs(86_400);

const GRACE_WINDOW: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Streaming,
    Draining,
}

#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    Started,
    Completed,
    Error(String),
}

pub type PlaybackEventSink = Box<dyn Fn(PlaybackEvent) + Send + Sync>;

pub struct PlaybackStage {
    ring: Arc<PcmRing>,
    streaming_active: Arc<AtomicBool>,
    volume_percent: Arc<AtomicU8>,
    state: Arc<Mutex<PlaybackState>>,
    worker: Option<JoinHandle<()>>,
    ring_capacity_bytes: usize,
    prebuffer_bytes: usize,
}

impl PlaybackStage {
    pub fn new(ring_capacity_bytes: usize, prebuffer_bytes: usize, volume_percent: u8) -> Self {
        Self {
            ring: Arc::new(PcmRing::new()),
            streaming_active: Arc::new(AtomicBool::new(false)),
            volume_percent: Arc::new(AtomicU8::new(volume_percent)),
            state: Arc::new(Mutex::new(PlaybackState::Stopped)),
            worker: None,
            ring_capacity_bytes,
            prebuffer_bytes,
        }
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.lock().unwrap()
    }

    /// Allocate the ring and spawn the worker. Fails if already streaming.
    pub fn stream_start(
        &mut self,
        output: Box<dyn I2sOutput>,
        events: PlaybackEventSink,
    ) -> CoreResult<()> {
        if self.state() != PlaybackState::Stopped {
            return Err(CoreError::InvalidArgument(
                "playback stream already active".into(),
            ));
        }

        self.ring.allocate(self.ring_capacity_bytes);
        self.streaming_active.store(true, Ordering::Release);
        *self.state.lock().unwrap() = PlaybackState::Streaming;

        let ring = Arc::clone(&self.ring);
        let streaming_active = Arc::clone(&self.streaming_active);
        let volume_percent = Arc::clone(&self.volume_percent);
        let state = Arc::clone(&self.state);
        let prebuffer_bytes = self.prebuffer_bytes;

        let handle = thread::spawn(move || {
            run_worker(ring, streaming_active, volume_percent, state, prebuffer_bytes, output, events)
        });
        self.worker = Some(handle);
        Ok(())
    }

    /// Blocking push into the ring; the network producer absorbs
    /// backpressure naturally, so this call never drops audio.
    pub fn stream_write(&self, bytes: &[u8]) -> CoreResult<usize> {
        self.ring.push(bytes, PushMode::Block, UNBOUNDED_WAIT)
    }

    /// Clear `streaming_active` so the worker drains and exits, waiting up
    /// to a 3s grace window before abandoning it.
    pub fn stream_end(&mut self) {
        if self.state() == PlaybackState::Stopped {
            return;
        }
        self.streaming_active.store(false, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                let _ = handle.join();
                let _ = tx.send(());
            });
            if rx.recv_timeout(GRACE_WINDOW).is_err() {
                log::warn!("playback: worker did not drain within the 3s grace window, abandoning");
            }
        }
        self.ring.reset();
        *self.state.lock().unwrap() = PlaybackState::Stopped;
    }

    pub fn set_volume(&self, percent: u8) -> CoreResult<()> {
        if percent > 100 {
            return Err(CoreError::InvalidArgument("volume_percent must be <= 100".into()));
        }
        self.volume_percent.store(percent, Ordering::Release);
        Ok(())
    }
}

fn run_worker(
    ring: Arc<PcmRing>,
    streaming_active: Arc<AtomicBool>,
    volume_percent: Arc<AtomicU8>,
    state: Arc<Mutex<PlaybackState>>,
    prebuffer_bytes: usize,
    mut output: Box<dyn I2sOutput>,
    events: PlaybackEventSink,
) {
    // Pre-buffer gate: don't start writing until the ring holds enough to
    // ride out initial network jitter, unless streaming already ended.
    loop {
        if ring.len() >= prebuffer_bytes || !streaming_active.load(Ordering::Acquire) {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    let mut started = false;
    loop {
        let is_active = streaming_active.load(Ordering::Acquire);
        if !is_active {
            *state.lock().unwrap() = PlaybackState::Draining;
        }
        let deadline = if is_active {
            Duration::from_millis(100)
        } else {
            Duration::from_millis(10)
        };

        let popped = ring.pop_up_to(4_096, deadline).unwrap_or_default();
        if popped.is_empty() {
            if !is_active {
                events(PlaybackEvent::Completed);
                return;
            }
            continue;
        }

        if !started {
            started = true;
            events(PlaybackEvent::Started);
        }

        let mut samples = le_bytes_to_samples(&popped);
        apply_volume(&mut samples, volume_percent.load(Ordering::Acquire));

        if let Err(e) = output.write_samples(&samples) {
            events(PlaybackEvent::Error(e.to_string()));
            return;
        }
    }
}

fn apply_volume(samples: &mut [i16], percent: u8) {
    if percent == 100 {
        return;
    }
    for s in samples.iter_mut() {
        *s = ((*s as i32) * percent as i32 / 100) as i16;
    }
}

fn le_bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

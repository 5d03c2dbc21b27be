// C4 — Capture Stage: pulls fixed-size 32-bit I²S frames, converts to
// 16-bit PCM at 16 kHz, emits 100 ms (1,600-sample / 3,200-byte) chunks to
// a sink callback. One worker thread per the spec's "one task pinned to a
// designated core (or one thread)" — see DESIGN.md OQ-1 for the affinity
// policy.

use crate::error::CoreResult;
use crate::i2s::{I2sInput, I2S_READ_FRAME_SAMPLES};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const CHUNK_SAMPLES: usize = 1_600;
pub const CHUNK_BYTES: usize = CHUNK_SAMPLES * 2;

pub type CaptureSink = Box<dyn FnMut(&[u8]) + Send>;

#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Off by default. When enabled, applies a 10x gain with saturating
    /// clip after the base shift conversion.
    pub gain_enabled: bool,
    /// Off by default (§9: "dormant... the current duplex flow does not
    /// use [it]"). When enabled, `stop()` emits one final empty chunk as
    /// an end-of-stream marker.
    pub emit_end_marker: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            gain_enabled: false,
            emit_end_marker: false,
        }
    }
}

/// Convert one 32-bit I²S sample to 16-bit PCM: `(int16_t)(s32 >> 14)`,
/// using Rust's arithmetic (sign-extending) shift on signed integers. The
/// optional gain path saturates instead of wrapping.
pub fn convert_sample(s32: i32, config: CaptureConfig) -> i16 {
    let shifted = s32 >> 14;
    if config.gain_enabled {
        let amplified = shifted as i64 * 10;
        amplified.clamp(i16::MIN as i64, i16::MAX as i64) as i16
    } else {
        shifted as i16
    }
}

pub struct CaptureStage {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureStage {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the capture worker. A no-op (with a warning) if already
    /// running.
    pub fn start(
        &mut self,
        mut input: Box<dyn I2sInput>,
        mut sink: CaptureSink,
        config: CaptureConfig,
    ) -> CoreResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            log::warn!("capture: start() called while already running, ignoring");
            self.running.store(true, Ordering::Release);
            return Ok(());
        }

        let running = Arc::clone(&self.running);
        let handle = thread::spawn(move || {
            let mut accumulator: Vec<i16> = Vec::with_capacity(CHUNK_SAMPLES);
            let mut frame = [0i32; I2S_READ_FRAME_SAMPLES];

            while running.load(Ordering::Acquire) {
                match input.read_frame(&mut frame) {
                    Ok(0) => {
                        // No data this cycle (silence or backed-off driver).
                        thread::sleep(Duration::from_millis(1));
                        continue;
                    }
                    Ok(n) => {
                        for &s32 in &frame[..n] {
                            accumulator.push(convert_sample(s32, config));
                            if accumulator.len() == CHUNK_SAMPLES {
                                let bytes = samples_to_le_bytes(&accumulator);
                                sink(&bytes);
                                accumulator.clear();
                            }
                        }
                    }
                    Err(e) => {
                        // Logged and skipped; a persistent failure simply
                        // yields zero throughput, it is not retried here.
                        log::warn!("capture: i2s read error: {e}");
                        thread::sleep(Duration::from_millis(5));
                    }
                }
            }

            if config.emit_end_marker {
                sink(&[]);
            }
        });

        self.handle = Some(handle);
        Ok(())
    }

    /// Signal the worker to exit and join it. The spec allows ~50ms for
    /// the worker to observe the flag; joining blocks until it actually
    /// does (bounded by the driver's own read deadline).
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Default for CaptureStage {
    fn default() -> Self {
        Self::new()
    }
}

fn samples_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

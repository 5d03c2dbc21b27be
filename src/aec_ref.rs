// C3 — AEC Reference Buffer: a bounded, time-windowed buffer of downsampled
// playback samples (24 kHz → 16 kHz) that the echo canceller consumes as
// its "known echo" input. Producer is the playback tap in `playback.rs`;
// consumer is `aec.rs`. Built on top of the C1 ring so overflow behavior
// (non-blocking drop) and underrun behavior (zero-fill) are explicit.

use crate::error::{CoreError, CoreResult};
use crate::resampler::resample_linear;
use crate::ring::{PcmRing, PushMode};
use std::time::Duration;

/// Per-call cap on the reference samples `feed` will resample in one go.
/// Callers streaming larger chunks must split them before calling `feed`.
pub const MAX_FEED_SAMPLES: usize = 4_096;

pub struct AecReferenceBuffer {
    ring: PcmRing,
}

impl AecReferenceBuffer {
    /// `window_ms` of 16 kHz mono audio sizes the backing ring (§3: ~500ms
    /// ⇒ 16,000 bytes).
    pub fn new(window_ms: u32) -> Self {
        let capacity_bytes = (16_000u64 * window_ms as u64 * 2 / 1000) as usize;
        Self {
            ring: PcmRing::with_capacity(capacity_bytes),
        }
    }

    /// Resample `pcm24k` (≤ `MAX_FEED_SAMPLES` samples) to 16 kHz and
    /// non-blocking push the result. Overflow is dropped and logged at
    /// debug, never propagated — a stalled AEC consumer must not affect
    /// the playback worker feeding this buffer.
    pub fn feed(&self, pcm24k: &[i16]) -> CoreResult<()> {
        if pcm24k.len() > MAX_FEED_SAMPLES {
            return Err(CoreError::InvalidArgument(format!(
                "feed() accepts at most {} samples per call, got {}",
                MAX_FEED_SAMPLES,
                pcm24k.len()
            )));
        }
        if pcm24k.is_empty() {
            return Ok(());
        }

        let resampled = resample_linear(pcm24k, 24_000, 16_000);
        let bytes = samples_to_le_bytes(&resampled);
        let pushed = self.ring.push(&bytes, PushMode::Drop, Duration::ZERO)?;
        if pushed < bytes.len() {
            log::debug!(
                "aec reference buffer overflow: dropped {} of {} bytes",
                bytes.len() - pushed,
                bytes.len()
            );
        }
        Ok(())
    }

    /// Non-blocking pop of exactly `n` samples. Returns `(samples, true)`
    /// if `n` full samples were available; otherwise the shortfall is
    /// zero-filled and the returned flag is `false` ("no reference").
    pub fn get(&self, n: usize) -> (Vec<i16>, bool) {
        let want_bytes = n * 2;
        let popped = self
            .ring
            .pop_up_to(want_bytes, Duration::ZERO)
            .unwrap_or_default();
        let have_full = popped.len() == want_bytes;

        let mut samples = le_bytes_to_samples(&popped);
        samples.resize(n, 0);
        (samples, have_full)
    }
}

fn samples_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

fn le_bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

// C9 — AEC Processor (optional): interleaves mic+reference samples and runs
// them through a pluggable echo-cancellation engine, emitting cleaned mic
// audio via an internal queue to an output task. The queue decouples AEC
// computation (near-real-time, same core as capture) from the sink, which
// may do blocking network I/O (§4.9, §5). Grounded in the adaptive-filter
// wrapper shape of the retrieval pack's own AEC processors (interleaved
// frame-at-a-time `process`, bounded reference buffering) generalized to
// the spec's two-task feed/fetch-vs-output split and drop-on-full queue.

use crate::error::{CoreError, CoreResult};
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Output-queue depth (§4.9: "capacity: 10 chunks").
const OUTPUT_QUEUE_CAPACITY: usize = 10;

/// An echo-cancellation engine the AEC stage drives frame-by-frame. The
/// library determines its own preferred chunk size (§4.9: "typically
/// 128-512"); this crate does not implement an AEC algorithm itself, only
/// the buffering/interleaving/threading around one.
pub trait AecEngine: Send {
    /// Samples per channel the engine expects per `process` call.
    fn chunk_size(&self) -> usize;

    /// Run one chunk of interleaved `[mic0, ref0, mic1, ref1, ...]` samples
    /// (length `2 * chunk_size()`) through the engine, returning
    /// `chunk_size()` cleaned mic samples.
    fn process(&mut self, interleaved: &[i16]) -> Vec<i16>;
}

/// A passthrough engine used when no real AEC library is wired up: it
/// returns the mic channel unchanged. Lets the processor's threading and
/// queueing be exercised without a native dependency.
pub struct PassthroughEngine {
    chunk_size: usize,
}

impl PassthroughEngine {
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }
}

impl AecEngine for PassthroughEngine {
    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn process(&mut self, interleaved: &[i16]) -> Vec<i16> {
        interleaved.iter().step_by(2).copied().collect()
    }
}

pub type AecSink = Box<dyn FnMut(&[i16]) + Send>;

/// Owns the feed/fetch side: interleaves mic+ref, drives the engine, and
/// pushes cleaned output into a bounded queue for the separate output task
/// to drain (§4.9, §5's core/priority split between the two).
pub struct AecProcessor {
    chunk_size: usize,
    engine: Box<dyn AecEngine>,
    queue_tx: SyncSender<Vec<i16>>,
    output_handle: Option<JoinHandle<()>>,
    dropped: Arc<Mutex<u64>>,
}

impl AecProcessor {
    /// `sink` runs on the dedicated output task, decoupled from `process`'s
    /// caller (typically the capture thread).
    pub fn new(engine: Box<dyn AecEngine>, mut sink: AecSink) -> Self {
        let chunk_size = engine.chunk_size();
        let (queue_tx, queue_rx): (SyncSender<Vec<i16>>, Receiver<Vec<i16>>) =
            mpsc::sync_channel(OUTPUT_QUEUE_CAPACITY);

        let output_handle = thread::spawn(move || {
            while let Ok(chunk) = queue_rx.recv() {
                sink(&chunk);
            }
        });

        Self {
            chunk_size,
            engine,
            queue_tx,
            output_handle: Some(output_handle),
            dropped: Arc::new(Mutex::new(0)),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn dropped_count(&self) -> u64 {
        *self.dropped.lock().unwrap()
    }

    /// Run one chunk (`mic.len() == reference.len() == chunk_size()`)
    /// through the engine and enqueue the cleaned mic audio for the output
    /// task. If the output queue is full, the chunk is dropped with a
    /// warning rather than blocking the feed/fetch caller (§4.9).
    pub fn process(&mut self, mic: &[i16], reference: &[i16]) -> CoreResult<()> {
        if mic.len() != self.chunk_size || reference.len() != self.chunk_size {
            return Err(CoreError::InvalidArgument(format!(
                "aec process() requires exactly {} samples per channel, got mic={} ref={}",
                self.chunk_size,
                mic.len(),
                reference.len()
            )));
        }

        let mut interleaved = Vec::with_capacity(self.chunk_size * 2);
        for i in 0..self.chunk_size {
            interleaved.push(mic[i]);
            interleaved.push(reference[i]);
        }

        let cleaned = self.engine.process(&interleaved);

        if self.queue_tx.try_send(cleaned).is_err() {
            *self.dropped.lock().unwrap() += 1;
            log::warn!("aec: output queue full, dropping cleaned chunk");
        }
        Ok(())
    }
}

impl Drop for AecProcessor {
    fn drop(&mut self) {
        // Dropping queue_tx closes the channel; the output task's recv()
        // then returns Err and the loop exits.
        if let Some(handle) = self.output_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Bounded interleave buffer accumulating mic/reference samples until a
/// full chunk is available, for callers that don't naturally produce
/// exactly `chunk_size()` samples per call (e.g. the 1,600-sample capture
/// chunk against a smaller AEC frame size).
pub struct AecFeedBuffer {
    mic: VecDeque<i16>,
    reference: VecDeque<i16>,
}

impl AecFeedBuffer {
    pub fn new() -> Self {
        Self {
            mic: VecDeque::new(),
            reference: VecDeque::new(),
        }
    }

    pub fn push(&mut self, mic: &[i16], reference: &[i16]) {
        self.mic.extend(mic.iter().copied());
        self.reference.extend(reference.iter().copied());
    }

    /// Drain as many full `chunk_size`-sized (mic, reference) pairs as are
    /// buffered, in order.
    pub fn drain_chunks(&mut self, chunk_size: usize) -> Vec<(Vec<i16>, Vec<i16>)> {
        let mut out = Vec::new();
        while self.mic.len() >= chunk_size && self.reference.len() >= chunk_size {
            let mic_chunk: Vec<i16> = self.mic.drain(..chunk_size).collect();
            let ref_chunk: Vec<i16> = self.reference.drain(..chunk_size).collect();
            out.push((mic_chunk, ref_chunk));
        }
        out
    }
}

impl Default for AecFeedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc as StdArc, Mutex as StdMutex};
    use std::time::Duration as StdDuration;

    #[test]
    fn passthrough_engine_returns_mic_channel_only() {
        let mut engine = PassthroughEngine::new(4);
        let interleaved = vec![10, 100, 20, 200, 30, 300, 40, 400];
        assert_eq!(engine.process(&interleaved), vec![10, 20, 30, 40]);
    }

    #[test]
    fn process_rejects_mismatched_chunk_size() {
        let engine = PassthroughEngine::new(4);
        let mut proc = AecProcessor::new(Box::new(engine), Box::new(|_| {}));
        let err = proc.process(&[1, 2, 3], &[1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn cleaned_output_reaches_the_sink_via_the_queue() {
        let received: StdArc<StdMutex<Vec<Vec<i16>>>> = StdArc::new(StdMutex::new(Vec::new()));
        let received_clone = StdArc::clone(&received);
        let engine = PassthroughEngine::new(2);
        let mut proc = AecProcessor::new(
            Box::new(engine),
            Box::new(move |chunk: &[i16]| received_clone.lock().unwrap().push(chunk.to_vec())),
        );

        proc.process(&[11, 22], &[0, 0]).unwrap();
        thread::sleep(StdDuration::from_millis(30));

        let got = received.lock().unwrap();
        assert_eq!(*got, vec![vec![11, 22]]);
    }

    #[test]
    fn full_output_queue_drops_with_a_counted_warning() {
        // A sink that blocks forever lets the queue fill up.
        let gate: StdArc<StdMutex<bool>> = StdArc::new(StdMutex::new(false));
        let gate_clone = StdArc::clone(&gate);
        let engine = PassthroughEngine::new(1);
        let mut proc = AecProcessor::new(
            Box::new(engine),
            Box::new(move |_chunk: &[i16]| {
                while !*gate_clone.lock().unwrap() {
                    thread::sleep(StdDuration::from_millis(5));
                }
            }),
        );

        for _ in 0..(OUTPUT_QUEUE_CAPACITY + 5) {
            proc.process(&[1], &[0]).unwrap();
        }
        assert!(proc.dropped_count() > 0);

        *gate.lock().unwrap() = true;
    }

    #[test]
    fn feed_buffer_accumulates_until_a_full_chunk_is_available() {
        let mut buf = AecFeedBuffer::new();
        buf.push(&[1, 2], &[10, 20]);
        assert!(buf.drain_chunks(4).is_empty());

        buf.push(&[3, 4], &[30, 40]);
        let chunks = buf.drain_chunks(4);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].0, vec![1, 2, 3, 4]);
        assert_eq!(chunks[0].1, vec![10, 20, 30, 40]);
    }

    #[test]
    fn feed_buffer_drains_multiple_chunks_in_order() {
        let mut buf = AecFeedBuffer::new();
        buf.push(&(0..8).collect::<Vec<i16>>(), &(100..108).collect::<Vec<i16>>());
        let chunks = buf.drain_chunks(4);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].0, vec![0, 1, 2, 3]);
        assert_eq!(chunks[1].0, vec![4, 5, 6, 7]);
    }
}

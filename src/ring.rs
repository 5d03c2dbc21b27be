// C1 — PCM Ring: a capacity-bounded byte ring shared between a producer and
// a consumer thread. Capture uses `Drop` semantics (never block the audio
// thread); playback uses `Block` semantics (the network is the only thing
// that should ever apply backpressure). Both share one implementation
// guarded by a `Mutex` + `Condvar`, the same shape as the teacher's
// `Arc<Mutex<SharedAudioState>>` in `audio.rs`, generalized to bytes with
// deadline-bounded waits instead of an unconditional lock.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    /// Drop the whole payload (and return 0) if it doesn't fit right now.
    Drop,
    /// Wait up to the deadline for enough free space to appear.
    Block,
}

struct Inner {
    buf: VecDeque<u8>,
    capacity: usize,
    initialized: bool,
}

pub struct PcmRing {
    inner: Mutex<Inner>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl PcmRing {
    /// An uninitialized ring holds no bytes and rejects pushes with
    /// `NotReady` until `allocate` is called.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::new(),
                capacity: 0,
                initialized: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    pub fn with_capacity(capacity_bytes: usize) -> Self {
        let ring = Self::new();
        ring.allocate(capacity_bytes);
        ring
    }

    /// (Re)allocate the ring to the given byte capacity, discarding any
    /// buffered content.
    pub fn allocate(&self, capacity_bytes: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.buf = VecDeque::with_capacity(capacity_bytes);
        inner.capacity = capacity_bytes;
        inner.initialized = true;
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn free(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.capacity.saturating_sub(inner.buf.len())
    }

    /// Drop all buffered bytes without affecting capacity.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.buf.clear();
        self.not_full.notify_all();
    }

    /// Push `bytes` into the ring. `bytes.len()` must be a multiple of 2
    /// (sample-aligned). Returns the number of bytes actually enqueued:
    /// in `Drop` mode, 0 if the payload doesn't fit; in `Block` mode, 0 if
    /// the deadline elapses first.
    pub fn push(&self, bytes: &[u8], mode: PushMode, deadline: Duration) -> CoreResult<usize> {
        if bytes.len() % 2 != 0 {
            return Err(CoreError::InvalidArgument(
                "push length must be a multiple of 2 (sample-aligned)".into(),
            ));
        }
        if bytes.is_empty() {
            return Ok(0);
        }

        let mut inner = self.inner.lock().unwrap();
        if !inner.initialized {
            return Err(CoreError::NotReady);
        }
        if bytes.len() > inner.capacity {
            return Err(CoreError::InvalidArgument(
                "payload larger than ring capacity".into(),
            ));
        }

        match mode {
            PushMode::Drop => {
                let free = inner.capacity - inner.buf.len();
                if bytes.len() > free {
                    log::debug!(
                        "ring: drop-on-full, wanted {} bytes, {} free",
                        bytes.len(),
                        free
                    );
                    return Ok(0);
                }
            }
            PushMode::Block => {
                let deadline_at = Instant::now() + deadline;
                loop {
                    let free = inner.capacity - inner.buf.len();
                    if bytes.len() <= free {
                        break;
                    }
                    let now = Instant::now();
                    if now >= deadline_at {
                        return Ok(0);
                    }
                    let (guard, timeout_result) = self
                        .not_full
                        .wait_timeout(inner, deadline_at - now)
                        .unwrap();
                    inner = guard;
                    if timeout_result.timed_out() {
                        let free = inner.capacity - inner.buf.len();
                        if bytes.len() > free {
                            return Ok(0);
                        }
                    }
                }
            }
        }

        inner.buf.extend(bytes.iter().copied());
        drop(inner);
        self.not_empty.notify_all();
        Ok(bytes.len())
    }

    /// Pop up to `max_bytes` bytes, waiting for at least one byte to become
    /// available (or the deadline to elapse). Never returns more than
    /// `max_bytes`; returns fewer if that's all that's buffered.
    pub fn pop_up_to(&self, max_bytes: usize, deadline: Duration) -> CoreResult<Vec<u8>> {
        if max_bytes == 0 {
            return Ok(Vec::new());
        }

        let mut inner = self.inner.lock().unwrap();
        if !inner.initialized {
            return Err(CoreError::NotReady);
        }

        if inner.buf.is_empty() {
            let deadline_at = Instant::now() + deadline;
            loop {
                if !inner.buf.is_empty() {
                    break;
                }
                let now = Instant::now();
                if now >= deadline_at {
                    return Ok(Vec::new());
                }
                let (guard, timeout_result) = self
                    .not_empty
                    .wait_timeout(inner, deadline_at - now)
                    .unwrap();
                inner = guard;
                if timeout_result.timed_out() && inner.buf.is_empty() {
                    return Ok(Vec::new());
                }
            }
        }

        let take = max_bytes.min(inner.buf.len());
        let out: Vec<u8> = inner.buf.drain(..take).collect();
        drop(inner);
        self.not_full.notify_all();
        Ok(out)
    }
}

impl Default for PcmRing {
    fn default() -> Self {
        Self::new()
    }
}

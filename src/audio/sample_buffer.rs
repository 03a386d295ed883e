//! Bounded FIFO of samples shared between the bus callback and the playback thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

const LOG_TARGET: &str = "pulse_rx::audio::sample_buffer";

/// Storage reserved up front; larger buffers grow on demand.
const MAX_PREALLOCATED: usize = 1 << 16;

/// Minimum spacing between overflow warnings. Overflows in between are
/// logged at debug and still counted.
const OVERFLOW_WARN_INTERVAL: Duration = Duration::from_secs(10);

/// `last_overflow_warn_ms` value before the first warning.
const NEVER_WARNED: u64 = u64::MAX;

/// Snapshot of the buffer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub pushed: u64,
    pub pulled: u64,
    pub dropped_overflow: u64,
    pub underruns: u64,
    pub len: usize,
    pub capacity: usize,
}

/// Thread-safe sample queue with a drop-oldest overflow policy.
///
/// `push` never blocks on the consumer and `pull` never waits for the
/// producer; both only hold the lock for the copy itself.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Mutex<VecDeque<f32>>,
    capacity: usize,
    pushed: AtomicU64,
    pulled: AtomicU64,
    dropped_overflow: AtomicU64,
    underruns: AtomicU64,
    created: Instant,
    last_overflow_warn_ms: AtomicU64,
}

impl SampleBuffer {
    /// Creates an empty buffer holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SampleBuffer {
            samples: Mutex::new(VecDeque::with_capacity(capacity.min(MAX_PREALLOCATED))),
            capacity,
            pushed: AtomicU64::new(0),
            pulled: AtomicU64::new(0),
            dropped_overflow: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            created: Instant::now(),
            last_overflow_warn_ms: AtomicU64::new(NEVER_WARNED),
        }
    }

    // A panic on the other side must not take playback down with it.
    fn lock(&self) -> MutexGuard<'_, VecDeque<f32>> {
        self.samples.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends `frame` to the tail, evicting the oldest samples beyond capacity.
    /// Returns the number of samples dropped by this push.
    pub fn push(&self, frame: &[f32]) -> usize {
        if frame.is_empty() {
            return 0;
        }

        // Only the newest `capacity` samples of an oversized frame can survive.
        let incoming = if frame.len() > self.capacity {
            &frame[frame.len() - self.capacity..]
        } else {
            frame
        };
        let mut dropped = frame.len() - incoming.len();

        let len_after = {
            let mut queue = self.lock();
            let overflow = (queue.len() + incoming.len()).saturating_sub(self.capacity);
            if overflow > 0 {
                queue.drain(..overflow);
                dropped += overflow;
            }
            queue.extend(incoming.iter().copied());
            queue.len()
        };

        self.pushed.fetch_add(frame.len() as u64, Ordering::Relaxed);
        if dropped > 0 {
            let total = self.dropped_overflow.fetch_add(dropped as u64, Ordering::Relaxed) + dropped as u64;
            if self.overflow_warning_due() {
                warn!(target: LOG_TARGET, dropped, total_dropped = total, "Sample buffer overflow, dropped oldest samples");
            } else {
                debug!(target: LOG_TARGET, dropped, total_dropped = total, "Sample buffer overflow");
            }
        }
        trace!(target: LOG_TARGET, pushed = frame.len(), len = len_after, "push");
        dropped
    }

    /// True at most once per [`OVERFLOW_WARN_INTERVAL`].
    fn overflow_warning_due(&self) -> bool {
        let now_ms = self.created.elapsed().as_millis() as u64;
        let last = self.last_overflow_warn_ms.load(Ordering::Relaxed);
        let due = last == NEVER_WARNED
            || now_ms.saturating_sub(last) >= OVERFLOW_WARN_INTERVAL.as_millis() as u64;
        due && self
            .last_overflow_warn_ms
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Removes and returns up to `count` samples from the head, in order.
    /// A short result signals underrun.
    pub fn pull(&self, count: usize) -> Vec<f32> {
        let mut out = vec![0.0; count];
        let n = self.pull_into(&mut out);
        out.truncate(n);
        out
    }

    /// Moves up to `out.len()` head samples into the front of `out` without
    /// allocating. Returns how many were written; the rest of `out` is untouched.
    pub fn pull_into(&self, out: &mut [f32]) -> usize {
        let n = {
            let mut queue = self.lock();
            let n = queue.len().min(out.len());
            for (slot, sample) in out.iter_mut().zip(queue.drain(..n)) {
                *slot = sample;
            }
            n
        };

        self.pulled.fetch_add(n as u64, Ordering::Relaxed);
        if n < out.len() {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
        n
    }

    /// Discards everything currently queued.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            pushed: self.pushed.load(Ordering::Relaxed),
            pulled: self.pulled.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            len: self.len(),
            capacity: self.capacity,
        }
    }
}

//! Subscription bridge: turns delivered supplies into buffered samples and
//! keeps the playback session alive.

use crate::audio::{frame_decoder, AudioError, BufferStats, PlaybackSink, SampleBuffer, SessionState};
use crate::bus::{AudioRecord, Envelope, SupplyHandler};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

const LOG_TARGET: &str = "pulse_rx::bridge";

/// Upper bound on how long an eager open holds up startup.
pub const EAGER_OPEN_WAIT: Duration = Duration::from_secs(2);

/// Shared resources the bridge works on. One per process.
#[derive(Clone)]
pub struct BridgeContext {
    pub buffer: Arc<SampleBuffer>,
    pub sink: Arc<PlaybackSink>,
}

/// Counters kept by the bridge callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Messages delivered by the bus.
    pub messages: u64,
    /// Messages dropped for a missing payload or an undecodable record.
    pub malformed: u64,
    /// Frames pushed into the sample buffer.
    pub frames: u64,
}

pub struct SubscriptionBridge {
    context: BridgeContext,
    accepting: AtomicBool,
    messages: AtomicU64,
    malformed: AtomicU64,
    frames: AtomicU64,
}

impl SubscriptionBridge {
    pub fn new(context: BridgeContext) -> Self {
        SubscriptionBridge {
            context,
            accepting: AtomicBool::new(true),
            messages: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            frames: AtomicU64::new(0),
        }
    }

    pub fn context(&self) -> &BridgeContext {
        &self.context
    }

    /// Opens the playback session before the first frame arrives, waiting at
    /// most [`EAGER_OPEN_WAIT`] for the device.
    /// Failure is not fatal: messages keep being buffered.
    pub fn open_eagerly(&self) -> Result<(), AudioError> {
        info!(target: LOG_TARGET, "Opening playback session at startup.");
        self.context.sink.ensure_open()?;
        match self.context.sink.wait_opened(EAGER_OPEN_WAIT) {
            SessionState::Failed => Err(AudioError::InitializationError(
                "output device failed to open".to_string(),
            )),
            SessionState::Opening => {
                warn!(target: LOG_TARGET, "Output device still opening after {:?}, continuing.", EAGER_OPEN_WAIT);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Stops enqueueing new frames. Messages still arrive and are counted.
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stops enqueueing, lets the sink play out what is buffered, closes it.
    #[instrument(skip(self))]
    pub fn shutdown(&self, drain_timeout: Duration) {
        self.stop_accepting();
        self.context.sink.shutdown(drain_timeout);
        let stats = self.stats();
        let buffer = self.buffer_stats();
        info!(
            target: LOG_TARGET,
            messages = stats.messages,
            malformed = stats.malformed,
            frames = stats.frames,
            dropped_overflow = buffer.dropped_overflow,
            underruns = buffer.underruns,
            "Bridge shut down."
        );
    }

    pub fn session_state(&self) -> SessionState {
        self.context.sink.state()
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            messages: self.messages.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
        }
    }

    pub fn buffer_stats(&self) -> BufferStats {
        self.context.buffer.stats()
    }

    fn drop_malformed(&self, reason: &str) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        trace!(target: LOG_TARGET, reason, "Dropping malformed message");
    }
}

impl SupplyHandler for SubscriptionBridge {
    fn on_message(&self, envelope: &Envelope) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        if !self.is_accepting() {
            return;
        }

        let payload = match envelope.payload.as_deref() {
            Some(payload) => payload,
            None => return self.drop_malformed("no payload"),
        };
        let record = match AudioRecord::decode(payload) {
            Ok(record) => record,
            Err(_) => return self.drop_malformed("record decode failed"),
        };

        let frame = frame_decoder::decode(&record.samples);
        self.frames.fetch_add(1, Ordering::Relaxed);
        debug!(target: LOG_TARGET, supply = %envelope.supply_name, samples = frame.len(), "Frame received");
        self.context.buffer.push(&frame);

        // Only spawns the playback thread; the device opens there.
        // Open errors are logged by the sink; later frames still get buffered.
        let _ = self.context.sink.ensure_open();
    }
}

//! Playback sink adapter: owns the single output session and feeds the device
//! from the sample buffer at the device's own cadence.

use crate::audio::error::AudioError;
use crate::audio::output::{OutputDevice, StreamConfig};
use crate::audio::sample_buffer::SampleBuffer;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, trace, warn};

const LOG_TARGET: &str = "pulse_rx::audio::sink";

/// How often waiting callers re-check the playback thread.
const STATE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long `shutdown` waits for the thread after asking it to stop.
pub const STOP_GRACE: Duration = Duration::from_secs(1);

/// The real-time pull handler. Always fills the whole request.
#[derive(Debug, Clone)]
pub struct PullHandler {
    buffer: Arc<SampleBuffer>,
    verbose: bool,
}

impl PullHandler {
    pub fn new(buffer: Arc<SampleBuffer>, verbose: bool) -> Self {
        PullHandler { buffer, verbose }
    }

    /// Copies up to `out.len()` buffered samples into the front of `out` and
    /// zero-fills the remainder. Returns the number of real samples written.
    pub fn fill(&self, out: &mut [f32]) -> usize {
        let available = self.buffer.pull_into(out);
        out[available..].fill(0.0);
        if self.verbose {
            debug!(target: LOG_TARGET, requested = out.len(), available, "pull");
        } else if available < out.len() {
            trace!(target: LOG_TARGET, requested = out.len(), available, "underrun, padded with silence");
        }
        available
    }
}

/// Observable state of the adapter's playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// No session opened yet.
    Idle = 0,
    /// The playback thread is opening the device.
    Opening = 1,
    Running = 2,
    /// The device failed to open or died; no further attempts are made.
    Failed = 3,
    /// Shut down on request.
    Closed = 4,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Opening,
            2 => SessionState::Running,
            3 => SessionState::Failed,
            _ => SessionState::Closed,
        }
    }
}

/// Session state shared between the sink and its playback thread.
#[derive(Debug)]
struct SharedState(AtomicU8);

impl SharedState {
    fn new(state: SessionState) -> Self {
        SharedState(AtomicU8::new(state as u8))
    }

    fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn store(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Moves `from` to `to`; a no-op if another transition got there first.
    fn advance(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// One playback thread and the flags that steer it.
struct PlaybackSession {
    handle: JoinHandle<Result<(), AudioError>>,
    stop: Arc<AtomicBool>,
    drain: Arc<AtomicBool>,
}

enum SessionSlot {
    Pending(Box<dyn OutputDevice>),
    Started(PlaybackSession),
    Done,
}

/// Owns the output device and, once started, the one playback session.
///
/// Starting a session never waits for the device: the open happens on the
/// playback thread and its outcome shows up in [`PlaybackSink::state`].
/// The session has no drain-on-exit unless [`PlaybackSink::shutdown`] is
/// called; dropping the sink stops the thread immediately.
pub struct PlaybackSink {
    handler: PullHandler,
    config: StreamConfig,
    state: Arc<SharedState>,
    slot: Mutex<SessionSlot>,
}

impl PlaybackSink {
    pub fn new(
        device: Box<dyn OutputDevice>,
        buffer: Arc<SampleBuffer>,
        config: StreamConfig,
        verbose: bool,
    ) -> Self {
        PlaybackSink {
            handler: PullHandler::new(buffer, verbose),
            config,
            state: Arc::new(SharedState::new(SessionState::Idle)),
            slot: Mutex::new(SessionSlot::Pending(device)),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> StreamConfig {
        self.config
    }

    pub fn pull_handler(&self) -> &PullHandler {
        &self.handler
    }

    pub fn state(&self) -> SessionState {
        self.state.load()
    }

    /// Starts the playback session if none was started yet.
    ///
    /// Returns as soon as the playback thread is spawned. Only the first call
    /// does any work; an error means the thread itself could not be created,
    /// and leaves the sink in [`SessionState::Failed`].
    #[instrument(skip(self), fields(rate = self.config.rate, fragment = self.config.fragment))]
    pub fn ensure_open(&self) -> Result<(), AudioError> {
        let mut slot = self.lock_slot();
        let device = match std::mem::replace(&mut *slot, SessionSlot::Done) {
            SessionSlot::Pending(device) => device,
            other => {
                *slot = other;
                return Ok(());
            }
        };

        self.state.store(SessionState::Opening);
        match start_session(device, self.handler.clone(), self.config, Arc::clone(&self.state)) {
            Ok(session) => {
                *slot = SessionSlot::Started(session);
                Ok(())
            }
            Err(e) => {
                self.state.store(SessionState::Failed);
                error!(target: LOG_TARGET, "Failed to start playback thread: {}", e);
                Err(e)
            }
        }
    }

    /// Waits at most `timeout` for a pending device open to finish and
    /// returns the resulting state.
    pub fn wait_opened(&self, timeout: Duration) -> SessionState {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.state();
            if state != SessionState::Opening || Instant::now() >= deadline {
                return state;
            }
            thread::sleep(STATE_POLL_INTERVAL);
        }
    }

    /// Lets the session play out what is buffered for at most `timeout`,
    /// then stops the playback thread and closes the device.
    ///
    /// A thread stuck inside the device past [`STOP_GRACE`] is detached
    /// rather than joined.
    #[instrument(skip(self))]
    pub fn shutdown(&self, timeout: Duration) {
        let previous = std::mem::replace(&mut *self.lock_slot(), SessionSlot::Done);
        let session = match previous {
            SessionSlot::Started(session) => session,
            _ => {
                self.state.store(SessionState::Closed);
                debug!(target: LOG_TARGET, "No running playback session to shut down.");
                return;
            }
        };

        session.drain.store(true, Ordering::SeqCst);
        if !wait_finished(&session.handle, timeout) {
            warn!(target: LOG_TARGET, "Playback did not drain within {:?}, stopping.", timeout);
        }
        session.stop.store(true, Ordering::SeqCst);

        let finished = wait_finished(&session.handle, STOP_GRACE);
        self.state.store(SessionState::Closed);
        if !finished {
            error!(target: LOG_TARGET, "Playback thread did not stop within {:?}, detaching it.", STOP_GRACE);
            return;
        }

        match session.handle.join() {
            Ok(Ok(())) => info!(target: LOG_TARGET, "Playback session closed."),
            Ok(Err(e)) => warn!(target: LOG_TARGET, "Playback session ended with error: {}", e),
            Err(_) => error!(target: LOG_TARGET, "Playback thread panicked."),
        }
    }
}

impl Drop for PlaybackSink {
    fn drop(&mut self) {
        if let SessionSlot::Started(session) = &*self.lock_slot() {
            session.stop.store(true, Ordering::SeqCst);
        }
    }
}

fn wait_finished(handle: &JoinHandle<Result<(), AudioError>>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(STATE_POLL_INTERVAL);
    }
    handle.is_finished()
}

/// Spawns the playback thread. The device is opened on that thread.
fn start_session(
    device: Box<dyn OutputDevice>,
    handler: PullHandler,
    config: StreamConfig,
    state: Arc<SharedState>,
) -> Result<PlaybackSession, AudioError> {
    let stop = Arc::new(AtomicBool::new(false));
    let drain = Arc::new(AtomicBool::new(false));

    let handle = {
        let stop = Arc::clone(&stop);
        let drain = Arc::clone(&drain);
        thread::Builder::new()
            .name("pulse-rx-playback".to_string())
            .spawn(move || playback_loop(device, handler, config, state, stop, drain))?
    };

    Ok(PlaybackSession { handle, stop, drain })
}

/// Body of the playback thread. Each iteration is one device pull.
fn playback_loop(
    mut device: Box<dyn OutputDevice>,
    handler: PullHandler,
    config: StreamConfig,
    state: Arc<SharedState>,
    stop: Arc<AtomicBool>,
    drain: Arc<AtomicBool>,
) -> Result<(), AudioError> {
    if let Err(e) = device.open(&config) {
        error!(target: LOG_TARGET, device = device.name(), "Failed to open playback session: {}", e);
        state.advance(SessionState::Opening, SessionState::Failed);
        return Ok(());
    }
    if !state.advance(SessionState::Opening, SessionState::Running) {
        // Shut down while the device was opening.
        device.close();
        return Ok(());
    }
    info!(target: LOG_TARGET, device = device.name(), rate = config.rate, fragment = config.fragment, "Playback session started.");

    let mut fragment = vec![0.0f32; config.fragment.max(1)];
    let result = loop {
        if stop.load(Ordering::SeqCst) {
            break Ok(());
        }
        if drain.load(Ordering::SeqCst) && handler.buffer.is_empty() {
            if let Err(e) = device.drain() {
                warn!(target: LOG_TARGET, "Device drain failed: {}", e);
            }
            break Ok(());
        }

        handler.fill(&mut fragment);
        if let Err(e) = device.write(&fragment) {
            error!(target: LOG_TARGET, "Output device write failed, ending session: {}", e);
            state.advance(SessionState::Running, SessionState::Failed);
            break Err(e);
        }
    };

    device.close();
    result
}

//! Output device abstraction used by the playback thread.

use crate::audio::error::AudioError;
use std::time::Duration;
use tracing::{debug, info};

const LOG_TARGET: &str = "pulse_rx::audio::output";

/// Name that selects the [`NullOutput`] device.
pub const NULL_DEVICE: &str = "null";

/// Parameters of the single mono float stream the bridge plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Samples per second.
    pub rate: u32,
    /// Samples requested per pull.
    pub fragment: usize,
}

impl StreamConfig {
    /// Real-time deadline of one pull (`fragment / rate`).
    pub fn fragment_duration(&self) -> Duration {
        if self.rate == 0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.fragment as f64 / self.rate as f64).unwrap_or(Duration::MAX)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig { rate: 44_100, fragment: 2048 }
    }
}

/// A device that accepts one fragment at a time and blocks until it has room,
/// which is what paces the pull loop.
pub trait OutputDevice: Send {
    /// Opens the device for `config`. Called once, on the playback thread.
    fn open(&mut self, config: &StreamConfig) -> Result<(), AudioError>;

    /// Plays one full fragment.
    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError>;

    /// Lets queued device audio finish. Best effort.
    fn drain(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    /// Releases the device.
    fn close(&mut self);

    fn name(&self) -> &str;
}

/// Discards samples, sleeping one fragment period per write so the pull
/// cadence matches a real device.
#[derive(Debug, Default)]
pub struct NullOutput {
    period: Option<Duration>,
}

impl NullOutput {
    pub fn new() -> Self {
        NullOutput::default()
    }
}

impl OutputDevice for NullOutput {
    fn open(&mut self, config: &StreamConfig) -> Result<(), AudioError> {
        info!(target: LOG_TARGET, rate = config.rate, fragment = config.fragment, "Opened null output device");
        self.period = Some(config.fragment_duration());
        Ok(())
    }

    fn write(&mut self, _samples: &[f32]) -> Result<(), AudioError> {
        let period = self
            .period
            .ok_or_else(|| AudioError::InvalidState("null device not opened".to_string()))?;
        std::thread::sleep(period);
        Ok(())
    }

    fn close(&mut self) {
        self.period = None;
    }

    fn name(&self) -> &str {
        NULL_DEVICE
    }
}

/// Picks the output implementation for a configured device name.
pub fn device_for_name(device_name: &str) -> Box<dyn OutputDevice> {
    if device_name == NULL_DEVICE {
        debug!(target: LOG_TARGET, "Using null output device");
        return Box::new(NullOutput::new());
    }

    #[cfg(feature = "alsa-output")]
    {
        Box::new(crate::audio::alsa_output::AlsaOutput::new(device_name))
    }

    #[cfg(not(feature = "alsa-output"))]
    {
        tracing::warn!(
            target: LOG_TARGET,
            "Built without ALSA support, device '{}' replaced by null output", device_name
        );
        Box::new(NullOutput::new())
    }
}

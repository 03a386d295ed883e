use crate::audio::error::AudioError;
use crate::audio::output::{OutputDevice, StreamConfig};
use alsa::nix::errno::Errno;
use alsa::pcm::{Access, Format, HwParams, State as PcmState, PCM};
use alsa::{Direction, ValueOr};
use std::ffi::CString;
use tracing::instrument;
use tracing::{debug, error, info, warn};

const LOG_TARGET: &str = "pulse_rx::audio::alsa_output";

/// Device buffer length in fragments. Keeps device latency near the
/// 100 ms playback latency the bus producers assume.
const BUFFER_FRAGMENTS: i64 = 2;

/// Mono FLOAT_LE playback on an ALSA PCM device.
pub struct AlsaOutput {
    device_name: String,
    pcm: Option<PCM>,
    actual_rate: Option<u32>,
}

impl AlsaOutput {
    /// Creates an unopened output for the specified ALSA device.
    pub fn new(device_name: &str) -> Self {
        info!(target: LOG_TARGET, "Creating new AlsaOutput for device: {}", device_name);
        AlsaOutput {
            device_name: device_name.to_string(),
            pcm: None,
            actual_rate: None,
        }
    }

    /// Returns the sample rate negotiated with ALSA, once opened.
    pub fn actual_rate(&self) -> Option<u32> {
        self.actual_rate
    }

    /// Writes as much of `buffer` as ALSA accepts in one call.
    /// Returns Ok(0) when an underrun occurred and was recovered.
    fn write_once(&self, buffer: &[f32]) -> Result<usize, AudioError> {
        let pcm = self
            .pcm
            .as_ref()
            .ok_or(AudioError::InvalidState("PCM not initialized for writing".to_string()))?;
        let io = pcm.io_f32()?;

        match io.writei(buffer) {
            Ok(frames_written) => Ok(frames_written),
            Err(e) if e.errno() == Errno::EPIPE => {
                warn!(target: LOG_TARGET, "ALSA buffer underrun (EPIPE), recovering");
                match pcm.recover(libc::EPIPE, true) {
                    Ok(()) => Ok(0),
                    Err(recover_err) => {
                        error!(target: LOG_TARGET, "ALSA recovery failed: {}", recover_err);
                        Err(AudioError::AlsaError(format!("ALSA recovery failed: {}", recover_err)))
                    }
                }
            }
            Err(e) => {
                error!(target: LOG_TARGET, "ALSA write error: {}", e);
                Err(AudioError::AlsaError(e.to_string()))
            }
        }
    }
}

impl OutputDevice for AlsaOutput {
    #[instrument(skip(self, config), fields(device = %self.device_name, rate = config.rate, fragment = config.fragment))]
    fn open(&mut self, config: &StreamConfig) -> Result<(), AudioError> {
        info!(
            target: LOG_TARGET,
            "Opening ALSA PCM device '{}' (rate={}, fragment={})",
            self.device_name, config.rate, config.fragment
        );

        self.close();

        let device = CString::new(self.device_name.clone())
            .map_err(|e| AudioError::InitializationError(format!("Invalid device name: {}", e)))?;

        let pcm = PCM::open(&device, Direction::Playback, false)?; // Blocking mode paces the pull loop

        {
            let hwp = HwParams::any(&pcm)?;
            hwp.set_access(Access::RWInterleaved)?;
            hwp.set_format(Format::FloatLE)?;
            hwp.set_channels(1)?;

            hwp.set_rate_near(config.rate, ValueOr::Nearest).map_err(|e| {
                AudioError::AlsaError(format!("Failed to set sample rate {}: {}", config.rate, e))
            })?;
            let actual_rate = hwp.get_rate()?;
            if actual_rate != config.rate {
                // No resampling: audio plays at the device rate.
                warn!(
                    target: LOG_TARGET,
                    "ALSA rate negotiation: requested={}, actual={}", config.rate, actual_rate
                );
            }
            self.actual_rate = Some(actual_rate);

            let fragment = config.fragment as i64;
            hwp.set_period_size_near(fragment, ValueOr::Nearest)?;
            hwp.set_buffer_size_near(fragment * BUFFER_FRAGMENTS)?;
            pcm.hw_params(&hwp)?;

            let swp = pcm.sw_params_current()?;
            let buffer_size = hwp.get_buffer_size()?;
            let period_size = hwp.get_period_size()?;
            swp.set_start_threshold(buffer_size - period_size)?;
            pcm.sw_params(&swp)?;
            debug!(
                target: LOG_TARGET,
                "ALSA parameters applied (buffer={}, period={}).", buffer_size, period_size
            );
        }

        self.pcm = Some(pcm);
        info!(target: LOG_TARGET, "ALSA initialized successfully.");
        Ok(())
    }

    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError> {
        let mut offset = 0;
        while offset < samples.len() {
            offset += self.write_once(&samples[offset..])?;
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<(), AudioError> {
        if let Some(pcm) = &self.pcm {
            if pcm.state() == PcmState::Running || pcm.state() == PcmState::Prepared {
                debug!(target: LOG_TARGET, "Draining ALSA buffer.");
                pcm.drain().map_err(|e| {
                    warn!(target: LOG_TARGET, "Error draining ALSA buffer: {}", e);
                    AudioError::from(e)
                })?;
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(pcm) = self.pcm.take() {
            debug!(target: LOG_TARGET, "Closing ALSA PCM device (state: {:?})...", pcm.state());
            if pcm.state() == PcmState::Running || pcm.state() == PcmState::Prepared {
                if let Err(e) = pcm.drop() {
                    warn!(target: LOG_TARGET, "Error dropping ALSA buffer during close (ignored): {}", e);
                }
            }
            debug!(target: LOG_TARGET, "ALSA PCM closed.");
        }
        self.actual_rate = None;
    }

    fn name(&self) -> &str {
        &self.device_name
    }
}

impl Drop for AlsaOutput {
    fn drop(&mut self) {
        self.close();
    }
}

//! Common utilities for pulse-rx tests
//!
//! Output devices that record or refuse audio, a collecting supply handler,
//! and builders for bus messages.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pulse_rx::audio::{frame_decoder, AudioError, OutputDevice, StreamConfig};
use pulse_rx::bus::{AudioRecord, Envelope, SupplyHandler};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fragments written by a [`RecordingDevice`].
pub type Recorded = Arc<Mutex<Vec<Vec<f32>>>>;

/// Output device that keeps every fragment it is given.
pub struct RecordingDevice {
    pub written: Recorded,
    pub period: Duration,
}

impl RecordingDevice {
    pub fn new() -> (Self, Recorded) {
        let written: Recorded = Arc::new(Mutex::new(Vec::new()));
        let device = RecordingDevice { written: Arc::clone(&written), period: Duration::from_millis(1) };
        (device, written)
    }
}

impl OutputDevice for RecordingDevice {
    fn open(&mut self, _config: &StreamConfig) -> Result<(), AudioError> {
        Ok(())
    }

    fn write(&mut self, samples: &[f32]) -> Result<(), AudioError> {
        self.written.lock().unwrap().push(samples.to_vec());
        std::thread::sleep(self.period);
        Ok(())
    }

    fn close(&mut self) {}

    fn name(&self) -> &str {
        "recording"
    }
}

/// Output device that cannot be opened, as when no sound card is present.
pub struct UnavailableDevice;

impl OutputDevice for UnavailableDevice {
    fn open(&mut self, _config: &StreamConfig) -> Result<(), AudioError> {
        Err(AudioError::InitializationError("device unavailable".to_string()))
    }

    fn write(&mut self, _samples: &[f32]) -> Result<(), AudioError> {
        Err(AudioError::InvalidState("never opened".to_string()))
    }

    fn close(&mut self) {}

    fn name(&self) -> &str {
        "unavailable"
    }
}

/// Output device whose open takes a while, like a sound card held by
/// another client. Discards audio once open.
pub struct SlowOpenDevice {
    pub open_delay: Duration,
}

impl SlowOpenDevice {
    pub fn new(open_delay: Duration) -> Self {
        SlowOpenDevice { open_delay }
    }
}

impl OutputDevice for SlowOpenDevice {
    fn open(&mut self, _config: &StreamConfig) -> Result<(), AudioError> {
        std::thread::sleep(self.open_delay);
        Ok(())
    }

    fn write(&mut self, _samples: &[f32]) -> Result<(), AudioError> {
        std::thread::sleep(Duration::from_millis(1));
        Ok(())
    }

    fn close(&mut self) {}

    fn name(&self) -> &str {
        "slow-open"
    }
}

/// Supply handler that stores what it receives.
#[derive(Default)]
pub struct CollectingHandler {
    pub envelopes: Mutex<Vec<Envelope>>,
}

impl CollectingHandler {
    pub fn count(&self) -> usize {
        self.envelopes.lock().unwrap().len()
    }
}

impl SupplyHandler for CollectingHandler {
    fn on_message(&self, envelope: &Envelope) {
        self.envelopes.lock().unwrap().push(envelope.clone());
    }
}

/// Envelope carrying `samples` the way a publisher encodes them.
pub fn audio_envelope(samples: &[f32]) -> Envelope {
    let record = AudioRecord { bucket: None, samples: frame_decoder::encode(samples) };
    Envelope {
        supply_name: "audio".to_string(),
        payload: Some(record.encode().expect("record encodes")),
    }
}

/// Websocket text frame delivering `samples` as a supply.
pub fn supply_text(samples: &[f32]) -> String {
    let envelope = audio_envelope(samples);
    let entity = BASE64.encode(envelope.payload.unwrap_or_default());
    serde_json::json!({
        "MessageType": "Supply",
        "Data": {
            "Id": 1,
            "SupplyName": envelope.supply_name,
            "Cdata": { "Entity": entity }
        }
    })
    .to_string()
}

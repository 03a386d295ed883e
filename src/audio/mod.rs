//! Audio side of the bridge: payload decoding, the shared sample buffer and
//! the playback sink that feeds the output device.

#[cfg(feature = "alsa-output")]
pub mod alsa_output;
pub mod error;
pub mod frame_decoder;
pub mod output;
pub mod sample_buffer;
pub mod sink;

pub use error::AudioError;
pub use frame_decoder::{decode, SampleFrame};
pub use output::{device_for_name, NullOutput, OutputDevice, StreamConfig, NULL_DEVICE};
pub use sample_buffer::{BufferStats, SampleBuffer};
pub use sink::{PlaybackSink, PullHandler, SessionState};

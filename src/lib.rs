//! pulse-rx library core functionality

pub mod audio;
pub mod bridge;
pub mod bus;
pub mod config;
pub mod logging;
pub mod ui;

use audio::{device_for_name, PlaybackSink, SampleBuffer};
use bridge::{BridgeContext, SubscriptionBridge};
use config::Settings;
use std::sync::Arc;

/// Builds the buffer, sink and bridge for `settings` with the configured device.
pub fn build_bridge(settings: &Settings) -> SubscriptionBridge {
    build_bridge_with_device(settings, device_for_name(&settings.alsa_device))
}

/// Same as [`build_bridge`] with an explicit output device.
pub fn build_bridge_with_device(
    settings: &Settings,
    device: Box<dyn audio::OutputDevice>,
) -> SubscriptionBridge {
    let buffer = Arc::new(SampleBuffer::new(settings.buffer_capacity()));
    let sink = Arc::new(PlaybackSink::new(
        device,
        Arc::clone(&buffer),
        settings.stream_config(),
        settings.verbose,
    ));
    SubscriptionBridge::new(BridgeContext { buffer, sink })
}

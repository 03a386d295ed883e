//! Integration tests for the streaming bridge
//!
//! Bus envelopes go in through the bridge callback; samples come out of the
//! pull handler or a recording output device.

use crate::test_utils::{audio_envelope, RecordingDevice, SlowOpenDevice, UnavailableDevice};
use pulse_rx::audio::SessionState;
use pulse_rx::bus::{Envelope, SupplyHandler};
use pulse_rx::config::Settings;
use pulse_rx::build_bridge_with_device;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn settings(rate: u32, fragment: usize, buffer_fragments: usize) -> Settings {
    let mut settings = Settings::default();
    settings.rate = rate;
    settings.fragment = fragment;
    settings.buffer_fragments = buffer_fragments;
    settings
}

#[cfg(test)]
mod bridge_integration_tests {
    use super::*;

    /// Two frames, then two pulls of one fragment each: the second pull is
    /// padded with silence.
    #[test]
    fn test_two_frames_then_two_pulls() {
        let bridge = build_bridge_with_device(&settings(44_100, 4, 4), Box::new(UnavailableDevice));

        bridge.on_message(&audio_envelope(&[0.1, 0.2, 0.3, 0.4]));
        bridge.on_message(&audio_envelope(&[0.5, 0.6]));
        assert_eq!(bridge.context().sink.wait_opened(Duration::from_secs(2)), SessionState::Failed);

        let handler = bridge.context().sink.pull_handler();
        let mut out = [1.0f32; 4];
        assert_eq!(handler.fill(&mut out), 4);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.4]);

        assert_eq!(handler.fill(&mut out), 2);
        assert_eq!(out, [0.5, 0.6, 0.0, 0.0]);
    }

    #[test]
    fn test_malformed_messages_leave_buffer_untouched() {
        let bridge = build_bridge_with_device(&settings(44_100, 4, 4), Box::new(UnavailableDevice));
        bridge.on_message(&audio_envelope(&[0.25]));
        let before = bridge.buffer_stats();

        bridge.on_message(&Envelope { supply_name: "audio".to_string(), payload: None });
        bridge.on_message(&Envelope {
            supply_name: "audio".to_string(),
            payload: Some(b"\xff\xfe not a record".to_vec()),
        });

        let after = bridge.buffer_stats();
        assert_eq!(after.len, before.len);
        assert_eq!(after.pushed, before.pushed);
        assert_eq!(bridge.stats().malformed, 2);
        assert_eq!(bridge.context().buffer.pull(8), vec![0.25]);
    }

    #[test]
    fn test_overflow_keeps_newest_samples() {
        // Capacity is 2 fragments of 2 samples.
        let bridge = build_bridge_with_device(&settings(44_100, 2, 2), Box::new(UnavailableDevice));
        bridge.on_message(&audio_envelope(&[1.0, 2.0, 3.0]));
        bridge.on_message(&audio_envelope(&[4.0, 5.0, 6.0]));

        assert_eq!(bridge.context().buffer.pull(10), vec![3.0, 4.0, 5.0, 6.0]);
        assert_eq!(bridge.buffer_stats().dropped_overflow, 2);
    }

    #[test]
    fn test_trailing_payload_bytes_are_ignored() {
        let bridge = build_bridge_with_device(&settings(44_100, 4, 4), Box::new(UnavailableDevice));
        let record = pulse_rx::bus::AudioRecord {
            bucket: None,
            samples: {
                let mut bytes = pulse_rx::audio::frame_decoder::encode(&[0.75]);
                bytes.extend_from_slice(&[1, 2, 3]);
                bytes
            },
        };
        bridge.on_message(&Envelope {
            supply_name: "audio".to_string(),
            payload: Some(record.encode().unwrap()),
        });
        assert_eq!(bridge.context().buffer.pull(4), vec![0.75]);
    }

    #[test]
    fn test_first_frame_opens_session_and_audio_is_played() {
        let (device, written) = RecordingDevice::new();
        let bridge = build_bridge_with_device(&settings(44_100, 4, 8), Box::new(device));
        assert_eq!(bridge.session_state(), SessionState::Idle);

        bridge.on_message(&audio_envelope(&[0.1, 0.2, 0.3, 0.4]));
        assert_eq!(bridge.context().sink.wait_opened(Duration::from_secs(2)), SessionState::Running);
        bridge.on_message(&audio_envelope(&[0.5, 0.6]));

        bridge.shutdown(Duration::from_secs(2));
        assert_eq!(bridge.session_state(), SessionState::Closed);

        let fragments = written.lock().unwrap().clone();
        assert!(!fragments.is_empty());
        assert!(fragments.iter().all(|f| f.len() == 4));
        let audible: Vec<f32> = fragments.concat().into_iter().filter(|s| *s != 0.0).collect();
        assert_eq!(audible, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
    }

    #[test]
    fn test_slow_device_open_does_not_stall_deliveries() {
        let bridge = Arc::new(build_bridge_with_device(
            &settings(44_100, 4, 64),
            Box::new(SlowOpenDevice::new(Duration::from_secs(1))),
        ));

        let started = Instant::now();
        bridge.on_message(&audio_envelope(&[0.1, 0.2]));
        bridge.on_message(&audio_envelope(&[0.3, 0.4]));
        assert!(started.elapsed() < Duration::from_millis(300), "deliveries took {:?}", started.elapsed());
        assert_eq!(bridge.stats().frames, 2);

        let observer = {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                let started = Instant::now();
                let state = bridge.session_state();
                (state, started.elapsed())
            })
        };
        let (state, took) = observer.join().unwrap();
        assert_eq!(state, SessionState::Opening);
        assert!(took < Duration::from_millis(100), "session_state took {:?}", took);

        bridge.shutdown(Duration::from_secs(2));
        assert_eq!(bridge.session_state(), SessionState::Closed);
    }

    #[test]
    fn test_concurrent_deliveries_lose_nothing() {
        let bridge = Arc::new(build_bridge_with_device(
            &settings(44_100, 64, 1024),
            Box::new(UnavailableDevice),
        ));

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let bridge = Arc::clone(&bridge);
                thread::spawn(move || {
                    for _ in 0..100 {
                        bridge.on_message(&audio_envelope(&[0.5; 16]));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(bridge.stats().frames, 400);
        assert_eq!(bridge.context().buffer.len(), 400 * 16);
        assert_eq!(bridge.buffer_stats().dropped_overflow, 0);
    }
}

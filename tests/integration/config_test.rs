//! Integration tests for configuration management
//!
//! These tests verify that file settings, command-line overrides and the
//! derived stream parameters fit together.

use clap::Parser;
use pulse_rx::config::Settings;
use pulse_rx::ui::Args;
use std::error::Error;
use tempfile::tempdir;

#[cfg(test)]
mod config_integration_tests {
    use super::*;

    /// Test complete configuration workflow
    #[test]
    fn test_config_lifecycle() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let config_path = dir.path().join("config.json");

        let mut settings = Settings::default();
        settings.node_server = "nodes.example.org:9990".to_string();
        settings.alsa_device = "hw:0,0".to_string();
        settings.fragment = 1024;
        settings.validate()?;
        settings.save(&config_path)?;

        let mut loaded = Settings::load(&config_path)?;
        assert_eq!(loaded.node_server, "nodes.example.org:9990");
        assert_eq!(loaded.alsa_device, "hw:0,0");

        // Command line beats the file.
        let args = Args::try_parse_from(["pulse-rx", "-f", "256", "-b", "3", "-d", "null"])?;
        args.apply_to(&mut loaded);
        loaded.validate()?;

        assert_eq!(loaded.fragment, 256);
        assert_eq!(loaded.alsa_device, "null");
        assert_eq!(loaded.buffer_capacity(), 768);
        assert_eq!(loaded.stream_config().fragment, 256);
        assert_eq!(loaded.stream_config().rate, 44_100);
        Ok(())
    }

    #[test]
    fn test_invalid_override_is_rejected() -> Result<(), Box<dyn Error>> {
        let mut settings = Settings::default();
        let args = Args::try_parse_from(["pulse-rx", "--rate", "0"])?;
        args.apply_to(&mut settings);
        assert!(settings.validate().is_err());
        Ok(())
    }
}

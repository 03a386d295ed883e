//! Command-line interface implementation

use crate::config::Settings;
use clap::Parser;

/// Command-line arguments for pulse-rx
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Plays audio published on a pub/sub bus", long_about = None)]
pub struct Args {
    /// Node server used for registration
    #[arg(short, long, env = "PULSE_RX_NODESRV")]
    pub nodesrv: Option<String>,

    /// Bus server to use instead of the one assigned by the node server
    #[arg(short, long, env = "PULSE_RX_LOCAL")]
    pub local: Option<String>,

    /// ALSA device to use ("null" discards audio)
    #[arg(short = 'd', long, env = "PULSE_RX_ALSA_DEVICE")]
    pub alsa_device: Option<String>,

    /// Sampling rate in samples per second
    #[arg(short, long, env = "PULSE_RX_RATE")]
    pub rate: Option<u32>,

    /// Samples per device pull
    #[arg(short, long, env = "PULSE_RX_FRAGMENT")]
    pub fragment: Option<usize>,

    /// Sample buffer capacity, in fragments
    #[arg(short, long, env = "PULSE_RX_BUFFER_FRAGMENTS")]
    pub buffer_fragments: Option<usize>,

    /// Open the output device at startup
    #[arg(long)]
    pub eager_open: bool,

    /// Verbose audio information
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "PULSE_RX_LOG_JSON")]
    pub log_json: bool,

    /// Config file path
    #[arg(short, long, env = "PULSE_RX_CONFIG")]
    pub config: Option<String>,
}

impl Args {
    /// Overrides file settings with whatever was given on the command line.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(nodesrv) = &self.nodesrv {
            settings.node_server = nodesrv.clone();
        }
        if let Some(local) = &self.local {
            settings.local = Some(local.clone());
        }
        if let Some(device) = &self.alsa_device {
            settings.alsa_device = device.clone();
        }
        if let Some(rate) = self.rate {
            settings.rate = rate;
        }
        if let Some(fragment) = self.fragment {
            settings.fragment = fragment;
        }
        if let Some(buffer_fragments) = self.buffer_fragments {
            settings.buffer_fragments = buffer_fragments;
        }
        settings.eager_open |= self.eager_open;
        settings.verbose |= self.verbose;
        settings.log_json |= self.log_json;
    }
}

use std::error::Error;
use std::io;

/// Error types specific to audio output.
#[derive(Debug)]
pub enum AudioError {
    AlsaError(String),
    IoError(io::Error),
    InvalidState(String),
    InitializationError(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::AlsaError(e) => write!(f, "ALSA error: {}", e),
            AudioError::IoError(e) => write!(f, "I/O error: {}", e),
            AudioError::InvalidState(s) => write!(f, "Invalid state: {}", s),
            AudioError::InitializationError(e) => write!(f, "Initialization error: {}", e),
        }
    }
}

impl Error for AudioError {}

// --- From Implementations for AudioError ---

#[cfg(feature = "alsa-output")]
impl From<alsa::Error> for AudioError {
    fn from(e: alsa::Error) -> Self {
        AudioError::AlsaError(e.to_string())
    }
}

impl From<io::Error> for AudioError {
    fn from(e: io::Error) -> Self {
        AudioError::IoError(e)
    }
}

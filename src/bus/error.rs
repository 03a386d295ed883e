use std::error::Error;

/// Errors raised while registering with the node server or talking to the bus.
#[derive(Debug)]
pub enum BusError {
    InvalidUrl(String),
    WebSocket(tokio_tungstenite::tungstenite::Error),
    Registration(reqwest::Error),
    RegistrationRejected(String),
    Json(serde_json::Error),
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusError::InvalidUrl(s) => write!(f, "Invalid bus URL: {}", s),
            BusError::WebSocket(e) => write!(f, "WebSocket error: {}", e),
            BusError::Registration(e) => write!(f, "Node registration failed: {}", e),
            BusError::RegistrationRejected(s) => write!(f, "Node registration rejected: {}", s),
            BusError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl Error for BusError {}

impl From<url::ParseError> for BusError {
    fn from(e: url::ParseError) -> Self {
        BusError::InvalidUrl(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BusError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        BusError::WebSocket(e)
    }
}

impl From<reqwest::Error> for BusError {
    fn from(e: reqwest::Error) -> Self {
        BusError::Registration(e)
    }
}

impl From<serde_json::Error> for BusError {
    fn from(e: serde_json::Error) -> Self {
        BusError::Json(e)
    }
}

use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("Negotiation error: {0}")]
    Negotiation(String),

    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("A session is already active: {0}")]
    SessionActive(String),
}

impl AppError {
    /// Short module label used when the error is surfaced on the status line
    pub fn module(&self) -> &'static str {
        match self {
            Self::Config(_) | Self::ConfigParse(_) => "config",
            Self::Io(_) => "system",
            Self::Serialization(_) | Self::Signaling(_) => "signaling",
            Self::Negotiation(_) | Self::WebRtcError(_) => "webrtc",
            Self::Capture(_) => "capture",
            Self::SessionActive(_) => "session",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

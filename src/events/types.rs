//! Agent event types
//!
//! Defines every event broadcast through the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::roi::RoiOverlay;
use crate::signaling::ChannelState;
use crate::webrtc::ConnectionState;

/// Origin of a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSource {
    Signaling,
    Webrtc,
    Capture,
    Session,
    Service,
}

impl std::fmt::Display for StatusSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusSource::Signaling => write!(f, "signaling"),
            StatusSource::Webrtc => write!(f, "webrtc"),
            StatusSource::Capture => write!(f, "capture"),
            StatusSource::Session => write!(f, "session"),
            StatusSource::Service => write!(f, "service"),
        }
    }
}

/// Agent event enumeration
///
/// Serialized as:
/// ```json
/// {
///   "event": "status",
///   "data": { "source": "signaling", "text": "signaling connected" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum AgentEvent {
    /// User-visible status line changed
    #[serde(rename = "status")]
    Status { source: StatusSource, text: String },

    /// Control channel state changed
    #[serde(rename = "signaling.state_changed")]
    ChannelStateChanged { state: ChannelState },

    /// Peer transport state changed
    #[serde(rename = "webrtc.state_changed")]
    ConnectionStateChanged {
        session_id: String,
        state: ConnectionState,
    },

    /// The service reported numbers for a frame
    #[serde(rename = "detection.numbers")]
    NumbersDetected {
        values: Vec<String>,
        frame_count: u64,
        /// Text shown on the results line
        text: String,
        received_at: DateTime<Utc>,
    },

    /// Overlay geometry changed
    #[serde(rename = "roi.changed")]
    RoiChanged { overlay: RoiOverlay },

    /// A capture session became active
    #[serde(rename = "session.started")]
    SessionStarted { session_id: String },

    /// A capture session was torn down
    #[serde(rename = "session.stopped")]
    SessionStopped { session_id: String },
}

impl AgentEvent {
    /// Convenience constructor for status lines
    pub fn status(source: StatusSource, text: impl Into<String>) -> Self {
        Self::Status {
            source,
            text: text.into(),
        }
    }

    /// Get the event name (for filtering/routing)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::ChannelStateChanged { .. } => "signaling.state_changed",
            Self::ConnectionStateChanged { .. } => "webrtc.state_changed",
            Self::NumbersDetected { .. } => "detection.numbers",
            Self::RoiChanged { .. } => "roi.changed",
            Self::SessionStarted { .. } => "session.started",
            Self::SessionStopped { .. } => "session.stopped",
        }
    }
}

//! Signaling message types and their JSON encoding
//!
//! Every message is a JSON object whose `type` field selects the variant:
//!
//! | type            | fields                                   | direction        |
//! |-----------------|------------------------------------------|------------------|
//! | `offer`         | `offer`                                  | client → service |
//! | `answer`        | `answer`                                 | service → client |
//! | `ice-candidate` | `candidate`                              | both             |
//! | `numbers`       | `data`, `frame_count`, `timestamp`?      | service → client |
//! | `roi-toggle`    | `enabled`                                | client → service |
//! | `error`         | `message`                                | service → client |

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Signaling message exchanged over the control channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingMessage {
    /// SDP offer
    Offer { offer: SessionDescription },
    /// SDP answer
    Answer { answer: SessionDescription },
    /// Trickled ICE candidate
    IceCandidate { candidate: IceCandidate },
    /// Numbers detected by the service in one analysed frame
    Numbers {
        #[serde(rename = "data")]
        values: NumberValues,
        frame_count: u64,
        /// Service-side processing time (seconds since epoch)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    /// Turn ROI cropping on or off on the service
    RoiToggle { enabled: bool },
    /// Service-side failure report
    Error { message: String },
}

impl SignalingMessage {
    /// Wire tag of this variant
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::Numbers { .. } => "numbers",
            Self::RoiToggle { .. } => "roi-toggle",
            Self::Error { .. } => "error",
        }
    }

    /// Whether `tag` names one of the variants above
    pub fn is_known_tag(tag: &str) -> bool {
        matches!(
            tag,
            "offer" | "answer" | "ice-candidate" | "numbers" | "roi-toggle" | "error"
        )
    }
}

/// Serialize a message to its JSON text form
pub fn encode(message: &SignalingMessage) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Parse a JSON text message
///
/// Returns `Ok(None)` for well-formed objects carrying a tag this agent does
/// not handle. A known tag with malformed fields is an error.
pub fn decode(text: &str) -> Result<Option<SignalingMessage>> {
    let value: Value = serde_json::from_str(text)?;
    let known = value
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(SignalingMessage::is_known_tag);
    if !known {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value)?))
}

/// SDP type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

impl std::fmt::Display for SdpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Pranswer => write!(f, "pranswer"),
            SdpType::Answer => write!(f, "answer"),
            SdpType::Rollback => write!(f, "rollback"),
        }
    }
}

/// Session description, passed through without interpretation
///
/// Only `type` and `sdp` are kept; any other field the peer adds is dropped
/// when the description is re-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate string
    pub candidate: String,
    /// SDP mid (media ID)
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// SDP mline index
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,
    /// Username fragment
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }

    pub fn with_mid(mut self, mid: impl Into<String>, index: u16) -> Self {
        self.sdp_mid = Some(mid.into());
        self.sdp_mline_index = Some(index);
        self
    }
}

/// Ordered numeric tokens detected in a frame
///
/// Encoded as an array of strings. Decoding also accepts an array of JSON
/// numbers, or a single whitespace-separated string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct NumberValues(pub Vec<String>);

impl NumberValues {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(values.into_iter().map(Into::into).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Values joined by single spaces, `None` when empty
    pub fn joined(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.join(" "))
        }
    }
}

impl<'de> Deserialize<'de> for NumberValues {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Token {
            Text(String),
            Number(serde_json::Number),
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<Token>),
            Text(String),
        }

        let values = match Raw::deserialize(deserializer)? {
            Raw::List(tokens) => tokens
                .into_iter()
                .map(|t| match t {
                    Token::Text(s) => s,
                    Token::Number(n) => n.to_string(),
                })
                .collect(),
            Raw::Text(text) => text.split_whitespace().map(str::to_string).collect(),
        };
        Ok(Self(values))
    }
}

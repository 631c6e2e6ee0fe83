//! Results line: shows what the service detected

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::events::{AgentEvent, EventBus, StatusSource};
use crate::signaling::{MessageHandler, NumberValues, SignalingMessage};

/// Text shown when a frame yielded no numbers
pub const NO_NUMBERS_TEXT: &str = "no numbers detected";

/// Results-line text for `values`
pub fn numbers_text(values: &NumberValues) -> String {
    values
        .joined()
        .unwrap_or_else(|| NO_NUMBERS_TEXT.to_string())
}

/// Channel handler publishing `numbers` and `error` messages
///
/// Registered once per channel, so it outlives individual sessions.
pub struct NumbersDisplay {
    events: Arc<EventBus>,
}

impl NumbersDisplay {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl MessageHandler for NumbersDisplay {
    async fn handle(&self, message: &SignalingMessage) {
        match message {
            SignalingMessage::Numbers {
                values,
                frame_count,
                ..
            } => {
                debug!("Frame {}: {} numbers", frame_count, values.len());
                self.events.publish(AgentEvent::NumbersDetected {
                    values: values.as_slice().to_vec(),
                    frame_count: *frame_count,
                    text: numbers_text(values),
                    received_at: Utc::now(),
                });
            }
            SignalingMessage::Error { message } => {
                warn!("Service reported an error: {}", message);
                self.events.status(StatusSource::Service, message.clone());
            }
            _ => {}
        }
    }
}

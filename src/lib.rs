//! dbmeter agent
//!
//! Streams a local video feed to a remote number-detection service over
//! WebRTC, negotiated through a WebSocket signaling channel, and shows the
//! detected numbers together with the region of the frame the service reads.

pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod roi;
pub mod session;
pub mod signaling;
pub mod utils;
pub mod webrtc;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{AppError, Result};

//! Capture sessions
//!
//! [`SessionController`] is the composition root: it owns the active session
//! context and wires feed, media session and ROI overlay together.

pub mod controller;
pub mod display;

pub use controller::{SessionContext, SessionController};
pub use display::{numbers_text, NumbersDisplay, NO_NUMBERS_TEXT};

//! Region-of-interest overlay geometry

pub mod projector;

pub use projector::{DisplayRect, DisplaySize, RoiConfig, RoiOverlay, RoiProjector, SourceRect};

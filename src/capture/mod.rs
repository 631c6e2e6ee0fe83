//! Local feed acquisition
//!
//! The camera itself is outside this crate. [`FeedSource`] is the seam: it
//! hands out a [`Feed`] carrying the media tracks and the source resolution.
//! [`IvfFeedSource`] replays a VP8 recording; [`SyntheticFeedSource`] only
//! provides the track.

pub mod feed;
pub mod format;
pub mod ivf;

pub use feed::{vp8_sample_track, CaptureConstraints, Feed, FeedSource, SyntheticFeedSource};
pub use format::Resolution;
pub use ivf::IvfFeedSource;

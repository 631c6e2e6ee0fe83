//! Feed acquisition
//!
//! A [`Feed`] is what the session gets from the camera side: the local media
//! tracks to attach, plus the source resolution once it is known. Frames are
//! written to the tracks by whoever produced the feed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use webrtc::api::media_engine::MIME_TYPE_VP8;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::format::Resolution;
use crate::error::{AppError, Result};

/// Requested capture parameters (ideal values, not hard limits)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Camera direction; "environment" is the rear camera
    pub facing_mode: String,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
            facing_mode: "environment".to_string(),
        }
    }
}

impl CaptureConstraints {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// An acquired local feed
///
/// Releasing (or dropping) the feed cancels [`released`](Self::released), the
/// producer's signal to stop writing frames.
pub struct Feed {
    id: String,
    tracks: Vec<Arc<TrackLocalStaticSample>>,
    metadata: watch::Receiver<Option<Resolution>>,
    cancel: CancellationToken,
}

impl Feed {
    pub fn new(
        id: impl Into<String>,
        tracks: Vec<Arc<TrackLocalStaticSample>>,
        metadata: watch::Receiver<Option<Resolution>>,
    ) -> Self {
        Self {
            id: id.into(),
            tracks,
            metadata,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Tracks to attach to the peer transport
    pub fn tracks(&self) -> &[Arc<TrackLocalStaticSample>] {
        &self.tracks
    }

    /// Tracks as trait objects
    pub fn local_tracks(&self) -> Vec<Arc<dyn TrackLocal + Send + Sync>> {
        self.tracks
            .iter()
            .map(|t| t.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .collect()
    }

    /// Source resolution; `None` until the feed reports it
    pub fn resolution(&self) -> Option<Resolution> {
        *self.metadata.borrow()
    }

    pub fn metadata_watch(&self) -> watch::Receiver<Option<Resolution>> {
        self.metadata.clone()
    }

    /// Token cancelled when the feed is released
    pub fn released(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_released(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the feed
    pub fn release(&self) {
        if !self.cancel.is_cancelled() {
            debug!("Releasing feed {}", self.id);
            self.cancel.cancel();
        }
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .field("resolution", &self.resolution())
            .finish()
    }
}

/// Source of local feeds
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Acquire a feed honoring `constraints` as well as the device can
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<Feed>;
}

/// Build a VP8 sample track
pub fn vp8_sample_track(track_id: &str, stream_id: &str) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_owned(),
            clock_rate: 90000,
            ..Default::default()
        },
        track_id.to_owned(),
        stream_id.to_owned(),
    ))
}

/// Feed source that needs no device
///
/// Each feed has one VP8 track and reports the requested resolution right
/// away. Samples are written by the caller through [`Feed::tracks`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticFeedSource;

#[async_trait]
impl FeedSource for SyntheticFeedSource {
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<Feed> {
        let resolution = constraints.resolution();
        if !resolution.is_known() {
            return Err(AppError::Capture(format!(
                "No usable resolution in constraints ({})",
                resolution
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let track = vp8_sample_track("video", &format!("dbmeter-{}", id));
        let (_, metadata) = watch::channel(Some(resolution));

        info!(
            "Synthetic feed {} acquired: {} @ {} fps, facing {}",
            id, resolution, constraints.frame_rate, constraints.facing_mode
        );
        Ok(Feed::new(id, vec![track], metadata))
    }
}

//! Feed that replays a VP8 IVF file
//!
//! The file is read into memory once per acquisition. Frames are paced at the
//! file's timebase and the replay loops until the feed is released.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use webrtc::media::io::ivf_reader::{IVFFileHeader, IVFReader};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use super::feed::{vp8_sample_track, CaptureConstraints, Feed, FeedSource};
use super::format::Resolution;
use crate::error::{AppError, Result};

const VP8_FOURCC: &[u8; 4] = b"VP80";

/// Frame interval used when the header has no usable timebase
const FALLBACK_FRAME_RATE: u32 = 30;

/// Replays an IVF file as the local feed
#[derive(Debug, Clone)]
pub struct IvfFeedSource {
    path: PathBuf,
}

impl IvfFeedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Header fields the feed needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IvfInfo {
    resolution: Resolution,
    frame_interval: Duration,
}

fn inspect(header: &IVFFileHeader, constraints: &CaptureConstraints) -> Result<IvfInfo> {
    if &header.four_cc != VP8_FOURCC {
        return Err(AppError::Capture(format!(
            "Unsupported IVF codec {:?}, expected VP80",
            String::from_utf8_lossy(&header.four_cc)
        )));
    }

    let resolution = Resolution::new(header.width as u32, header.height as u32);
    if !resolution.is_known() {
        return Err(AppError::Capture("IVF header has no frame size".to_string()));
    }

    // Timebase is seconds per tick; one tick per frame in practice
    let frame_interval = if header.timebase_numerator > 0 && header.timebase_denominator > 0 {
        Duration::from_secs_f64(
            header.timebase_numerator as f64 / header.timebase_denominator as f64,
        )
    } else {
        let rate = if constraints.frame_rate > 0 {
            constraints.frame_rate
        } else {
            FALLBACK_FRAME_RATE
        };
        Duration::from_secs(1) / rate
    };
    if frame_interval.is_zero() {
        return Err(AppError::Capture(format!(
            "IVF timebase {}/{} is too small to pace frames",
            header.timebase_numerator, header.timebase_denominator
        )));
    }

    Ok(IvfInfo {
        resolution,
        frame_interval,
    })
}

#[async_trait]
impl FeedSource for IvfFeedSource {
    async fn acquire(&self, constraints: &CaptureConstraints) -> Result<Feed> {
        let data = tokio::fs::read(&self.path).await.map_err(|e| {
            AppError::Capture(format!("Cannot open {}: {}", self.path.display(), e))
        })?;
        let data = Bytes::from(data);

        let (_, header) = IVFReader::new(Cursor::new(data.clone()))
            .map_err(|e| AppError::Capture(format!("Invalid IVF file: {}", e)))?;
        let info = inspect(&header, constraints)?;

        if info.resolution != constraints.resolution() {
            debug!(
                "IVF resolution {} differs from requested {}",
                info.resolution,
                constraints.resolution()
            );
        }

        let id = uuid::Uuid::new_v4().to_string();
        let track = vp8_sample_track("video", &format!("dbmeter-{}", id));
        let (_, metadata) = watch::channel(Some(info.resolution));
        let feed = Feed::new(id, vec![track.clone()], metadata);

        tokio::spawn(replay(data, info.frame_interval, track, feed.released()));

        info!(
            "IVF feed {} acquired from {}: {} every {:?}",
            feed.id(),
            self.path.display(),
            info.resolution,
            info.frame_interval
        );
        Ok(feed)
    }
}

async fn replay(
    data: Bytes,
    frame_interval: Duration,
    track: Arc<TrackLocalStaticSample>,
    released: CancellationToken,
) {
    let mut ticker = tokio::time::interval(frame_interval);
    let mut frames: u64 = 0;

    'file: loop {
        let mut reader = match IVFReader::new(Cursor::new(data.clone())) {
            Ok((reader, _)) => reader,
            Err(e) => {
                warn!("IVF replay stopped: {}", e);
                return;
            }
        };

        loop {
            tokio::select! {
                _ = released.cancelled() => break 'file,
                _ = ticker.tick() => {}
            }

            let frame = match reader.parse_next_frame() {
                Ok((frame, _)) => frame.freeze(),
                Err(e) => {
                    trace!("IVF end of file after {} frames ({}), looping", frames, e);
                    continue 'file;
                }
            };

            let sample = Sample {
                data: frame,
                duration: frame_interval,
                ..Default::default()
            };
            if let Err(e) = track.write_sample(&sample).await {
                trace!("VP8 write_sample failed (no peer?): {}", e);
            }
            frames += 1;
        }
    }

    debug!("IVF replay finished after {} frames", frames);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(four_cc: [u8; 4], width: u16, height: u16, num: u32, den: u32) -> IVFFileHeader {
        IVFFileHeader {
            signature: *b"DKIF",
            version: 0,
            header_size: 32,
            four_cc,
            width,
            height,
            timebase_denominator: den,
            timebase_numerator: num,
            num_frames: 0,
            unused: 0,
        }
    }

    #[test]
    fn test_inspect_vp8() {
        let info = inspect(
            &header(*b"VP80", 1280, 720, 1, 30),
            &CaptureConstraints::default(),
        )
        .unwrap();
        assert_eq!(info.resolution, Resolution::HD720);
        assert_eq!(info.frame_interval, Duration::from_secs_f64(1.0 / 30.0));
    }

    #[test]
    fn test_inspect_falls_back_to_requested_rate() {
        let constraints = CaptureConstraints {
            frame_rate: 10,
            ..Default::default()
        };
        let info = inspect(&header(*b"VP80", 640, 480, 0, 0), &constraints).unwrap();
        assert_eq!(info.frame_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_inspect_rejects_other_codecs() {
        let constraints = CaptureConstraints::default();
        assert!(inspect(&header(*b"VP90", 640, 480, 1, 30), &constraints).is_err());
        assert!(inspect(&header(*b"VP80", 0, 480, 1, 30), &constraints).is_err());
    }

    #[test]
    fn test_inspect_rejects_zero_frame_interval() {
        let result = inspect(
            &header(*b"VP80", 640, 480, 1, u32::MAX),
            &CaptureConstraints::default(),
        );
        assert!(matches!(result, Err(AppError::Capture(_))));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let source = IvfFeedSource::new("/nonexistent/feed.ivf");
        assert!(matches!(
            source.acquire(&CaptureConstraints::default()).await,
            Err(AppError::Capture(_))
        ));
    }
}

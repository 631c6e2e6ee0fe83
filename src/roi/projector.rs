//! Region-of-interest projection
//!
//! The detection service crops every frame to a centered rectangle before
//! analysing it. The overlay shows the user exactly that rectangle, so the
//! source-space math below mirrors the service's integer arithmetic:
//!
//! ```text
//! roi_w = floor(width  * width_ratio)      cx = width  / 2
//! roi_h = floor(height * height_ratio)     cy = height / 2
//! x1 = max(0, cx - roi_w / 2 - padding)    x2 = min(width,  cx + roi_w / 2 + padding)
//! y1 = max(0, cy - roi_h / 2 - padding)    y2 = min(height, cy + roi_h / 2 + padding)
//! ```
//!
//! All divisions are integer (floor) divisions. The source rectangle is then
//! scaled componentwise into display space.

use serde::{Deserialize, Serialize};

use crate::capture::Resolution;

/// Crop convention shared with the detection service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiConfig {
    /// Fraction of the frame width covered by the region
    pub width_ratio: f64,
    /// Fraction of the frame height covered by the region
    pub height_ratio: f64,
    /// Pixels added on every side before clamping
    pub padding: u32,
}

impl RoiConfig {
    /// The service's crop constants (`DEFAULT_ROI_*` on the service side)
    pub const SERVICE: RoiConfig = RoiConfig {
        width_ratio: 0.2,
        height_ratio: 0.18,
        padding: 0,
    };

    /// Center 60% of the frame widened by 40px per side
    pub const CENTER_PADDED: RoiConfig = RoiConfig {
        width_ratio: 0.6,
        height_ratio: 0.6,
        padding: 40,
    };

    /// Ratios must lie in `(0, 1]`
    pub fn is_valid(&self) -> bool {
        let in_range = |r: f64| r.is_finite() && r > 0.0 && r <= 1.0;
        in_range(self.width_ratio) && in_range(self.height_ratio)
    }
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self::SERVICE
    }
}

/// Rectangle in source-frame pixel coordinates, `x1 <= x2`, `y1 <= y2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl SourceRect {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

/// On-screen size of the surface the feed is rendered into
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl DisplaySize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

impl From<Resolution> for DisplaySize {
    fn from(r: Resolution) -> Self {
        Self::new(r.width as f64, r.height as f64)
    }
}

/// Rectangle in display coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl DisplayRect {
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }
}

/// Result of a projection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RoiOverlay {
    /// Nothing to draw
    Hidden,
    /// Draw `display`; `source` is the region the service analyses
    Visible {
        source: SourceRect,
        display: DisplayRect,
    },
}

impl RoiOverlay {
    pub fn is_visible(&self) -> bool {
        matches!(self, Self::Visible { .. })
    }

    pub fn display_rect(&self) -> Option<DisplayRect> {
        match self {
            Self::Visible { display, .. } => Some(*display),
            Self::Hidden => None,
        }
    }
}

/// Stateless projector bound to one crop convention
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RoiProjector {
    config: RoiConfig,
}

impl RoiProjector {
    pub fn new(config: RoiConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoiConfig {
        &self.config
    }

    /// Region the service crops for a frame of `source` size
    ///
    /// Returns `None` while the source resolution is unknown.
    pub fn source_region(&self, source: Resolution) -> Option<SourceRect> {
        if !source.is_known() {
            return None;
        }

        let (x1, x2) = crop_span(source.width, self.config.width_ratio, self.config.padding);
        let (y1, y2) = crop_span(source.height, self.config.height_ratio, self.config.padding);

        Some(SourceRect { x1, y1, x2, y2 })
    }

    /// Project the region into display space
    ///
    /// `source` is `None` until the feed reports its metadata. Any unknown or
    /// zero dimension yields [`RoiOverlay::Hidden`].
    pub fn project(
        &self,
        source: Option<Resolution>,
        display: DisplaySize,
        enabled: bool,
    ) -> RoiOverlay {
        if !enabled || !display.is_usable() {
            return RoiOverlay::Hidden;
        }
        let Some(source) = source else {
            return RoiOverlay::Hidden;
        };
        let Some(rect) = self.source_region(source) else {
            return RoiOverlay::Hidden;
        };

        let scale_x = display.width / source.width as f64;
        let scale_y = display.height / source.height as f64;

        let left = (rect.x1 as f64 * scale_x).clamp(0.0, display.width);
        let top = (rect.y1 as f64 * scale_y).clamp(0.0, display.height);
        let right = (rect.x2 as f64 * scale_x).clamp(left, display.width);
        let bottom = (rect.y2 as f64 * scale_y).clamp(top, display.height);

        RoiOverlay::Visible {
            source: rect,
            display: DisplayRect {
                left,
                top,
                right,
                bottom,
            },
        }
    }
}

/// `[start, end)` of the crop along one axis of length `extent`
fn crop_span(extent: u32, ratio: f64, padding: u32) -> (u32, u32) {
    let span = (extent as f64 * ratio).floor() as u32;
    let center = extent / 2;
    let half = (span / 2).saturating_add(padding);

    let start = center.saturating_sub(half);
    let end = center.saturating_add(half).min(extent);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visible(overlay: RoiOverlay) -> (SourceRect, DisplayRect) {
        match overlay {
            RoiOverlay::Visible { source, display } => (source, display),
            RoiOverlay::Hidden => panic!("expected a visible overlay"),
        }
    }

    #[test]
    fn test_service_region_720p() {
        let projector = RoiProjector::new(RoiConfig::SERVICE);
        let rect = projector.source_region(Resolution::HD720).unwrap();

        // 1280 * 0.2 = 256, 720 * 0.18 = 129.6 -> 129 (half 64)
        assert_eq!(
            rect,
            SourceRect {
                x1: 512,
                y1: 296,
                x2: 768,
                y2: 424
            }
        );
        assert_eq!(rect.width(), 256);
        assert_eq!(rect.height(), 128);
    }

    #[test]
    fn test_padded_region_720p_stays_in_bounds() {
        let projector = RoiProjector::new(RoiConfig::CENTER_PADDED);
        let rect = projector.source_region(Resolution::HD720).unwrap();

        // 768x432 centered, widened by 40px per side; clamping does not bite
        assert_eq!(
            rect,
            SourceRect {
                x1: 216,
                y1: 104,
                x2: 1064,
                y2: 616
            }
        );
        assert_eq!(rect.width(), 768 + 80);
        assert_eq!(rect.height(), 432 + 80);
    }

    #[test]
    fn test_padding_clamped_on_small_frames() {
        let projector = RoiProjector::new(RoiConfig {
            width_ratio: 1.0,
            height_ratio: 1.0,
            padding: 40,
        });
        let rect = projector.source_region(Resolution::new(64, 48)).unwrap();
        assert_eq!(
            rect,
            SourceRect {
                x1: 0,
                y1: 0,
                x2: 64,
                y2: 48
            }
        );
    }

    #[test]
    fn test_odd_dimensions_floor() {
        let projector = RoiProjector::new(RoiConfig::SERVICE);
        // 641 * 0.2 = 128.2 -> 128, center 320; 479 * 0.18 = 86.22 -> 86, center 239
        let rect = projector.source_region(Resolution::new(641, 479)).unwrap();
        assert_eq!(
            rect,
            SourceRect {
                x1: 256,
                y1: 196,
                x2: 384,
                y2: 282
            }
        );
    }

    #[test]
    fn test_scaling_to_display() {
        let projector = RoiProjector::new(RoiConfig::SERVICE);
        let overlay = projector.project(
            Some(Resolution::HD720),
            DisplaySize::new(640.0, 360.0),
            true,
        );
        let (_, display) = visible(overlay);

        assert_eq!(display.left, 256.0);
        assert_eq!(display.top, 148.0);
        assert_eq!(display.width(), 128.0);
        assert_eq!(display.height(), 64.0);
    }

    #[test]
    fn test_non_uniform_scaling() {
        let projector = RoiProjector::new(RoiConfig::SERVICE);
        let overlay = projector.project(
            Some(Resolution::HD720),
            DisplaySize::new(1280.0, 360.0),
            true,
        );
        let (source, display) = visible(overlay);

        assert_eq!(display.left, source.x1 as f64);
        assert_eq!(display.width(), source.width() as f64);
        assert_eq!(display.top, source.y1 as f64 / 2.0);
        assert_eq!(display.height(), source.height() as f64 / 2.0);
    }

    #[test]
    fn test_disabled_is_hidden() {
        let projector = RoiProjector::default();
        let display = DisplaySize::new(800.0, 600.0);

        for source in [Resolution::VGA, Resolution::HD720, Resolution::HD1080] {
            assert_eq!(
                projector.project(Some(source), display, false),
                RoiOverlay::Hidden
            );
        }
    }

    #[test]
    fn test_reenable_reproduces_rectangle() {
        let projector = RoiProjector::default();
        let display = DisplaySize::new(933.5, 525.25);
        let source = Some(Resolution::HD1080);

        let before = projector.project(source, display, true);
        assert_eq!(projector.project(source, display, false), RoiOverlay::Hidden);
        let after = projector.project(source, display, true);

        assert!(before.is_visible());
        assert_eq!(before, after);
    }

    #[test]
    fn test_unknown_source_is_hidden() {
        let projector = RoiProjector::default();
        let display = DisplaySize::new(800.0, 600.0);

        assert_eq!(projector.project(None, display, true), RoiOverlay::Hidden);
        assert_eq!(
            projector.project(Some(Resolution::new(0, 720)), display, true),
            RoiOverlay::Hidden
        );
        assert_eq!(
            projector.project(Some(Resolution::new(1280, 0)), display, true),
            RoiOverlay::Hidden
        );
        assert_eq!(
            projector.project(Some(Resolution::HD720), DisplaySize::new(0.0, 600.0), true),
            RoiOverlay::Hidden
        );
    }

    #[test]
    fn test_contained_in_display() {
        let sources = [
            (1, 1),
            (2, 3),
            (3, 7),
            (160, 120),
            (641, 479),
            (1280, 720),
            (1920, 1080),
            (4095, 2161),
        ];
        let displays = [
            (1.0, 1.0),
            (0.5, 0.25),
            (333.3, 187.7),
            (1280.0, 720.0),
            (2560.0, 1441.0),
            (7.0, 3000.0),
        ];

        for config in [
            RoiConfig::SERVICE,
            RoiConfig::CENTER_PADDED,
            RoiConfig {
                width_ratio: 1.0,
                height_ratio: 1.0,
                padding: 1000,
            },
        ] {
            let projector = RoiProjector::new(config);
            for &(sw, sh) in &sources {
                for &(dw, dh) in &displays {
                    let overlay = projector.project(
                        Some(Resolution::new(sw, sh)),
                        DisplaySize::new(dw, dh),
                        true,
                    );
                    let (source, rect) = visible(overlay);

                    assert!(source.x2 <= sw && source.y2 <= sh);
                    assert!(rect.left >= 0.0 && rect.top >= 0.0);
                    assert!(rect.width() >= 0.0 && rect.height() >= 0.0);
                    assert!(rect.right <= dw, "{config:?} {sw}x{sh} -> {dw}x{dh}");
                    assert!(rect.bottom <= dh, "{config:?} {sw}x{sh} -> {dw}x{dh}");
                }
            }
        }
    }

    #[test]
    fn test_idempotent() {
        let projector = RoiProjector::new(RoiConfig::CENTER_PADDED);
        let source = Some(Resolution::new(1366, 768));
        let display = DisplaySize::new(1013.0, 570.0);

        let first = projector.project(source, display, true);
        let second = projector.project(source, display, true);
        assert_eq!(first, second);
    }

    #[test]
    fn test_config_validation() {
        assert!(RoiConfig::SERVICE.is_valid());
        assert!(RoiConfig::CENTER_PADDED.is_valid());
        assert!(!RoiConfig {
            width_ratio: 0.0,
            ..RoiConfig::SERVICE
        }
        .is_valid());
        assert!(!RoiConfig {
            height_ratio: 1.5,
            ..RoiConfig::SERVICE
        }
        .is_valid());
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::capture::CaptureConstraints;
use crate::error::{AppError, Result};
use crate::roi::{DisplaySize, RoiConfig};
use crate::webrtc::WebRtcConfig;

/// Main agent configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Control channel settings
    pub signaling: SignalingConfig,
    /// Peer connection settings
    pub webrtc: WebRtcConfig,
    /// Region-of-interest overlay settings
    pub roi: RoiSettings,
    /// Capture request
    pub capture: CaptureConstraints,
    /// Display surface
    pub display: DisplayConfig,
}

impl AgentConfig {
    /// Check values that would otherwise fail at runtime
    pub fn validate(&self) -> Result<()> {
        self.signaling.validate()?;
        self.roi.validate()?;

        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(AppError::Config(
                "capture width and height must be positive".to_string(),
            ));
        }
        if self.display.width == 0 || self.display.height == 0 {
            return Err(AppError::Config(
                "display width and height must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Signaling channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Service host, with optional port
    pub host: String,
    /// Use `wss://` instead of `ws://`
    pub secure: bool,
    /// Endpoint path
    pub path: String,
    /// Delay before reconnecting after the channel closes
    pub reconnect_delay_ms: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            host: "localhost:8000".to_string(),
            secure: false,
            path: "/webrtc-signaling".to_string(),
            reconnect_delay_ms: 3000,
        }
    }
}

impl SignalingConfig {
    /// Endpoint URL, `{ws|wss}://{host}{path}`
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{}://{}{}", scheme, self.host, path)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Take host and transport security from a page origin
    ///
    /// `https://` origins select a secure channel, anything else a plain one.
    pub fn apply_origin(&mut self, origin: &str) -> Result<()> {
        let url = Url::parse(origin)
            .map_err(|e| AppError::Config(format!("Invalid origin '{}': {}", origin, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| AppError::Config(format!("Origin '{}' has no host", origin)))?;

        self.host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        self.secure = matches!(url.scheme(), "https" | "wss");
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::Config("signaling host is empty".to_string()));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(AppError::Config(
                "signaling reconnect_delay_ms must be positive".to_string(),
            ));
        }
        Url::parse(&self.url())
            .map_err(|e| AppError::Config(format!("Invalid signaling endpoint: {}", e)))?;
        Ok(())
    }
}

/// ROI overlay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiSettings {
    /// Overlay shown at startup
    pub enabled: bool,
    /// Crop width as a fraction of the frame width
    pub width_ratio: f64,
    /// Crop height as a fraction of the frame height
    pub height_ratio: f64,
    /// Extra pixels on every side of the crop
    pub padding: u32,
    /// Send `roi-toggle` to the service when the overlay is toggled
    pub notify_service: bool,
}

impl Default for RoiSettings {
    fn default() -> Self {
        let roi = RoiConfig::SERVICE;
        Self {
            enabled: true,
            width_ratio: roi.width_ratio,
            height_ratio: roi.height_ratio,
            padding: roi.padding,
            notify_service: true,
        }
    }
}

impl RoiSettings {
    pub fn roi_config(&self) -> RoiConfig {
        RoiConfig {
            width_ratio: self.width_ratio,
            height_ratio: self.height_ratio,
            padding: self.padding,
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.roi_config().is_valid() {
            return Err(AppError::Config(format!(
                "ROI ratios must be in (0, 1], got {} x {}",
                self.width_ratio, self.height_ratio
            )));
        }
        Ok(())
    }
}

/// Display surface configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl DisplayConfig {
    pub fn size(&self) -> DisplaySize {
        DisplaySize::new(self.width as f64, self.height as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.signaling.url(), "ws://localhost:8000/webrtc-signaling");
        assert_eq!(config.signaling.reconnect_delay(), Duration::from_millis(3000));
        assert_eq!(config.roi.roi_config(), RoiConfig::SERVICE);
        assert!(config.roi.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_origin() {
        let mut signaling = SignalingConfig::default();

        signaling.apply_origin("https://meter.example.com").unwrap();
        assert_eq!(signaling.url(), "wss://meter.example.com/webrtc-signaling");

        signaling.apply_origin("http://192.168.1.20:8000/index.html").unwrap();
        assert_eq!(signaling.url(), "ws://192.168.1.20:8000/webrtc-signaling");

        assert!(signaling.apply_origin("not an origin").is_err());
    }

    #[test]
    fn test_path_without_slash() {
        let signaling = SignalingConfig {
            path: "signal".to_string(),
            ..Default::default()
        };
        assert_eq!(signaling.url(), "ws://localhost:8000/signal");
    }

    #[test]
    fn test_partial_toml() {
        let config: AgentConfig = toml::from_str(
            r#"
            [signaling]
            host = "detector.local"
            secure = true

            [roi]
            width_ratio = 0.6
            height_ratio = 0.6
            padding = 40
            "#,
        )
        .unwrap();

        assert_eq!(config.signaling.url(), "wss://detector.local/webrtc-signaling");
        assert_eq!(config.signaling.reconnect_delay_ms, 3000);
        assert_eq!(config.roi.roi_config(), RoiConfig::CENTER_PADDED);
        assert_eq!(config.capture, CaptureConstraints::default());
    }

    #[test]
    fn test_validation() {
        let mut config = AgentConfig::default();
        config.roi.width_ratio = 1.5;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AgentConfig::default();
        config.signaling.reconnect_delay_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.signaling.host = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.display.width = 0;
        assert!(config.validate().is_err());
    }
}

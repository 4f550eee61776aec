use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::camera::v4l2::V4l2Settings;
use crate::registry::RegistryConfig;
use crate::stream::SessionSettings;
use crate::video::format::{PixelFormat, Resolution};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Web server settings
    pub web: WebConfig,
    /// Camera capture settings
    pub camera: CameraConfig,
    /// Per-viewer streaming settings
    pub stream: StreamConfig,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub bind_address: String,
    /// HTTP port
    pub http_port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 9001,
        }
    }
}

/// Where camera frames come from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CameraBackendKind {
    /// `/dev/videoN` through V4L2
    #[default]
    V4l2,
    /// Synthetic gradients, no hardware needed
    TestPattern,
}

impl std::str::FromStr for CameraBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "v4l2" => Ok(Self::V4l2),
            "test_pattern" | "pattern" => Ok(Self::TestPattern),
            _ => Err(format!("Unknown camera backend: {}", s)),
        }
    }
}

/// Highest camera index a `/cameras` probe may reach
pub const MAX_PROBE_INDEX: u32 = 63;

/// Camera capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub backend: CameraBackendKind,
    /// Resolution width
    pub width: u32,
    /// Resolution height
    pub height: u32,
    /// Frame rate
    pub fps: u32,
    /// Requested pixel format
    pub format: PixelFormat,
    /// Number of V4L2 mmap buffers
    pub buffer_count: u32,
    /// Bound on a single capture call
    pub capture_timeout_ms: u64,
    /// Minimum seconds between repeated capture-miss warnings
    pub error_log_interval_secs: u64,
    /// JPEG quality (1-100) for cameras that do not deliver MJPEG
    pub jpeg_quality: u32,
    /// Highest index probed by `/cameras` when the request does not say
    pub probe_max_index: u32,
    /// Camera ids served by the test-pattern backend
    pub test_pattern_ids: Vec<u32>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: CameraBackendKind::V4l2,
            width: 640,
            height: 480,
            fps: 30,
            format: PixelFormat::Mjpeg,
            buffer_count: 2,
            capture_timeout_ms: 1000,
            error_log_interval_secs: 5,
            jpeg_quality: 80,
            probe_max_index: 5,
            test_pattern_ids: vec![0],
        }
    }
}

impl CameraConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn v4l2_settings(&self) -> V4l2Settings {
        V4l2Settings {
            resolution: self.resolution(),
            format: self.format,
            fps: self.fps,
            buffer_count: self.buffer_count,
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::new()
            .capture_timeout(Duration::from_millis(self.capture_timeout_ms))
            .error_log_interval(Duration::from_secs(self.error_log_interval_secs))
    }
}

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Delay between frame-cache polls while no new frame is available
    pub poll_interval_ms: u64,
    /// How long a new viewer waits for its first frame
    pub first_frame_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            first_frame_timeout_ms: 5000,
        }
    }
}

impl StreamConfig {
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            first_frame_timeout: Duration::from_millis(self.first_frame_timeout_ms),
        }
    }
}

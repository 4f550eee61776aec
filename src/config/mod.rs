//! Application configuration
//!
//! Defaults, optionally overlaid by a JSON file; the CLI applies its
//! overrides on top before [`AppConfig::validate`] runs.

mod schema;

pub use schema::*;

use std::path::Path;

use crate::error::{AppError, Result};

impl AppConfig {
    /// Load configuration from a JSON file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: AppConfig = serde_json::from_str(&content).map_err(|e| {
            AppError::Config(format!("Invalid config file {}: {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// Load `path` if given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.web.bind_address.parse::<std::net::IpAddr>().is_err() {
            return Err(AppError::Config(format!(
                "Invalid bind address: {}",
                self.web.bind_address
            )));
        }
        if self.web.http_port == 0 {
            return Err(AppError::Config("HTTP port must not be 0".to_string()));
        }

        let camera = &self.camera;
        if !camera.resolution().is_valid() {
            return Err(AppError::Config(format!(
                "Invalid resolution: {}",
                camera.resolution()
            )));
        }
        if camera.fps == 0 || camera.fps > 240 {
            return Err(AppError::Config(format!("Invalid fps: {}", camera.fps)));
        }
        if camera.buffer_count == 0 || camera.buffer_count > 32 {
            return Err(AppError::Config(format!(
                "Invalid buffer count: {}",
                camera.buffer_count
            )));
        }
        if camera.capture_timeout_ms == 0 {
            return Err(AppError::Config(
                "Capture timeout must be positive".to_string(),
            ));
        }
        if camera.error_log_interval_secs == 0 {
            return Err(AppError::Config(
                "Error log interval must be positive".to_string(),
            ));
        }
        if !(1..=100).contains(&camera.jpeg_quality) {
            return Err(AppError::Config(format!(
                "JPEG quality must be 1-100, got {}",
                camera.jpeg_quality
            )));
        }
        if camera.probe_max_index > MAX_PROBE_INDEX {
            return Err(AppError::Config(format!(
                "probe_max_index must be at most {}, got {}",
                MAX_PROBE_INDEX, camera.probe_max_index
            )));
        }
        if camera.backend == CameraBackendKind::TestPattern && camera.test_pattern_ids.is_empty() {
            return Err(AppError::Config(
                "Test pattern backend needs at least one camera id".to_string(),
            ));
        }

        if self.stream.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "Poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

use std::sync::Arc;

use crate::camera::{CameraBackend, CameraId, TestPatternBackend, V4l2Backend};
use crate::config::{AppConfig, CameraBackendKind, CameraConfig};
use crate::registry::CameraRegistry;
use crate::stream::SessionSettings;
use crate::video::jpeg::{EncoderFactory, FrameEncoder, JpegEncoder};

/// Application-wide state shared across handlers
///
/// All camera access goes through `registry`; handlers never touch a
/// camera handle directly.
pub struct AppState {
    /// Effective configuration (file + CLI overrides)
    pub config: AppConfig,
    /// Process-wide camera registry
    pub registry: Arc<CameraRegistry>,
}

impl AppState {
    pub fn new(config: AppConfig, registry: Arc<CameraRegistry>) -> Arc<Self> {
        Arc::new(Self { config, registry })
    }

    /// Build the camera backend and registry described by `config`
    pub fn from_config(config: AppConfig) -> Arc<Self> {
        let registry = Arc::new(CameraRegistry::with_encoder(
            build_backend(&config.camera),
            config.camera.registry_config(),
            encoder_factory(config.camera.jpeg_quality),
        ));
        Self::new(config, registry)
    }

    pub fn session_settings(&self) -> SessionSettings {
        self.config.stream.session_settings()
    }
}

fn build_backend(camera: &CameraConfig) -> Arc<dyn CameraBackend> {
    match camera.backend {
        CameraBackendKind::V4l2 => Arc::new(V4l2Backend::new(camera.v4l2_settings())),
        CameraBackendKind::TestPattern => Arc::new(TestPatternBackend::new(
            camera.test_pattern_ids.iter().copied().map(CameraId),
            camera.resolution(),
            camera.fps,
        )),
    }
}

fn encoder_factory(quality: u32) -> EncoderFactory {
    Arc::new(move || Box::new(JpegEncoder::new(quality)) as Box<dyn FrameEncoder>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AttachError;

    #[tokio::test]
    async fn test_registry_shutdown_ends_service() {
        let mut config = AppConfig::default();
        config.camera.backend = CameraBackendKind::TestPattern;
        config.camera.test_pattern_ids = vec![1];
        let state = AppState::from_config(config);

        let lease = state.registry.attach(CameraId(1)).await.unwrap();
        assert!(state.registry.status(CameraId(1)).active);

        state.registry.shutdown().await;
        assert!(!lease.is_live());
        assert!(!state.registry.status(CameraId(1)).active);
        assert!(matches!(
            state.registry.attach(CameraId(1)).await,
            Err(AttachError::ShuttingDown)
        ));
        drop(lease);
    }
}

//! Camera registry implementation
//!
//! The process-wide map from camera id to entry. The map lock is only held
//! to look up or insert an entry; all camera work happens under the
//! entry's own guard.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::cache::FrameCache;
use super::config::RegistryConfig;
use super::entry::{CameraEntry, CameraState};
use super::error::AttachError;
use super::lease::ViewerLease;
use crate::camera::{CameraBackend, CameraId};
use crate::video::jpeg::{EncoderFactory, FrameEncoder, JpegEncoder, DEFAULT_QUALITY};

/// Read-only snapshot of one camera
#[derive(Debug, Clone, Serialize)]
pub struct CameraStatus {
    pub camera: CameraId,
    pub state: CameraState,
    pub active: bool,
    pub viewers: u32,
    pub epoch: u64,
    pub frames_published: u64,
    pub frames_dropped: u64,
}

/// Registry of all cameras the process has heard of
pub struct CameraRegistry {
    backend: Arc<dyn CameraBackend>,
    encoder_factory: EncoderFactory,
    config: RegistryConfig,
    entries: RwLock<HashMap<CameraId, Arc<CameraEntry>>>,
    shutting_down: AtomicBool,
}

impl CameraRegistry {
    /// Create a registry that encodes with a default-quality JPEG encoder
    pub fn new(backend: Arc<dyn CameraBackend>, config: RegistryConfig) -> Self {
        Self::with_encoder(
            backend,
            config,
            Arc::new(|| Box::new(JpegEncoder::new(DEFAULT_QUALITY)) as Box<dyn FrameEncoder>),
        )
    }

    pub fn with_encoder(
        backend: Arc<dyn CameraBackend>,
        config: RegistryConfig,
        encoder_factory: EncoderFactory,
    ) -> Self {
        info!("Camera registry using {} backend", backend.name());
        Self {
            backend,
            encoder_factory,
            config,
            entries: RwLock::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Get the entry for `id`, creating it on first use
    fn entry(&self, id: CameraId) -> Arc<CameraEntry> {
        if let Some(entry) = self.entries.read().get(&id) {
            return entry.clone();
        }

        self.entries
            .write()
            .entry(id)
            .or_insert_with(|| {
                let cache = FrameCache::new(id, (self.encoder_factory)());
                Arc::new(CameraEntry::new(id, cache))
            })
            .clone()
    }

    fn existing(&self, id: CameraId) -> Option<Arc<CameraEntry>> {
        self.entries.read().get(&id).cloned()
    }

    /// Attach a viewer to camera `id`, opening it if needed
    pub async fn attach(&self, id: CameraId) -> Result<ViewerLease, AttachError> {
        if self.is_shutting_down() {
            return Err(AttachError::ShuttingDown);
        }

        let entry = self.entry(id);
        let epoch = entry.attach(&self.backend, &self.config).await?;
        let lease = ViewerLease::new(entry, epoch);

        // Shutdown may have swept this entry before we got its guard
        if self.is_shutting_down() {
            lease.release().await;
            return Err(AttachError::ShuttingDown);
        }
        Ok(lease)
    }

    /// Force camera `id` closed regardless of viewers.
    ///
    /// Returns whether the camera was open. Attached sessions end; the next
    /// attach reopens the camera.
    pub async fn restart(&self, id: CameraId) -> bool {
        self.entry(id).restart().await
    }

    /// Snapshot of camera `id`. Unknown ids report as closed.
    pub fn status(&self, id: CameraId) -> CameraStatus {
        match self.existing(id) {
            Some(entry) => {
                let status = entry.status();
                CameraStatus {
                    camera: id,
                    state: status.state,
                    active: status.state == CameraState::Open,
                    viewers: status.viewers,
                    epoch: status.epoch,
                    frames_published: entry.cache().frames_published(),
                    frames_dropped: entry.cache().frames_dropped(),
                }
            }
            None => CameraStatus {
                camera: id,
                state: CameraState::Closed,
                active: false,
                viewers: 0,
                epoch: 0,
                frames_published: 0,
                frames_dropped: 0,
            },
        }
    }

    /// Probe ids `0..=max_index` and return the ones that can be opened.
    ///
    /// Open cameras count as available without being touched.
    pub async fn list_available(&self, max_index: u32) -> Vec<CameraId> {
        let entries: Vec<_> = (0..=max_index).map(|i| self.entry(CameraId(i))).collect();
        let probes = entries.iter().map(|entry| entry.probe(&self.backend));
        let results = futures::future::join_all(probes).await;

        entries
            .iter()
            .zip(results)
            .filter(|(_, available)| *available)
            .map(|(entry, _)| entry.id())
            .collect()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Refuse new viewers and close every open camera
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let entries: Vec<_> = self.entries.read().values().cloned().collect();
        let open = entries
            .iter()
            .filter(|e| e.status().state == CameraState::Open)
            .count();
        info!("Shutting down camera registry ({} open cameras)", open);

        futures::future::join_all(entries.iter().map(|entry| entry.close())).await;

        let still_open = entries
            .iter()
            .filter(|e| e.status().state == CameraState::Open)
            .count();
        if still_open > 0 {
            warn!("{} cameras still open after shutdown", still_open);
        }
    }
}

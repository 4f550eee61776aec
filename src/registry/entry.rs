//! Per-camera registry entry
//!
//! Every state transition of a camera (open, close, restart, fault) happens
//! under the entry's own async mutex, so transitions of one camera are
//! serialized while different cameras never contend.
//!
//! ```text
//!            attach (first viewer)
//!   Closed ──────────────────────────► Open
//!     ▲  ▲                              │ │
//!     │  └──── last detach / fault ─────┘ │
//!     │                                   │ restart
//!     └──────────── Restarting ◄──────────┘
//! ```

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::acquisition::{AcquisitionLoop, LoopExit};
use super::cache::FrameCache;
use super::config::RegistryConfig;
use super::error::AttachError;
use crate::camera::{CameraBackend, CameraId};

/// Lifecycle state of a camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraState {
    Closed,
    Open,
    Restarting,
}

impl std::fmt::Display for CameraState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraState::Closed => write!(f, "closed"),
            CameraState::Open => write!(f, "open"),
            CameraState::Restarting => write!(f, "restarting"),
        }
    }
}

/// Observable snapshot of an entry, published on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStatus {
    pub state: CameraState,
    /// Incremented on every `Closed → Open`
    pub epoch: u64,
    pub viewers: u32,
}

impl EntryStatus {
    /// Whether a viewer attached under `epoch` may keep streaming
    pub fn is_live(&self, epoch: u64) -> bool {
        self.state == CameraState::Open && self.epoch == epoch
    }
}

/// Mutable part of an entry, only touched with the guard held
struct EntryInner {
    state: CameraState,
    viewers: u32,
    epoch: u64,
    acquisition: Option<AcquisitionLoop>,
}

/// One camera's slot in the registry
pub struct CameraEntry {
    id: CameraId,
    cache: Arc<FrameCache>,
    guard: Mutex<EntryInner>,
    status: watch::Sender<EntryStatus>,
}

impl CameraEntry {
    pub fn new(id: CameraId, cache: FrameCache) -> Self {
        let initial = EntryStatus {
            state: CameraState::Closed,
            epoch: 0,
            viewers: 0,
        };
        let (status, _) = watch::channel(initial);
        Self {
            id,
            cache: Arc::new(cache),
            guard: Mutex::new(EntryInner {
                state: CameraState::Closed,
                viewers: 0,
                epoch: 0,
                acquisition: None,
            }),
            status,
        }
    }

    pub fn id(&self) -> CameraId {
        self.id
    }

    pub fn cache(&self) -> &Arc<FrameCache> {
        &self.cache
    }

    /// Last published status; never waits for the guard
    pub fn status(&self) -> EntryStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<EntryStatus> {
        self.status.subscribe()
    }

    fn publish(&self, inner: &EntryInner) {
        self.status.send_replace(EntryStatus {
            state: inner.state,
            epoch: inner.epoch,
            viewers: inner.viewers,
        });
    }

    /// Add a viewer, opening the camera if it is closed.
    ///
    /// Returns the epoch the viewer is attached under. Concurrent callers
    /// queue on the guard, so only the first one opens the device.
    pub async fn attach(
        self: &Arc<Self>,
        backend: &Arc<dyn CameraBackend>,
        config: &RegistryConfig,
    ) -> Result<u64, AttachError> {
        let mut inner = self.guard.lock().await;

        if inner.state == CameraState::Open {
            inner.viewers += 1;
            debug!(camera = %self.id, viewers = inner.viewers, "Viewer attached");
            self.publish(&inner);
            return Ok(inner.epoch);
        }

        let backend = backend.clone();
        let id = self.id;
        let handle = tokio::task::spawn_blocking(move || backend.open(id))
            .await
            .map_err(|e| AttachError::Internal(format!("open task failed: {}", e)))?
            .map_err(|e| {
                warn!(camera = %self.id, "Failed to open camera: {}", e);
                AttachError::from(e)
            })?;

        inner.epoch += 1;
        inner.viewers = 1;
        inner.state = CameraState::Open;

        let acquisition = AcquisitionLoop::spawn(handle, self.cache.clone(), config);
        self.supervise(inner.epoch, acquisition.exit_watch());
        inner.acquisition = Some(acquisition);

        info!(camera = %self.id, epoch = inner.epoch, "Camera opened");
        self.publish(&inner);
        Ok(inner.epoch)
    }

    /// Remove a viewer attached under `epoch`; the last one closes the camera.
    ///
    /// Detaches from an older epoch are ignored, as is a detach at zero viewers.
    pub async fn detach(&self, epoch: u64) {
        let mut inner = self.guard.lock().await;

        if inner.epoch != epoch {
            debug!(
                camera = %self.id,
                lease_epoch = epoch,
                epoch = inner.epoch,
                "Ignoring detach from a previous epoch"
            );
            return;
        }
        if inner.viewers == 0 {
            return;
        }

        inner.viewers -= 1;
        debug!(camera = %self.id, viewers = inner.viewers, "Viewer detached");

        if inner.viewers == 0 && inner.state == CameraState::Open {
            info!(camera = %self.id, "Last viewer left, closing camera");
            self.teardown(&mut inner).await;
        }
        self.publish(&inner);
    }

    /// Force the camera closed regardless of viewers.
    ///
    /// The viewer count is kept; attached sessions observe the state change
    /// and detach on their own. Returns whether the camera was open.
    pub async fn restart(&self) -> bool {
        let mut inner = self.guard.lock().await;
        let was_open = inner.state == CameraState::Open;

        inner.state = CameraState::Restarting;
        self.publish(&inner);

        if was_open {
            info!(camera = %self.id, viewers = inner.viewers, "Restarting camera");
            self.teardown(&mut inner).await;
        }

        inner.state = CameraState::Closed;
        self.publish(&inner);
        was_open
    }

    /// Close the camera after its acquisition loop faulted.
    /// No-op if the camera was reopened or closed meanwhile.
    pub async fn close_after_fault(&self, epoch: u64, reason: &str) {
        let mut inner = self.guard.lock().await;
        if inner.epoch != epoch || inner.state != CameraState::Open {
            return;
        }

        warn!(camera = %self.id, "Closing camera after fault: {}", reason);
        self.teardown(&mut inner).await;
        self.publish(&inner);
    }

    /// Close the camera if open, keeping the entry. Used at shutdown.
    pub async fn close(&self) {
        let mut inner = self.guard.lock().await;
        if inner.state == CameraState::Open {
            self.teardown(&mut inner).await;
            self.publish(&inner);
        }
    }

    /// Check whether the camera can be opened.
    ///
    /// An open camera counts as available and is left alone; a closed one is
    /// opened and immediately closed again.
    pub async fn probe(&self, backend: &Arc<dyn CameraBackend>) -> bool {
        let inner = self.guard.lock().await;
        if inner.state == CameraState::Open {
            return true;
        }

        let backend = backend.clone();
        let id = self.id;
        let probed = tokio::task::spawn_blocking(move || match backend.open(id) {
            Ok(mut handle) => {
                handle.close();
                true
            }
            Err(e) => {
                debug!(camera = %id, "Probe failed: {}", e);
                false
            }
        })
        .await;

        drop(inner);
        probed.unwrap_or(false)
    }

    /// Stop the loop, close the handle, empty the cache. Guard must be held.
    async fn teardown(&self, inner: &mut EntryInner) {
        if let Some(acquisition) = inner.acquisition.take() {
            if let Some(mut handle) = acquisition.stop().await {
                let closed = tokio::task::spawn_blocking(move || handle.close()).await;
                if let Err(e) = closed {
                    warn!(camera = %self.id, "Camera close task failed: {}", e);
                }
            }
        }
        self.cache.clear();
        inner.state = CameraState::Closed;
        info!(camera = %self.id, "Camera closed");
    }

    /// Watch the loop of `epoch` and close the camera if it faults
    fn supervise(self: &Arc<Self>, epoch: u64, mut exit: watch::Receiver<LoopExit>) {
        let entry = self.clone();
        tokio::spawn(async move {
            let reason = match exit.wait_for(|e| e.is_finished()).await {
                Ok(e) => match &*e {
                    LoopExit::Faulted(reason) => Some(reason.clone()),
                    _ => None,
                },
                // Sender dropped without a verdict: the loop panicked
                Err(_) => Some("acquisition loop panicked".to_string()),
            };
            if let Some(reason) = reason {
                entry.close_after_fault(epoch, &reason).await;
            }
        });
    }
}

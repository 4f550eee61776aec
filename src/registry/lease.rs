//! Viewer lease
//!
//! Proof that a viewer is attached to a camera. Releasing the lease detaches
//! the viewer; dropping it without releasing schedules the detach on the
//! runtime, so a panicking or aborted session still gives its slot back.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

use super::cache::FrameRecord;
use super::entry::{CameraEntry, EntryStatus};
use crate::camera::CameraId;

pub struct ViewerLease {
    entry: Arc<CameraEntry>,
    epoch: u64,
    status: watch::Receiver<EntryStatus>,
    released: bool,
}

impl ViewerLease {
    pub(super) fn new(entry: Arc<CameraEntry>, epoch: u64) -> Self {
        let status = entry.watch_status();
        Self {
            entry,
            epoch,
            status,
            released: false,
        }
    }

    pub fn camera(&self) -> CameraId {
        self.entry.id()
    }

    /// Open-epoch this lease was granted under
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn read_latest(&self) -> Option<Arc<FrameRecord>> {
        self.entry.cache().read_latest()
    }

    /// Camera still open under the epoch this lease was granted in
    pub fn is_live(&self) -> bool {
        self.status.borrow().is_live(self.epoch)
    }

    /// Resolves once the camera leaves the open state this lease belongs to
    pub async fn ended(&mut self) {
        let epoch = self.epoch;
        // An error means the entry is gone, which also ends the lease
        let _ = self.status.wait_for(|s| !s.is_live(epoch)).await;
    }

    /// Detach now and wait for the camera to be closed if this was the last viewer
    pub async fn release(mut self) {
        self.released = true;
        self.entry.detach(self.epoch).await;
    }
}

impl Drop for ViewerLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let entry = self.entry.clone();
        let epoch = self.epoch;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { entry.detach(epoch).await });
            }
            Err(_) => warn!(
                camera = %entry.id(),
                "Viewer lease dropped outside the runtime, detach skipped"
            ),
        }
    }
}

impl std::fmt::Debug for ViewerLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerLease")
            .field("camera", &self.entry.id())
            .field("epoch", &self.epoch)
            .field("released", &self.released)
            .finish()
    }
}

//! Per-viewer stream session
//!
//! ```text
//! Attaching ──► Streaming ──► Detaching ──► Closed
//! ```
//!
//! A session polls its camera's frame cache and forwards every record with
//! a new sequence number as one multipart part. It ends when the viewer goes
//! away, when the camera leaves the open state it attached to, or when no
//! first frame shows up in time. The lease is released on every one of
//! these paths.

use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::mjpeg::{create_mjpeg_part, ClientId, ViewerStats};
use crate::camera::CameraId;
use crate::registry::{AttachError, CameraRegistry, FrameRecord, ViewerLease};

/// Timing knobs of a session
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Delay between cache polls when no new frame is there
    pub poll_interval: Duration,
    /// How long to wait for the first frame before giving up
    pub first_frame_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            first_frame_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Attaching,
    Streaming,
    Detaching,
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    ViewerDisconnected,
    /// Restart, fault or shutdown closed the camera
    CameraClosed,
    NoFirstFrame,
}

impl std::fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEnd::ViewerDisconnected => write!(f, "viewer disconnected"),
            SessionEnd::CameraClosed => write!(f, "camera closed"),
            SessionEnd::NoFirstFrame => write!(f, "no first frame"),
        }
    }
}

/// Summary of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub client_id: ClientId,
    pub camera: CameraId,
    pub end: SessionEnd,
    pub frames_sent: u64,
    pub duration: Duration,
}

/// One viewer watching one camera
pub struct StreamSession {
    client_id: ClientId,
    lease: ViewerLease,
    settings: SessionSettings,
    stats: ViewerStats,
}

impl StreamSession {
    /// Attach to `camera`. Fails if the camera cannot be opened.
    pub async fn attach(
        registry: &CameraRegistry,
        camera: CameraId,
        client_id: ClientId,
        settings: SessionSettings,
    ) -> Result<Self, AttachError> {
        debug!(client_id = %client_id, camera = %camera, phase = ?SessionPhase::Attaching, "Session attaching");
        let lease = registry.attach(camera).await?;

        info!(
            client_id = %client_id,
            camera = %camera,
            epoch = lease.epoch(),
            phase = ?SessionPhase::Streaming,
            "Viewer connected"
        );
        Ok(Self {
            client_id,
            lease,
            settings,
            stats: ViewerStats::new(),
        })
    }

    /// Stream into `tx` until the session ends, then detach
    pub async fn run(mut self, tx: mpsc::Sender<Bytes>) -> SessionReport {
        let end = self.stream(&tx).await;
        drop(tx);

        let camera = self.lease.camera();
        debug!(client_id = %self.client_id, camera = %camera, phase = ?SessionPhase::Detaching, reason = %end, "Session detaching");
        let StreamSession {
            client_id,
            lease,
            stats,
            ..
        } = self;
        lease.release().await;

        let duration = stats.connected_duration();
        info!(
            client_id = %client_id,
            camera = %camera,
            reason = %end,
            phase = ?SessionPhase::Closed,
            "Viewer disconnected after {:.1}s ({} frames, {:.1} avg FPS, {} FPS last second)",
            duration.as_secs_f32(),
            stats.frames_sent,
            stats.average_fps(),
            stats.fps.current_fps()
        );

        SessionReport {
            client_id,
            camera,
            end,
            frames_sent: stats.frames_sent,
            duration,
        }
    }

    async fn stream(&mut self, tx: &mpsc::Sender<Bytes>) -> SessionEnd {
        let started = Instant::now();
        let poll_interval = self.settings.poll_interval;
        let first_frame_timeout = self.settings.first_frame_timeout;
        let mut last_seq: Option<u64> = None;

        loop {
            if !self.lease.is_live() {
                return SessionEnd::CameraClosed;
            }

            // Re-delivering the same record is skipped; a different one is always sent
            match self.lease.read_latest() {
                Some(record) if Some(record.sequence) != last_seq => {
                    let part = create_mjpeg_part(&record.data);
                    let len = part.len();
                    let sent = tokio::select! {
                        res = tx.send(part) => res.is_ok(),
                        _ = self.lease.ended() => return SessionEnd::CameraClosed,
                    };
                    if !sent {
                        return SessionEnd::ViewerDisconnected;
                    }
                    last_seq = Some(record.sequence);
                    self.stats.record_frame(len);
                }
                _ => {
                    if last_seq.is_none() && started.elapsed() >= first_frame_timeout {
                        return SessionEnd::NoFirstFrame;
                    }
                    tokio::select! {
                        _ = tx.closed() => return SessionEnd::ViewerDisconnected,
                        _ = self.lease.ended() => return SessionEnd::CameraClosed,
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }
    }
}

/// Wait up to `timeout` for a frame on `lease`. `None` on timeout or if the
/// camera closes first.
pub async fn wait_for_frame(
    lease: &mut ViewerLease,
    timeout: Duration,
    poll_interval: Duration,
) -> Option<Arc<FrameRecord>> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(record) = lease.read_latest() {
            return Some(record);
        }
        if !lease.is_live() || tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::select! {
            _ = lease.ended() => return None,
            _ = tokio::time::sleep_until(deadline.min(tokio::time::Instant::now() + poll_interval)) => {}
        }
    }
}

/// Attach to `camera`, grab one frame, detach
pub async fn capture_snapshot(
    registry: &CameraRegistry,
    camera: CameraId,
    settings: SessionSettings,
) -> Result<Option<Bytes>, AttachError> {
    let mut lease = registry.attach(camera).await?;
    let record = wait_for_frame(
        &mut lease,
        settings.first_frame_timeout,
        settings.poll_interval,
    )
    .await;
    lease.release().await;
    Ok(record.map(|r| r.data.clone()))
}

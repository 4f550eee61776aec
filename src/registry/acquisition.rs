//! Acquisition loop
//!
//! One loop per open camera, running on the blocking pool:
//! capture → encode → publish into the frame cache, until told to stop or
//! the camera faults. The loop owns the camera handle while it runs and
//! hands it back when joined.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::cache::FrameCache;
use super::config::RegistryConfig;
use crate::camera::{CameraHandle, CameraId};
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// How the loop is doing, observed by the registry's fault supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    Running,
    /// Stopped on request
    Stopped,
    /// Terminated by an unrecoverable capture error
    Faulted(String),
}

impl LoopExit {
    pub fn is_finished(&self) -> bool {
        !matches!(self, LoopExit::Running)
    }
}

/// Handle to a running acquisition loop
pub struct AcquisitionLoop {
    camera: CameraId,
    stop_flag: Arc<AtomicBool>,
    task: JoinHandle<Box<dyn CameraHandle>>,
    exit_rx: watch::Receiver<LoopExit>,
}

impl AcquisitionLoop {
    /// Start capturing from `handle` into `cache`
    pub fn spawn(
        handle: Box<dyn CameraHandle>,
        cache: Arc<FrameCache>,
        config: &RegistryConfig,
    ) -> Self {
        let camera = handle.id();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let (exit_tx, exit_rx) = watch::channel(LoopExit::Running);
        let timeout = config.capture_timeout;
        let throttler = LogThrottler::new(config.error_log_interval);

        info!("Starting acquisition on camera {}", camera);

        let flag = stop_flag.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut handle = handle;
            let exit = run(handle.as_mut(), &cache, &flag, timeout, &throttler);
            exit_tx.send_replace(exit);
            handle
        });

        Self {
            camera,
            stop_flag,
            task,
            exit_rx,
        }
    }

    /// Subscribe to loop termination
    pub fn exit_watch(&self) -> watch::Receiver<LoopExit> {
        self.exit_rx.clone()
    }

    /// Signal the loop and wait for it to finish.
    ///
    /// Returns at most one capture timeout after the call. The handle is
    /// returned unless the loop panicked, in which case it was already
    /// dropped (and closed) during unwinding.
    pub async fn stop(self) -> Option<Box<dyn CameraHandle>> {
        debug!("Stopping acquisition on camera {}", self.camera);
        self.stop_flag.store(true, Ordering::Release);

        match self.task.await {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Acquisition task for camera {} failed: {}", self.camera, e);
                None
            }
        }
    }
}

fn run(
    handle: &mut dyn CameraHandle,
    cache: &FrameCache,
    stop_flag: &AtomicBool,
    timeout: Duration,
    throttler: &LogThrottler,
) -> LoopExit {
    let camera = handle.id();

    loop {
        if stop_flag.load(Ordering::Acquire) {
            info!("Acquisition on camera {} stopped", camera);
            return LoopExit::Stopped;
        }

        match handle.capture_frame(timeout) {
            Ok(frame) => {
                // Nothing is published once a stop has been requested
                if stop_flag.load(Ordering::Acquire) {
                    continue;
                }
                throttler.clear("capture_miss");
                if let Err(e) = cache.write(&frame) {
                    warn_throttled!(
                        throttler,
                        "encode",
                        camera = %camera,
                        "Dropping frame, encode failed: {}",
                        e
                    );
                }
            }
            Err(e) if e.is_recoverable() => {
                warn_throttled!(throttler, "capture_miss", camera = %camera, "Capture miss: {}", e);
            }
            Err(e) => {
                error!(camera = %camera, "Camera fault: {}", e);
                return LoopExit::Faulted(e.to_string());
            }
        }
    }
}

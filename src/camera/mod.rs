//! Camera access
//!
//! A [`CameraBackend`] claims physical cameras and hands out [`CameraHandle`]s.
//! A handle is owned by exactly one acquisition loop at a time and is only
//! ever driven from a blocking thread.
//!
//! # Backends
//!
//! - [`V4l2Backend`] - `/dev/video{N}` devices through V4L2 mmap streaming
//! - [`TestPatternBackend`] - synthetic cameras for machines without hardware

pub mod pattern;
pub mod v4l2;

#[cfg(test)]
pub mod mock;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::video::frame::RawFrame;

pub use pattern::TestPatternBackend;
pub use v4l2::V4l2Backend;

/// Identifier of a physical camera (the `N` of `/dev/videoN`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub u32);

impl CameraId {
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Failure to claim a camera
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera {id} unavailable: {reason}")]
    DeviceUnavailable { id: CameraId, reason: String },
}

impl CameraError {
    pub fn unavailable(id: CameraId, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            id,
            reason: reason.into(),
        }
    }
}

/// Outcome of a capture attempt that produced no frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Capture timeout")]
    Timeout,

    #[error("Incomplete frame: {0}")]
    IncompleteFrame(String),

    #[error("Device fault: {0}")]
    DeviceFault(String),
}

impl CaptureError {
    /// Recoverable misses leave the camera open; a fault closes it
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CaptureError::DeviceFault(_))
    }
}

/// Opens cameras by id
pub trait CameraBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Claim the camera. Blocking; called from the blocking pool.
    fn open(&self, id: CameraId) -> Result<Box<dyn CameraHandle>, CameraError>;
}

/// One claimed camera
pub trait CameraHandle: Send {
    fn id(&self) -> CameraId;

    /// Wait up to `timeout` for the next frame
    fn capture_frame(&mut self, timeout: Duration) -> Result<RawFrame, CaptureError>;

    /// Release the device. Idempotent.
    fn close(&mut self);
}

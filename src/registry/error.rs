//! Registry error types

use thiserror::Error;

use crate::camera::CameraError;

/// Why a viewer could not be attached to a camera
#[derive(Error, Debug, Clone)]
pub enum AttachError {
    /// The camera could not be opened; the entry stays closed
    #[error(transparent)]
    Unavailable(#[from] CameraError),

    /// The registry is shutting down and refuses new viewers
    #[error("Camera registry is shutting down")]
    ShuttingDown,

    /// The blocking open task did not complete
    #[error("Internal error: {0}")]
    Internal(String),
}

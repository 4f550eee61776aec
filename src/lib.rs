//! camhub - share local cameras with many HTTP viewers
//!
//! Each camera is opened on the first viewer, captured by a single
//! acquisition loop into a latest-frame cache, and released when the
//! last viewer leaves. Viewers receive `multipart/x-mixed-replace`
//! MJPEG streams.

pub mod camera;
pub mod config;
pub mod error;
pub mod registry;
pub mod state;
pub mod stream;
pub mod utils;
pub mod video;
pub mod web;

pub use error::{AppError, Result};

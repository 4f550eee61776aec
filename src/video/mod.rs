//! Video frame types and encoding

pub mod format;
pub mod frame;
pub mod jpeg;

pub use format::{PixelFormat, Resolution};
pub use frame::RawFrame;
pub use jpeg::{EncodeError, FrameEncoder, JpegEncoder};

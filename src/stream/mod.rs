//! Video streaming module
//!
//! Turns frame caches into HTTP multipart MJPEG streams.
//!
//! # Components
//!
//! - `StreamSession` - per-viewer attach / poll / detach state machine
//! - `create_mjpeg_part` - multipart framing of one JPEG
//! - `ViewerStats` - per-viewer frame counters and FPS

pub mod mjpeg;
pub mod session;

pub use mjpeg::{create_mjpeg_part, resolve_client_id, ClientId, FpsCalculator, ViewerStats};
pub use session::{
    capture_snapshot, wait_for_frame, SessionEnd, SessionPhase, SessionReport, SessionSettings,
    StreamSession,
};

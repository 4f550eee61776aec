//! Camera registry
//!
//! Owns every camera the process has touched and shares each open camera
//! among all of its viewers.
//!
//! # Architecture
//!
//! ```text
//!                         Arc<CameraRegistry>
//!                    ┌──────────────────────────┐
//!                    │ entries: HashMap<Id,     │
//!                    │   CameraEntry {          │
//!                    │     guard: Mutex<state,  │
//!                    │       viewers, epoch,    │
//!                    │       AcquisitionLoop>,  │
//!                    │     cache: FrameCache,   │
//!                    │     status: watch::Tx,   │
//!                    │   }                      │
//!                    │ >                        │
//!                    └────────────┬─────────────┘
//!                                 │
//!        ┌────────────────────────┼────────────────────────┐
//!        ▼                        ▼                        ▼
//!  [AcquisitionLoop]        [ViewerLease]            [ViewerLease]
//!  capture → encode         read_latest()            read_latest()
//!        │                        │                        │
//!        └──► cache.write() ──────┴──► FrameRecord (Bytes) ┘
//! ```
//!
//! The camera is opened by the first attach and closed when the last lease
//! is released, when its loop faults, or on restart. A lease carries the
//! epoch it was granted in, so leases from before a restart cannot close
//! the camera again once it has been reopened for new viewers.

pub mod acquisition;
pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod lease;
pub mod store;

pub use acquisition::{AcquisitionLoop, LoopExit};
pub use cache::{FrameCache, FrameRecord};
pub use config::RegistryConfig;
pub use entry::{CameraEntry, CameraState, EntryStatus};
pub use error::AttachError;
pub use lease::ViewerLease;
pub use store::{CameraRegistry, CameraStatus};

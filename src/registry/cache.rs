//! Single-slot latest-frame cache
//!
//! One writer (the acquisition loop) replaces the slot; any number of
//! sessions read it without blocking. There is no queue and no history:
//! readers see whatever was written last and use the sequence number to
//! tell whether it changed.

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::camera::CameraId;
use crate::video::frame::RawFrame;
use crate::video::jpeg::{EncodeError, FrameEncoder};

/// One encoded, transport-ready frame
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// Strictly increasing per camera, never reused
    pub sequence: u64,
    /// JPEG bytes
    pub data: Bytes,
    /// When the raw frame was captured
    pub captured_at: Instant,
}

/// Latest-frame slot of one camera
pub struct FrameCache {
    /// Current record - ArcSwap for lock-free reads
    slot: ArcSwapOption<FrameRecord>,
    /// Last sequence handed out; survives `clear()`
    sequence: AtomicU64,
    encoder: Mutex<Box<dyn FrameEncoder>>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl FrameCache {
    pub fn new(camera: CameraId, encoder: Box<dyn FrameEncoder>) -> Self {
        debug!(camera = %camera, encoder = encoder.name(), "Frame cache created");
        Self {
            slot: ArcSwapOption::empty(),
            sequence: AtomicU64::new(0),
            encoder: Mutex::new(encoder),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Encode `frame` and make it the latest record.
    ///
    /// On encode failure nothing is published and the previous record stays
    /// visible. Returns the new sequence number.
    pub fn write(&self, frame: &RawFrame) -> Result<u64, EncodeError> {
        let data = match self.encoder.lock().encode(frame) {
            Ok(data) => data,
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        self.slot.store(Some(Arc::new(FrameRecord {
            sequence,
            data,
            captured_at: frame.captured_at,
        })));
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(sequence)
    }

    /// Latest record, if any. Never blocks.
    pub fn read_latest(&self) -> Option<Arc<FrameRecord>> {
        self.slot.load_full()
    }

    /// Empty the slot. Sequence numbers keep counting from where they were.
    pub fn clear(&self) {
        self.slot.store(None);
    }

    /// Frames successfully published since creation
    pub fn frames_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames dropped because encoding failed
    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

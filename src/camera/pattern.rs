//! Synthetic test-pattern cameras
//!
//! Each configured id behaves like a device node: it can be claimed by one
//! handle at a time and further opens fail as busy until it is closed.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{CameraBackend, CameraError, CameraHandle, CameraId, CaptureError};
use crate::video::format::{PixelFormat, Resolution};
use crate::video::frame::RawFrame;

/// Backend producing moving RGB gradients
pub struct TestPatternBackend {
    present: HashSet<CameraId>,
    claimed: Arc<Mutex<HashSet<CameraId>>>,
    resolution: Resolution,
    fps: u32,
}

impl TestPatternBackend {
    pub fn new(ids: impl IntoIterator<Item = CameraId>, resolution: Resolution, fps: u32) -> Self {
        Self {
            present: ids.into_iter().collect(),
            claimed: Arc::new(Mutex::new(HashSet::new())),
            resolution,
            fps: fps.max(1),
        }
    }
}

impl CameraBackend for TestPatternBackend {
    fn name(&self) -> &str {
        "test_pattern"
    }

    fn open(&self, id: CameraId) -> Result<Box<dyn CameraHandle>, CameraError> {
        if !self.present.contains(&id) {
            return Err(CameraError::unavailable(id, "no such device"));
        }
        if !self.claimed.lock().insert(id) {
            return Err(CameraError::unavailable(id, "device busy"));
        }

        info!("Test pattern camera {} opened at {}", id, self.resolution);
        Ok(Box::new(PatternHandle {
            id,
            claimed: Some(self.claimed.clone()),
            resolution: self.resolution,
            interval: Duration::from_secs(1) / self.fps,
            next_due: Instant::now(),
            sequence: 0,
        }))
    }
}

struct PatternHandle {
    id: CameraId,
    claimed: Option<Arc<Mutex<HashSet<CameraId>>>>,
    resolution: Resolution,
    interval: Duration,
    next_due: Instant,
    sequence: u64,
}

impl PatternHandle {
    fn render(&self) -> Vec<u8> {
        let width = self.resolution.width as usize;
        let height = self.resolution.height as usize;
        let shift = (self.sequence * 4) as usize;
        let tint = (self.id.index() as usize * 85) % 256;

        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                data.push(((x + shift) * 255 / width.max(1)) as u8);
                data.push((y * 255 / height.max(1)) as u8);
                data.push(tint as u8);
            }
        }
        data
    }
}

impl CameraHandle for PatternHandle {
    fn id(&self) -> CameraId {
        self.id
    }

    fn capture_frame(&mut self, timeout: Duration) -> Result<RawFrame, CaptureError> {
        if self.claimed.is_none() {
            return Err(CaptureError::DeviceFault("camera closed".to_string()));
        }

        let wait = self.next_due.saturating_duration_since(Instant::now());
        if wait > timeout {
            std::thread::sleep(timeout);
            return Err(CaptureError::Timeout);
        }
        std::thread::sleep(wait);

        self.next_due = Instant::now().max(self.next_due) + self.interval;
        self.sequence += 1;

        Ok(RawFrame::from_vec(
            self.render(),
            self.resolution,
            PixelFormat::Rgb24,
            self.resolution.width * 3,
            self.sequence,
        ))
    }

    fn close(&mut self) {
        if let Some(claimed) = self.claimed.take() {
            claimed.lock().remove(&self.id);
            debug!("Test pattern camera {} closed", self.id);
        }
    }
}

impl Drop for PatternHandle {
    fn drop(&mut self) {
        self.close();
    }
}

//! Scripted camera backend for tests

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::{CameraBackend, CameraError, CameraHandle, CameraId, CaptureError};
use crate::video::format::{PixelFormat, Resolution};
use crate::video::frame::RawFrame;
use crate::video::jpeg::{EncodeError, FrameEncoder};

/// How a mock camera answers `capture_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    /// A valid MJPEG frame every few milliseconds
    Streaming,
    /// Every capture times out
    Stall,
    /// The next capture reports a device fault
    Fault,
    /// The next capture panics, killing the acquisition loop
    Panic,
}

#[derive(Default)]
struct Shared {
    present: HashSet<CameraId>,
    claimed: HashSet<CameraId>,
    modes: HashMap<CameraId, MockMode>,
    opens: HashMap<CameraId, usize>,
    closes: HashMap<CameraId, usize>,
}

#[derive(Clone)]
pub struct MockBackend {
    shared: Arc<Mutex<Shared>>,
    open_delay: Duration,
    frame_interval: Duration,
}

impl MockBackend {
    pub fn new(ids: impl IntoIterator<Item = u32>) -> Self {
        let shared = Shared {
            present: ids.into_iter().map(CameraId).collect(),
            ..Default::default()
        };
        Self {
            shared: Arc::new(Mutex::new(shared)),
            open_delay: Duration::ZERO,
            frame_interval: Duration::from_millis(5),
        }
    }

    /// Make every open take `delay`, widening race windows
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn set_mode(&self, id: u32, mode: MockMode) {
        self.shared.lock().modes.insert(CameraId(id), mode);
    }

    /// Hold the device as if another process had it open
    pub fn claim_externally(&self, id: u32) {
        self.shared.lock().claimed.insert(CameraId(id));
    }

    pub fn opens(&self, id: u32) -> usize {
        self.shared.lock().opens.get(&CameraId(id)).copied().unwrap_or(0)
    }

    pub fn closes(&self, id: u32) -> usize {
        self.shared.lock().closes.get(&CameraId(id)).copied().unwrap_or(0)
    }

    pub fn is_claimed(&self, id: u32) -> bool {
        self.shared.lock().claimed.contains(&CameraId(id))
    }
}

impl CameraBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&self, id: CameraId) -> Result<Box<dyn CameraHandle>, CameraError> {
        if !self.open_delay.is_zero() {
            std::thread::sleep(self.open_delay);
        }

        let mut shared = self.shared.lock();
        if !shared.present.contains(&id) {
            return Err(CameraError::unavailable(id, "no such device"));
        }
        if !shared.claimed.insert(id) {
            return Err(CameraError::unavailable(id, "device busy"));
        }
        *shared.opens.entry(id).or_insert(0) += 1;

        Ok(Box::new(MockHandle {
            id,
            shared: self.shared.clone(),
            frame_interval: self.frame_interval,
            sequence: 0,
            open: true,
        }))
    }
}

struct MockHandle {
    id: CameraId,
    shared: Arc<Mutex<Shared>>,
    frame_interval: Duration,
    sequence: u64,
    open: bool,
}

impl CameraHandle for MockHandle {
    fn id(&self) -> CameraId {
        self.id
    }

    fn capture_frame(&mut self, timeout: Duration) -> Result<RawFrame, CaptureError> {
        let mode = self
            .shared
            .lock()
            .modes
            .get(&self.id)
            .copied()
            .unwrap_or(MockMode::Streaming);

        match mode {
            MockMode::Streaming => {
                std::thread::sleep(self.frame_interval.min(timeout));
                self.sequence += 1;
                Ok(mjpeg_frame(self.sequence))
            }
            MockMode::Stall => {
                std::thread::sleep(timeout);
                Err(CaptureError::Timeout)
            }
            MockMode::Fault => Err(CaptureError::DeviceFault("unplugged".to_string())),
            MockMode::Panic => panic!("driver crashed"),
        }
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let mut shared = self.shared.lock();
        shared.claimed.remove(&self.id);
        *shared.closes.entry(self.id).or_insert(0) += 1;
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// A minimal MJPEG frame that passes marker validation
pub fn mjpeg_frame(sequence: u64) -> RawFrame {
    let mut data = vec![0xFF, 0xD8];
    data.extend(std::iter::repeat((sequence % 251) as u8).take(200));
    data.extend([0xFF, 0xD9]);
    RawFrame::new(
        Bytes::from(data),
        Resolution::VGA,
        PixelFormat::Mjpeg,
        0,
        sequence,
    )
}

/// Encoder that fails whenever the shared switch is on
pub struct SwitchableEncoder {
    pub fail: Arc<std::sync::atomic::AtomicBool>,
}

impl FrameEncoder for SwitchableEncoder {
    fn name(&self) -> &str {
        "switchable"
    }

    fn encode(&mut self, frame: &RawFrame) -> Result<Bytes, EncodeError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(EncodeError::Compression("injected failure".to_string()));
        }
        Ok(frame.data_bytes())
    }
}

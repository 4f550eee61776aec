//! V4L2 camera backend
//!
//! Camera `N` is `/dev/videoN`. Frames are pulled from memory-mapped
//! buffers and copied out before the buffer is re-queued.

use bytes::Bytes;
use std::io;
use std::time::Duration;
use tracing::{debug, info};
use v4l::buffer::{Flags, Type};
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format};

use super::{CameraBackend, CameraError, CameraHandle, CameraId, CaptureError};
use crate::video::format::{PixelFormat, Resolution};
use crate::video::frame::RawFrame;

/// Default number of capture buffers (2 keeps latency low)
pub const DEFAULT_BUFFER_COUNT: u32 = 2;
/// Minimum valid frame size (bytes)
const MIN_FRAME_SIZE: usize = 128;

/// Requested capture parameters; the driver may adjust them
#[derive(Debug, Clone)]
pub struct V4l2Settings {
    pub resolution: Resolution,
    pub format: PixelFormat,
    /// Desired frame rate (0 = driver default)
    pub fps: u32,
    pub buffer_count: u32,
}

impl Default for V4l2Settings {
    fn default() -> Self {
        Self {
            resolution: Resolution::VGA,
            format: PixelFormat::Mjpeg,
            fps: 30,
            buffer_count: DEFAULT_BUFFER_COUNT,
        }
    }
}

/// Opens `/dev/video{N}` devices
pub struct V4l2Backend {
    settings: V4l2Settings,
}

impl V4l2Backend {
    pub fn new(settings: V4l2Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &V4l2Settings {
        &self.settings
    }
}

impl CameraBackend for V4l2Backend {
    fn name(&self) -> &str {
        "v4l2"
    }

    fn open(&self, id: CameraId) -> Result<Box<dyn CameraHandle>, CameraError> {
        let handle = V4l2Handle::open(id, &self.settings)?;
        Ok(Box::new(handle))
    }
}

/// An open V4L2 capture stream
pub struct V4l2Handle {
    id: CameraId,
    stream: Option<MmapStream<'static>>,
    device: Option<Device>,
    resolution: Resolution,
    format: PixelFormat,
    stride: u32,
    timeout: Option<Duration>,
}

impl V4l2Handle {
    fn open(id: CameraId, settings: &V4l2Settings) -> Result<Self, CameraError> {
        let unavailable = |what: &str, e: io::Error| {
            CameraError::unavailable(id, format!("{} /dev/video{}: {}", what, id, e))
        };

        let device = Device::new(id.index() as usize).map_err(|e| unavailable("open", e))?;

        let requested = Format::new(
            settings.resolution.width,
            settings.resolution.height,
            settings.format.to_fourcc(),
        );
        let actual = Capture::set_format(&device, &requested).map_err(|e| unavailable("set format on", e))?;

        let format = PixelFormat::from_fourcc(actual.fourcc).ok_or_else(|| {
            CameraError::unavailable(id, format!("unsupported pixel format {}", actual.fourcc))
        })?;

        if settings.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(settings.fps);
            // Not every driver supports frame intervals
            if let Err(e) = Capture::set_params(&device, &params) {
                debug!("Camera {}: failed to set {} fps: {}", id, settings.fps, e);
            }
        }

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, settings.buffer_count.max(1))
            .map_err(|e| unavailable("start streaming on", e))?;

        let resolution = Resolution::new(actual.width, actual.height);
        info!(
            "Camera {} opened: {} {} stride={}",
            id, resolution, format, actual.stride
        );

        Ok(Self {
            id,
            stream: Some(stream),
            device: Some(device),
            resolution,
            format,
            stride: actual.stride,
            timeout: None,
        })
    }
}

impl CameraHandle for V4l2Handle {
    fn id(&self) -> CameraId {
        self.id
    }

    fn capture_frame(&mut self, timeout: Duration) -> Result<RawFrame, CaptureError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CaptureError::DeviceFault("camera closed".to_string()))?;

        if self.timeout != Some(timeout) {
            stream.set_timeout(timeout);
            self.timeout = Some(timeout);
        }

        let (buf, meta) = CaptureStream::next(stream).map_err(classify_io_error)?;

        let bytes_used = (meta.bytesused as usize).min(buf.len());
        if meta.flags.contains(Flags::ERROR) {
            return Err(CaptureError::IncompleteFrame(format!(
                "buffer flagged as corrupt ({} bytes)",
                bytes_used
            )));
        }
        if bytes_used < MIN_FRAME_SIZE {
            return Err(CaptureError::IncompleteFrame(format!(
                "frame too small: {} bytes",
                bytes_used
            )));
        }

        Ok(RawFrame::new(
            Bytes::copy_from_slice(&buf[..bytes_used]),
            self.resolution,
            self.format,
            self.stride,
            meta.sequence as u64,
        ))
    }

    fn close(&mut self) {
        // Stream off before the device fd goes away
        if self.stream.take().is_some() {
            debug!("Camera {} stream stopped", self.id);
        }
        if self.device.take().is_some() {
            info!("Camera {} closed", self.id);
        }
    }
}

impl Drop for V4l2Handle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Map a dequeue error onto the capture taxonomy
fn classify_io_error(e: io::Error) -> CaptureError {
    if e.kind() == io::ErrorKind::TimedOut {
        return CaptureError::Timeout;
    }

    let is_device_lost = matches!(
        e.raw_os_error(),
        Some(6)     // ENXIO - No such device or address
            | Some(19)  // ENODEV - No such device
            | Some(5)   // EIO - I/O error (device removed)
            | Some(32)  // EPIPE - Broken pipe
            | Some(108) // ESHUTDOWN - Transport endpoint shutdown
    );
    if is_device_lost {
        return CaptureError::DeviceFault(e.to_string());
    }

    CaptureError::IncompleteFrame(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_io_error() {
        assert_eq!(
            classify_io_error(io::Error::new(io::ErrorKind::TimedOut, "VIDIOC_DQBUF")),
            CaptureError::Timeout
        );
        assert!(matches!(
            classify_io_error(io::Error::from_raw_os_error(19)),
            CaptureError::DeviceFault(_)
        ));
        assert!(matches!(
            classify_io_error(io::Error::from_raw_os_error(108)),
            CaptureError::DeviceFault(_)
        ));
        assert!(matches!(
            classify_io_error(io::Error::from_raw_os_error(22)),
            CaptureError::IncompleteFrame(_)
        ));
    }

    #[test]
    fn test_missing_device_is_unavailable() {
        let backend = V4l2Backend::new(V4l2Settings::default());
        match backend.open(CameraId(250)) {
            Err(CameraError::DeviceUnavailable { id, .. }) => assert_eq!(id, CameraId(250)),
            Ok(_) => panic!("/dev/video250 should not exist"),
        }
    }
}

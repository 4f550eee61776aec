//! JPEG encoding for captured frames
//!
//! MJPEG/JPEG input is validated and passed through untouched. Raw formats
//! are compressed with turbojpeg:
//! ```text
//! YUYV ──repack──> I420 ──turbojpeg (YUV)──> JPEG
//! RGB24/BGR24/GREY ──turbojpeg──> JPEG
//! ```

use bytes::Bytes;
use thiserror::Error;

use super::format::PixelFormat;
use super::frame::RawFrame;

/// Default JPEG quality
pub const DEFAULT_QUALITY: u32 = 80;

/// Errors produced while turning a raw frame into transport-ready bytes
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Invalid JPEG data")]
    InvalidJpeg,

    #[error("{format} data too small: {actual} < {expected}")]
    BufferTooSmall {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("Unsupported input format: {0}")]
    UnsupportedFormat(PixelFormat),

    #[error("JPEG compression failed: {0}")]
    Compression(String),
}

/// Encodes raw frames into the bytes carried by one multipart part
pub trait FrameEncoder: Send {
    fn name(&self) -> &str;

    fn encode(&mut self, frame: &RawFrame) -> Result<Bytes, EncodeError>;
}

/// Factory used by the registry to give every camera its own encoder
pub type EncoderFactory = std::sync::Arc<dyn Fn() -> Box<dyn FrameEncoder> + Send + Sync>;

/// JPEG encoder backed by turbojpeg
///
/// The compressor is created on first use, so cameras delivering MJPEG never
/// allocate one. Not thread-safe; the frame cache keeps it behind a mutex.
pub struct JpegEncoder {
    quality: u32,
    compressor: Option<turbojpeg::Compressor>,
    /// I420 buffer for YUV encoding (Y + U + V planes)
    i420_buffer: Vec<u8>,
}

impl JpegEncoder {
    pub fn new(quality: u32) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            compressor: None,
            i420_buffer: Vec::new(),
        }
    }

    pub fn quality(&self) -> u32 {
        self.quality
    }

    fn compressor(&mut self) -> Result<&mut turbojpeg::Compressor, EncodeError> {
        if self.compressor.is_none() {
            let mut compressor = turbojpeg::Compressor::new().map_err(|e| {
                EncodeError::Compression(format!("Failed to create turbojpeg compressor: {}", e))
            })?;
            compressor
                .set_quality(self.quality as i32)
                .map_err(|e| EncodeError::Compression(format!("Failed to set JPEG quality: {}", e)))?;
            self.compressor = Some(compressor);
        }
        self.compressor
            .as_mut()
            .ok_or_else(|| EncodeError::Compression("compressor unavailable".to_string()))
    }

    fn passthrough(&self, frame: &RawFrame) -> Result<Bytes, EncodeError> {
        if frame.is_valid_jpeg() {
            Ok(frame.data_bytes())
        } else {
            Err(EncodeError::InvalidJpeg)
        }
    }

    /// Encode YUYV (YUV422) frame to JPEG
    fn encode_yuyv(&mut self, frame: &RawFrame) -> Result<Bytes, EncodeError> {
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let stride = row_stride(frame);
        check_size(frame, stride * height)?;

        self.i420_buffer.resize(width * height * 3 / 2, 0);
        yuyv_to_i420(frame.data(), stride, width, height, &mut self.i420_buffer);

        let i420 = std::mem::take(&mut self.i420_buffer);
        let yuv_image = turbojpeg::YuvImage {
            pixels: i420.as_slice(),
            width,
            height,
            align: 1,
            subsamp: turbojpeg::Subsamp::Sub2x2,
        };
        let result = self
            .compressor()?
            .compress_yuv_to_vec(yuv_image)
            .map_err(|e| EncodeError::Compression(e.to_string()));
        self.i420_buffer = i420;

        result.map(Bytes::from)
    }

    /// Encode packed RGB24 / BGR24 / GREY frames
    fn encode_packed(&mut self, frame: &RawFrame) -> Result<Bytes, EncodeError> {
        let (format, subsamp) = match frame.format {
            PixelFormat::Rgb24 => (turbojpeg::PixelFormat::RGB, turbojpeg::Subsamp::Sub2x2),
            PixelFormat::Bgr24 => (turbojpeg::PixelFormat::BGR, turbojpeg::Subsamp::Sub2x2),
            PixelFormat::Grey => (turbojpeg::PixelFormat::GRAY, turbojpeg::Subsamp::Gray),
            other => return Err(EncodeError::UnsupportedFormat(other)),
        };
        let height = frame.height() as usize;
        let pitch = row_stride(frame);
        check_size(frame, pitch * height)?;

        let image = turbojpeg::Image {
            pixels: frame.data(),
            width: frame.width() as usize,
            pitch,
            height,
            format,
        };

        let compressor = self.compressor()?;
        compressor
            .set_subsamp(subsamp)
            .map_err(|e| EncodeError::Compression(e.to_string()))?;
        compressor
            .compress_to_vec(image)
            .map(Bytes::from)
            .map_err(|e| EncodeError::Compression(e.to_string()))
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}

impl FrameEncoder for JpegEncoder {
    fn name(&self) -> &str {
        "JPEG (turbojpeg)"
    }

    fn encode(&mut self, frame: &RawFrame) -> Result<Bytes, EncodeError> {
        match frame.format {
            PixelFormat::Mjpeg | PixelFormat::Jpeg => self.passthrough(frame),
            PixelFormat::Yuyv => self.encode_yuyv(frame),
            PixelFormat::Rgb24 | PixelFormat::Bgr24 | PixelFormat::Grey => {
                self.encode_packed(frame)
            }
        }
    }
}

/// Bytes per row: the driver's stride, or the packed width if it reports less
fn row_stride(frame: &RawFrame) -> usize {
    let bpp = frame.format.bytes_per_pixel().unwrap_or(1);
    let min = frame.width() as usize * bpp;
    (frame.stride as usize).max(min)
}

fn check_size(frame: &RawFrame, expected: usize) -> Result<(), EncodeError> {
    if frame.len() < expected {
        return Err(EncodeError::BufferTooSmall {
            format: frame.format,
            expected,
            actual: frame.len(),
        });
    }
    Ok(())
}

/// Repack YUYV 4:2:2 into planar I420
///
/// Chroma is taken from even rows only. `dst` must hold `width * height * 3 / 2`
/// bytes; odd widths/heights lose their last column/row of chroma.
pub fn yuyv_to_i420(src: &[u8], stride: usize, width: usize, height: usize, dst: &mut [u8]) {
    let chroma_w = width / 2;
    let chroma_h = height / 2;
    let (y_plane, uv) = dst.split_at_mut(width * height);
    let (u_plane, v_plane) = uv.split_at_mut(chroma_w * chroma_h);

    for row in 0..height {
        let line = &src[row * stride..row * stride + width * 2];
        let y_row = &mut y_plane[row * width..(row + 1) * width];
        for (x, y) in y_row.iter_mut().enumerate() {
            *y = line[x * 2];
        }

        if row % 2 == 0 && row / 2 < chroma_h {
            let c = row / 2 * chroma_w;
            for x in 0..chroma_w {
                u_plane[c + x] = line[x * 4 + 1];
                v_plane[c + x] = line[x * 4 + 3];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::format::Resolution;

    fn mjpeg_frame(len: usize) -> RawFrame {
        let mut data = vec![0x11; len];
        data[0] = 0xFF;
        data[1] = 0xD8;
        data[len - 2] = 0xFF;
        data[len - 1] = 0xD9;
        RawFrame::from_vec(data, Resolution::VGA, PixelFormat::Mjpeg, 0, 7)
    }

    #[test]
    fn test_mjpeg_passthrough_is_zero_copy() {
        let frame = mjpeg_frame(256);
        let mut encoder = JpegEncoder::default();
        let out = encoder.encode(&frame).unwrap();
        assert_eq!(out.as_ptr(), frame.data().as_ptr());
        assert!(encoder.compressor.is_none());
    }

    #[test]
    fn test_corrupt_mjpeg_rejected() {
        let mut frame = mjpeg_frame(256);
        frame = RawFrame::from_vec(
            frame.data()[2..].to_vec(),
            frame.resolution,
            frame.format,
            0,
            frame.sequence,
        );
        let mut encoder = JpegEncoder::default();
        assert!(matches!(encoder.encode(&frame), Err(EncodeError::InvalidJpeg)));
    }

    #[test]
    fn test_short_raw_buffer_rejected() {
        let frame = RawFrame::from_vec(vec![0; 100], Resolution::new(16, 16), PixelFormat::Rgb24, 0, 1);
        let mut encoder = JpegEncoder::default();
        match encoder.encode(&frame) {
            Err(EncodeError::BufferTooSmall { expected, actual, .. }) => {
                assert_eq!(expected, 16 * 16 * 3);
                assert_eq!(actual, 100);
            }
            other => panic!("unexpected result: {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_yuyv_repack() {
        // 4x2 image, one macro-pixel = Y0 U Y1 V
        let src = [
            10, 100, 11, 200, 12, 101, 13, 201, //
            20, 150, 21, 250, 22, 151, 23, 251,
        ];
        let mut dst = vec![0u8; 4 * 2 * 3 / 2];
        yuyv_to_i420(&src, 8, 4, 2, &mut dst);
        assert_eq!(&dst[..8], &[10, 11, 12, 13, 20, 21, 22, 23]);
        assert_eq!(&dst[8..10], &[100, 101]);
        assert_eq!(&dst[10..12], &[200, 201]);
    }

    #[test]
    fn test_quality_clamped() {
        assert_eq!(JpegEncoder::new(0).quality(), 1);
        assert_eq!(JpegEncoder::new(250).quality(), 100);
    }
}

//! Video frame data structures

use bytes::Bytes;
use std::time::Instant;

use super::format::{PixelFormat, Resolution};

/// Minimum size of a usable compressed frame
pub const MIN_JPEG_SIZE: usize = 125;

/// A raw frame as produced by a camera, before encoding
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame data (compressed or packed pixels)
    data: Bytes,
    /// Frame resolution
    pub resolution: Resolution,
    /// Pixel format
    pub format: PixelFormat,
    /// Stride (bytes per line, 0 for compressed formats)
    pub stride: u32,
    /// Sequence number reported by the driver
    pub sequence: u64,
    /// Timestamp when frame was captured
    pub captured_at: Instant,
}

impl RawFrame {
    /// Create a new raw frame
    pub fn new(
        data: Bytes,
        resolution: Resolution,
        format: PixelFormat,
        stride: u32,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            resolution,
            format,
            stride,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Create a frame from a Vec<u8>
    pub fn from_vec(
        data: Vec<u8>,
        resolution: Resolution,
        format: PixelFormat,
        stride: u32,
        sequence: u64,
    ) -> Self {
        Self::new(Bytes::from(data), resolution, format, stride, sequence)
    }

    /// Get frame data as bytes slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get frame data as Bytes (cheap clone)
    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    /// Check if format is JPEG/MJPEG
    pub fn is_jpeg(&self) -> bool {
        self.format.is_compressed()
    }

    /// Validate JPEG frame data
    pub fn is_valid_jpeg(&self) -> bool {
        self.is_jpeg() && is_valid_jpeg(&self.data)
    }
}

/// Check SOI/EOI markers of a JPEG buffer
///
/// Some UVC devices pad the buffer after the EOI marker, so `D9 00` and
/// `00 00` endings are accepted as well.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    if data.len() < MIN_JPEG_SIZE {
        return false;
    }
    let start_marker = ((data[0] as u16) << 8) | data[1] as u16;
    if start_marker != 0xFFD8 {
        return false;
    }
    let end = data.len();
    let end_marker = ((data[end - 2] as u16) << 8) | data[end - 1] as u16;
    matches!(end_marker, 0xFFD9 | 0xD900 | 0x0000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg_like(len: usize) -> Vec<u8> {
        let mut data = vec![0xAB; len];
        data[0] = 0xFF;
        data[1] = 0xD8;
        data[len - 2] = 0xFF;
        data[len - 1] = 0xD9;
        data
    }

    #[test]
    fn test_valid_jpeg_markers() {
        assert!(is_valid_jpeg(&jpeg_like(200)));

        let mut padded = jpeg_like(200);
        padded[198] = 0x00;
        padded[199] = 0x00;
        assert!(is_valid_jpeg(&padded));

        let mut no_soi = jpeg_like(200);
        no_soi[1] = 0x00;
        assert!(!is_valid_jpeg(&no_soi));

        assert!(!is_valid_jpeg(&jpeg_like(64)));
    }

    #[test]
    fn test_raw_frame_jpeg_check_respects_format() {
        let frame = RawFrame::from_vec(
            jpeg_like(200),
            Resolution::VGA,
            PixelFormat::Yuyv,
            1280,
            1,
        );
        assert!(!frame.is_valid_jpeg());

        let frame = RawFrame::from_vec(jpeg_like(200), Resolution::VGA, PixelFormat::Mjpeg, 0, 1);
        assert!(frame.is_valid_jpeg());
        assert_eq!(frame.len(), 200);
    }
}

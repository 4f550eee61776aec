//! MJPEG multipart framing and per-viewer statistics

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Multipart boundary token
pub const BOUNDARY: &str = "frame";

/// `Content-Type` of a stream response
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Client ID type (UUID string or caller-supplied)
pub type ClientId = String;

/// Maximum length of a caller-supplied client id
pub const MAX_CLIENT_ID_LEN: usize = 64;

/// Use the caller's id if it is 1-64 chars, otherwise generate one
pub fn resolve_client_id(requested: Option<String>) -> ClientId {
    requested
        .filter(|id| !id.is_empty() && id.len() <= MAX_CLIENT_ID_LEN)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Create MJPEG multipart frame bytes
pub fn create_mjpeg_part(jpeg_data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(128 + jpeg_data.len());

    buf.put_slice(b"--");
    buf.put_slice(BOUNDARY.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Content-Type: image/jpeg\r\n");
    buf.put_slice(format!("Content-Length: {}\r\n", jpeg_data.len()).as_bytes());
    buf.put_slice(b"\r\n");

    buf.put_slice(jpeg_data);
    buf.put_slice(b"\r\n");

    buf.freeze()
}

/// Rolling window FPS calculator
#[derive(Debug, Clone)]
pub struct FpsCalculator {
    /// Frame timestamps in last window
    frame_times: VecDeque<Instant>,
    window: Duration,
}

impl FpsCalculator {
    /// Create a new FPS calculator with 1-second window
    pub fn new() -> Self {
        Self {
            frame_times: VecDeque::with_capacity(120),
            window: Duration::from_secs(1),
        }
    }

    pub fn record_frame(&mut self) {
        self.record_frame_at(Instant::now());
    }

    fn record_frame_at(&mut self, now: Instant) {
        self.frame_times.push_back(now);
        while let Some(&oldest) = self.frame_times.front() {
            if now.duration_since(oldest) > self.window {
                self.frame_times.pop_front();
            } else {
                break;
            }
        }
    }

    /// Frames recorded in the last window
    pub fn current_fps(&self) -> u32 {
        self.frame_times.len() as u32
    }
}

impl Default for FpsCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics of one viewer connection
#[derive(Debug, Clone)]
pub struct ViewerStats {
    pub connected_at: Instant,
    /// Last frame sent
    pub last_activity: Instant,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub fps: FpsCalculator,
}

impl ViewerStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            connected_at: now,
            last_activity: now,
            frames_sent: 0,
            bytes_sent: 0,
            fps: FpsCalculator::new(),
        }
    }

    pub fn record_frame(&mut self, bytes: usize) {
        self.last_activity = Instant::now();
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
        self.fps.record_frame();
    }

    pub fn connected_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn average_fps(&self) -> f32 {
        let secs = self.connected_duration().as_secs_f32();
        if secs > 0.1 {
            self.frames_sent as f32 / secs
        } else {
            0.0
        }
    }
}

impl Default for ViewerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_layout() {
        let part = create_mjpeg_part(&[0xFF, 0xD8, 0xAA, 0xFF, 0xD9]);
        let header = b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 5\r\n\r\n";
        assert!(part.starts_with(header));
        assert_eq!(&part[header.len()..header.len() + 5], &[0xFF, 0xD8, 0xAA, 0xFF, 0xD9]);
        assert!(part.ends_with(b"\r\n"));
        assert_eq!(part.len(), header.len() + 5 + 2);
    }

    #[test]
    fn test_content_type_names_boundary() {
        assert!(STREAM_CONTENT_TYPE.ends_with(&format!("boundary={}", BOUNDARY)));
    }

    #[test]
    fn test_client_id_validation() {
        assert_eq!(resolve_client_id(Some("tab-1".into())), "tab-1");

        let generated = resolve_client_id(Some(String::new()));
        assert!(uuid::Uuid::parse_str(&generated).is_ok());

        let generated = resolve_client_id(Some("x".repeat(65)));
        assert_eq!(generated.len(), 36);
        assert_eq!(resolve_client_id(Some("x".repeat(64))).len(), 64);
    }

    #[test]
    fn test_fps_window() {
        let mut calc = FpsCalculator::new();
        assert_eq!(calc.current_fps(), 0);

        let start = Instant::now();
        for i in 0..10 {
            calc.record_frame_at(start + Duration::from_millis(i * 100));
        }
        assert_eq!(calc.current_fps(), 10);

        // Frames older than one second are evicted
        calc.record_frame_at(start + Duration::from_millis(1450));
        assert_eq!(calc.current_fps(), 6);
    }

    #[test]
    fn test_viewer_stats() {
        let mut stats = ViewerStats::new();
        stats.record_frame(100);
        stats.record_frame(50);
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.bytes_sent, 150);
        assert_eq!(stats.fps.current_fps(), 2);
    }
}

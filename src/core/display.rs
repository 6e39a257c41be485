use crate::core::stats::fps_since;
use crate::domain::model::Frame;
use crate::domain::ports::FrameSink;
use crate::utils::error::Result;
use chrono::{DateTime, Local};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Display-side counters for one window.
#[derive(Debug, Clone)]
pub struct DisplayTracker {
    window: String,
    display_count: u64,
    display_start: Option<Instant>,
    last_sequence: Option<u64>,
    latency_total_ms: f64,
}

/// What the display stage computed for a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayUpdate {
    pub display_fps: f64,
    pub latency_ms: f64,
    pub display_count: u64,
    pub overlay: Vec<String>,
}

impl DisplayTracker {
    pub fn new(window: impl Into<String>) -> Self {
        Self {
            window: window.into(),
            display_count: 0,
            display_start: None,
            last_sequence: None,
            latency_total_ms: 0.0,
        }
    }

    pub fn window(&self) -> &str {
        &self.window
    }

    /// Accounts for `frame` being shown at `now`. Returns `None` when the
    /// frame was already displayed.
    pub fn observe(
        &mut self,
        frame: &Frame,
        now: Instant,
        wall: DateTime<Local>,
    ) -> Option<DisplayUpdate> {
        if self.last_sequence == Some(frame.sequence) {
            return None;
        }
        self.last_sequence = Some(frame.sequence);
        self.display_count += 1;

        if self.display_count == 2 && self.display_start.is_none() {
            self.display_start = Some(now);
        }

        let display_fps = fps_since(self.display_count, self.display_start, now).unwrap_or(0.0);
        let latency_ms = now.saturating_duration_since(frame.captured_at).as_secs_f64() * 1000.0;
        self.latency_total_ms += latency_ms;

        let overlay = vec![
            format!("Display FPS: {:.2}", display_fps),
            format!("Latency: {:.1} ms", latency_ms),
            format!("{} Frame: {}", self.window, self.display_count),
            format!("Time: {}", wall.format("%H:%M:%S")),
        ];

        Some(DisplayUpdate {
            display_fps,
            latency_ms,
            display_count: self.display_count,
            overlay,
        })
    }

    pub fn display_count(&self) -> u64 {
        self.display_count
    }

    pub fn display_fps(&self, now: Instant) -> Option<f64> {
        fps_since(self.display_count, self.display_start, now)
    }

    pub fn mean_latency_ms(&self) -> Option<f64> {
        (self.display_count > 0).then(|| self.latency_total_ms / self.display_count as f64)
    }
}

pub struct NullSink;

impl FrameSink for NullSink {
    fn show(&mut self, _window: &str, _frame: &Frame, _overlay: &[String]) -> Result<()> {
        Ok(())
    }
}

/// Emits every overlay at debug level.
pub struct LogSink;

impl FrameSink for LogSink {
    fn show(&mut self, window: &str, frame: &Frame, overlay: &[String]) -> Result<()> {
        tracing::debug!(
            "🖼️ [{}] #{} {} | {}",
            window,
            frame.sequence,
            frame.size,
            overlay.join(" | ")
        );
        Ok(())
    }
}

/// Writes every `every`-th displayed frame of a window to `<dir>/<window>.ppm`.
pub struct SnapshotSink {
    dir: PathBuf,
    every: u64,
    shown: std::collections::HashMap<String, u64>,
}

impl SnapshotSink {
    pub fn new(dir: impl Into<PathBuf>, every: u64) -> Self {
        Self {
            dir: dir.into(),
            every: every.max(1),
            shown: std::collections::HashMap::new(),
        }
    }

    pub fn snapshot_path(&self, window: &str) -> PathBuf {
        self.dir.join(format!("{}.ppm", slugify(window)))
    }
}

impl FrameSink for SnapshotSink {
    fn show(&mut self, window: &str, frame: &Frame, overlay: &[String]) -> Result<()> {
        let count = self.shown.entry(window.to_string()).or_insert(0);
        *count += 1;
        if (*count - 1) % self.every != 0 {
            return Ok(());
        }

        std::fs::create_dir_all(&self.dir)?;
        let path = self.snapshot_path(window);
        write_ppm(&path, frame, overlay)?;
        tracing::debug!("📸 [{}] snapshot written to {}", window, path.display());
        Ok(())
    }
}

/// Fans a frame out to several sinks.
pub struct SinkChain(pub Vec<Box<dyn FrameSink>>);

impl FrameSink for SinkChain {
    fn show(&mut self, window: &str, frame: &Frame, overlay: &[String]) -> Result<()> {
        for sink in &mut self.0 {
            sink.show(window, frame, overlay)?;
        }
        Ok(())
    }
}

/// Binary PPM (P6). The overlay lines go into header comments; pixels are
/// converted from BGR to RGB.
fn write_ppm(path: &Path, frame: &Frame, overlay: &[String]) -> Result<()> {
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(out, "P6")?;
    for line in overlay {
        writeln!(out, "# {}", line)?;
    }
    writeln!(out, "{} {}", frame.size.width, frame.size.height)?;
    writeln!(out, "255")?;

    let mut rgb = Vec::with_capacity(frame.data.len());
    for px in frame.data.chunks_exact(3) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    out.write_all(&rgb)?;
    out.flush()?;
    Ok(())
}

fn slugify(window: &str) -> String {
    let slug: String = window
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    slug.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::FrameSize;
    use chrono::TimeZone;
    use std::time::Duration;

    fn frame(sequence: u64, captured_at: Instant) -> Frame {
        let size = FrameSize::new(2, 1);
        let mut f = Frame::new(vec![1, 2, 3, 4, 5, 6], size, sequence);
        f.captured_at = captured_at;
        f
    }

    #[test]
    fn test_repeated_frame_is_not_counted() {
        let mut tracker = DisplayTracker::new("Stream 1");
        let t0 = Instant::now();
        let wall = Local::now();
        let f = frame(1, t0);

        assert!(tracker.observe(&f, t0, wall).is_some());
        assert!(tracker.observe(&f, t0 + Duration::from_millis(10), wall).is_none());
        assert_eq!(tracker.display_count(), 1);
    }

    #[test]
    fn test_overlay_lines() {
        let mut tracker = DisplayTracker::new("Stream 2");
        let t0 = Instant::now();
        let wall = Local.with_ymd_and_hms(2025, 2, 19, 14, 3, 7).unwrap();

        tracker.observe(&frame(1, t0), t0, wall).unwrap();
        let second = t0 + Duration::from_millis(100);
        tracker.observe(&frame(2, second), second, wall).unwrap();
        let third = second + Duration::from_millis(500);
        let update = tracker
            .observe(&frame(3, third - Duration::from_millis(40)), third, wall)
            .unwrap();

        assert_eq!(update.overlay[0], "Display FPS: 4.00");
        assert_eq!(update.overlay[1], "Latency: 40.0 ms");
        assert_eq!(update.overlay[2], "Stream 2 Frame: 3");
        assert_eq!(update.overlay[3], "Time: 14:03:07");
        assert!(tracker.mean_latency_ms().unwrap() > 13.0);
    }

    #[test]
    fn test_snapshot_sink_writes_rgb_ppm() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut sink = SnapshotSink::new(dir.path(), 2);
        let f = frame(1, Instant::now());

        sink.show("Stream 1", &f, &["Display FPS: 0.00".to_string()]).unwrap();
        let path = sink.snapshot_path("Stream 1");
        assert!(path.ends_with("stream_1.ppm"));

        let bytes = std::fs::read(&path).unwrap();
        let header = b"P6\n# Display FPS: 0.00\n2 1\n255\n";
        assert!(bytes.starts_with(header));
        assert_eq!(&bytes[header.len()..], &[3, 2, 1, 6, 5, 4]);

        // Second frame is skipped with every = 2.
        std::fs::remove_file(&path).unwrap();
        sink.show("Stream 1", &frame(2, Instant::now()), &[]).unwrap();
        assert!(!path.exists());
    }
}

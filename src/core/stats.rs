use crate::domain::model::ReadStats;
use std::sync::Mutex;
use std::time::Instant;

/// Frames per second over `frames - 1` intervals since `start`.
///
/// The first frame only marks the clock, so FPS needs at least two frames.
pub fn fps_since(frames: u64, start: Option<Instant>, now: Instant) -> Option<f64> {
    let start = start?;
    let elapsed = now.saturating_duration_since(start).as_secs_f64();
    if elapsed > 0.0 {
        Some(frames.saturating_sub(1) as f64 / elapsed)
    } else {
        Some(0.0)
    }
}

#[derive(Debug, Default)]
struct ReadCounterInner {
    frame_count: u64,
    read_start: Option<Instant>,
}

/// Counts decoded frames for one source. Shared between the reader task and
/// the capture loop.
#[derive(Debug, Default)]
pub struct ReadCounter {
    inner: Mutex<ReadCounterInner>,
}

impl ReadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a decoded frame and returns its sequence number.
    pub fn record(&self, now: Instant) -> u64 {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.frame_count += 1;
        // Measurement starts at the second frame: the first one includes
        // connection and decoder warm-up time.
        if inner.frame_count == 2 && inner.read_start.is_none() {
            inner.read_start = Some(now);
        }
        inner.frame_count
    }

    pub fn snapshot(&self, now: Instant) -> ReadStats {
        let inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        ReadStats {
            frame_count: inner.frame_count,
            read_fps: fps_since(inner.frame_count, inner.read_start, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_single_frame_has_no_fps() {
        let counter = ReadCounter::new();
        let t0 = Instant::now();
        counter.record(t0);
        let stats = counter.snapshot(t0 + Duration::from_secs(1));
        assert_eq!(stats.frame_count, 1);
        assert!(stats.read_fps.is_none());
    }

    #[test]
    fn test_fps_counts_intervals_after_second_frame() {
        let counter = ReadCounter::new();
        let t0 = Instant::now();
        counter.record(t0);
        let start = t0 + Duration::from_millis(500);
        counter.record(start);
        for i in 1..=10 {
            counter.record(start + Duration::from_millis(100 * i));
        }
        let stats = counter.snapshot(start + Duration::from_secs(1));
        assert_eq!(stats.frame_count, 12);
        let fps = stats.read_fps.unwrap();
        assert!((fps - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_elapsed_is_zero_fps() {
        let now = Instant::now();
        assert_eq!(fps_since(5, Some(now), now), Some(0.0));
        assert_eq!(fps_since(5, None, now), None);
    }
}

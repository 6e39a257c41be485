use crate::core::settings::CaptureSettings;
use crate::core::stats::ReadCounter;
use crate::domain::model::{CameraSpec, ConnectPolicy, Frame, FrameSize, ReadStats};
use crate::domain::ports::FrameSource;
use crate::utils::error::{MulticamError, Result};
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// In-process test pattern camera running at a fixed frame rate.
///
/// Frames are produced on a fixed clock starting at connect time. When the
/// consumer falls behind, the skipped frames are still counted as read and
/// only the newest one is returned, like the process-backed sources do.
pub struct SyntheticSource {
    camera: CameraSpec,
    frame_size: FrameSize,
    policy: ConnectPolicy,
    interval: Duration,
    fail_connects: u32,
    frame_limit: Option<u64>,
    counter: ReadCounter,
    started: Option<Instant>,
    produced: u64,
    latest: Option<Frame>,
}

impl SyntheticSource {
    pub fn new(camera: CameraSpec, settings: &CaptureSettings) -> Self {
        Self {
            camera,
            frame_size: settings.frame_size,
            policy: settings.connect_policy,
            interval: Duration::from_secs_f64(1.0 / f64::from(settings.synthetic_fps.max(1))),
            fail_connects: 0,
            frame_limit: None,
            counter: ReadCounter::new(),
            started: None,
            produced: 0,
            latest: None,
        }
    }

    /// The first `n` connect attempts fail.
    pub fn with_failed_connects(mut self, n: u32) -> Self {
        self.fail_connects = n;
        self
    }

    /// The stream ends after `n` frames.
    pub fn with_frame_limit(mut self, n: u64) -> Self {
        self.frame_limit = Some(n);
        self
    }

    fn render(&self, sequence: u64) -> Frame {
        let FrameSize { width, height } = self.frame_size;
        let shift = (sequence % 256) as u32;
        let mut data = Vec::with_capacity(self.frame_size.frame_len());
        for y in 0..height {
            for x in 0..width {
                data.push(((x + shift) % 256) as u8);
                data.push(((y + shift) % 256) as u8);
                data.push(shift as u8);
            }
        }
        Frame::new(data, self.frame_size, sequence)
    }

    fn limit_reached(&self) -> bool {
        self.frame_limit.is_some_and(|limit| self.produced >= limit)
    }

    /// Frames due by `now`, capped at the frame limit.
    fn due_frames(&self, started: Instant, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(started).as_secs_f64();
        let due = (elapsed / self.interval.as_secs_f64()).floor() as u64 + 1;
        self.frame_limit.map_or(due, |limit| due.min(limit))
    }

    fn advance_to(&mut self, due: u64) -> Frame {
        let now = Instant::now();
        while self.produced < due {
            self.produced = self.counter.record(now);
        }
        let frame = self.render(self.produced);
        self.latest = Some(frame.clone());
        frame
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.camera.name
    }

    fn url(&self) -> &str {
        &self.camera.url
    }

    async fn connect(&mut self) -> Result<()> {
        for attempt in 1..=self.policy.attempts {
            if self.fail_connects > 0 {
                self.fail_connects -= 1;
                tracing::warn!(
                    "[{}] Failed to read frame. Retrying... Try {}!",
                    self.camera.name,
                    attempt
                );
                tokio::time::sleep(self.policy.interval).await;
                continue;
            }

            let now = Instant::now();
            self.started = Some(now);
            self.advance_to(1);
            tracing::info!("✅ [{}] Connected via synthetic ({})", self.camera.name, self.frame_size);
            return Ok(());
        }

        tracing::error!("[{}] Connection failed.", self.camera.name);
        Err(MulticamError::ConnectionError {
            camera: self.camera.name.clone(),
            attempts: self.policy.attempts,
        })
    }

    async fn grab_frame(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        let started = self.started.ok_or_else(|| MulticamError::NotConnected {
            camera: self.camera.name.clone(),
        })?;

        if self.limit_reached() {
            return Err(MulticamError::StreamEnded {
                camera: self.camera.name.clone(),
            });
        }

        let now = Instant::now();
        let due = self.due_frames(started, now);
        if due > self.produced {
            return Ok(Some(self.advance_to(due)));
        }

        let next_at = started + self.interval.mul_f64(self.produced as f64);
        let wait = next_at.saturating_duration_since(now);
        if wait > timeout {
            tokio::time::sleep(timeout).await;
            tracing::warn!("[{}] grab_frame timeout.", self.camera.name);
            return Ok(None);
        }

        tokio::time::sleep(wait).await;
        let due = self.due_frames(started, Instant::now()).max(self.produced + 1);
        Ok(Some(self.advance_to(due)))
    }

    fn latest_frame(&self) -> Option<Frame> {
        self.latest.clone()
    }

    fn read_stats(&self) -> ReadStats {
        self.counter.snapshot(Instant::now())
    }

    async fn release(&mut self) {
        self.started = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(fps: u32) -> CaptureSettings {
        let mut settings = CaptureSettings::default();
        settings.frame_size = FrameSize::new(4, 2);
        settings.synthetic_fps = fps;
        settings.connect_policy = ConnectPolicy {
            attempts: 3,
            interval: Duration::from_millis(1),
            first_frame_timeout: Duration::from_millis(10),
        };
        settings
    }

    fn source(fps: u32) -> SyntheticSource {
        SyntheticSource::new(CameraSpec::new("Stream 1", "synthetic://a"), &settings(fps))
    }

    #[tokio::test]
    async fn test_grab_before_connect_fails() {
        let mut src = source(100);
        let err = src.grab_frame(Duration::from_millis(5)).await.unwrap_err();
        assert!(matches!(err, MulticamError::NotConnected { .. }));
    }

    #[tokio::test]
    async fn test_connect_retries_then_succeeds() {
        let mut src = source(100).with_failed_connects(2);
        src.connect().await.unwrap();
        assert_eq!(src.read_stats().frame_count, 1);
        assert_eq!(src.latest_frame().unwrap().data.len(), 24);
    }

    #[tokio::test]
    async fn test_connect_gives_up() {
        let mut src = source(100).with_failed_connects(5);
        let err = src.connect().await.unwrap_err();
        assert!(matches!(err, MulticamError::ConnectionError { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_frames_are_strictly_increasing() {
        let mut src = source(200);
        src.connect().await.unwrap();
        let mut last = 1;
        for _ in 0..5 {
            let frame = src.grab_frame(Duration::from_secs(1)).await.unwrap().unwrap();
            assert!(frame.sequence > last);
            last = frame.sequence;
        }
        assert!(src.read_stats().read_fps.is_some());
    }

    #[tokio::test]
    async fn test_short_timeout_returns_none() {
        let mut src = source(1);
        src.connect().await.unwrap();
        let grabbed = src.grab_frame(Duration::from_millis(10)).await.unwrap();
        assert!(grabbed.is_none());
    }

    #[tokio::test]
    async fn test_stream_ends_at_limit() {
        let mut src = source(500).with_frame_limit(3);
        src.connect().await.unwrap();
        let mut grabbed = 0;
        loop {
            match src.grab_frame(Duration::from_secs(1)).await {
                Ok(Some(_)) => grabbed += 1,
                Ok(None) => continue,
                Err(e) => {
                    assert!(matches!(e, MulticamError::StreamEnded { .. }));
                    break;
                }
            }
        }
        assert!(grabbed >= 1);
        assert_eq!(src.read_stats().frame_count, 3);
    }
}

use crate::core::settings::CaptureSettings;
use crate::core::stats::ReadCounter;
use crate::domain::model::{CameraSpec, ConnectPolicy, Frame, FrameSize, ReadStats, StreamType};
use crate::domain::ports::FrameSource;
use crate::utils::error::{MulticamError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Splits a byte stream of packed raw frames into fixed-size frames.
pub struct RawFrameReader<R> {
    inner: R,
    frame_len: usize,
}

impl<R: AsyncRead + Unpin> RawFrameReader<R> {
    pub fn new(inner: R, frame_len: usize) -> Self {
        Self { inner, frame_len }
    }

    /// Reads one whole frame. `Ok(None)` on a clean end of stream.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.frame_len];
        let mut filled = 0;
        while filled < self.frame_len {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(MulticamError::IncompleteFrame {
                    expected: self.frame_len,
                    received: filled,
                });
            }
            filled += n;
        }
        Ok(Some(buf))
    }
}

/// Builds the command line for an external decoder that writes raw BGR24
/// frames of a fixed size to its stdout.
pub trait BackendCommand: Send + Sync + 'static {
    fn kind(&self) -> StreamType;
    fn program(&self) -> &str;
    fn args(&self, url: &str) -> Vec<String>;
}

struct RunningProcess {
    child: Child,
    reader: JoinHandle<()>,
    stderr: Option<JoinHandle<()>>,
}

/// A [`FrameSource`] backed by an external decoder process.
pub struct ProcessSource<B: BackendCommand> {
    camera: CameraSpec,
    backend: B,
    frame_size: FrameSize,
    policy: ConnectPolicy,
    counter: Arc<ReadCounter>,
    process: Option<RunningProcess>,
    frames: Option<watch::Receiver<Option<Frame>>>,
    last_grabbed: u64,
}

impl<B: BackendCommand> ProcessSource<B> {
    pub fn new(camera: CameraSpec, backend: B, settings: &CaptureSettings) -> Self {
        Self {
            camera,
            backend,
            frame_size: settings.frame_size,
            policy: settings.connect_policy,
            counter: Arc::new(ReadCounter::new()),
            process: None,
            frames: None,
            last_grabbed: 0,
        }
    }

    fn spawn(&mut self) -> Result<()> {
        let args = self.backend.args(&self.camera.url);
        tracing::debug!(
            "[{}] Spawning {} {}",
            self.camera.name,
            self.backend.program(),
            crate::utils::redact::redact_url(&args.join(" "))
        );

        let mut child = Command::new(self.backend.program())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MulticamError::BackendSpawnError {
                backend: self.backend.program().to_string(),
                camera: self.camera.name.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MulticamError::ProcessingError {
                message: format!("[{}] decoder stdout was not captured", self.camera.name),
            })?;

        let stderr = child.stderr.take().map(|stderr| {
            let name = self.camera.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("[{}] decoder: {}", name, line);
                }
            })
        });

        let (tx, rx) = watch::channel(None);
        let reader = tokio::spawn(pump_frames(
            self.camera.name.clone(),
            RawFrameReader::new(stdout, self.frame_size.frame_len()),
            self.frame_size,
            Arc::clone(&self.counter),
            tx,
        ));

        self.process = Some(RunningProcess {
            child,
            reader,
            stderr,
        });
        self.frames = Some(rx);
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Some(mut process) = self.process.take() {
            if let Err(e) = process.child.kill().await {
                tracing::debug!("[{}] kill failed: {}", self.camera.name, e);
            }
            process.reader.abort();
            if let Some(stderr) = process.stderr {
                stderr.abort();
            }
        }
    }
}

async fn pump_frames<R: AsyncRead + Unpin>(
    name: String,
    mut reader: RawFrameReader<R>,
    size: FrameSize,
    counter: Arc<ReadCounter>,
    tx: watch::Sender<Option<Frame>>,
) {
    loop {
        match reader.read_frame().await {
            Ok(Some(data)) => {
                let sequence = counter.record(Instant::now());
                tx.send_replace(Some(Frame::new(data, size, sequence)));
            }
            Ok(None) => {
                tracing::info!("[{}] End-Of-Stream", name);
                break;
            }
            Err(e) => {
                tracing::warn!("[{}] Error: {}", name, e);
                break;
            }
        }
    }
}

/// Waits until `rx` holds a frame with a sequence above `after`.
pub(crate) async fn wait_for_frame(
    rx: &mut watch::Receiver<Option<Frame>>,
    after: u64,
    timeout: Duration,
) -> std::result::Result<Option<Frame>, watch::error::RecvError> {
    let wait = rx.wait_for(|frame| frame.as_ref().is_some_and(|f| f.sequence > after));
    match tokio::time::timeout(timeout, wait).await {
        Ok(Ok(frame)) => Ok(frame.clone()),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(None),
    }
}

#[async_trait]
impl<B: BackendCommand> FrameSource for ProcessSource<B> {
    fn name(&self) -> &str {
        &self.camera.name
    }

    fn url(&self) -> &str {
        &self.camera.url
    }

    async fn connect(&mut self) -> Result<()> {
        for attempt in 1..=self.policy.attempts {
            self.shutdown().await;
            // A missing binary will not appear between attempts.
            self.spawn()?;

            let first = match self.frames.as_mut() {
                Some(rx) => wait_for_frame(rx, 0, self.policy.first_frame_timeout)
                    .await
                    .ok()
                    .flatten(),
                None => None,
            };

            if let Some(frame) = first {
                self.last_grabbed = frame.sequence;
                tracing::info!(
                    "✅ [{}] Connected via {} ({})",
                    self.camera.name,
                    self.backend.kind(),
                    self.frame_size
                );
                return Ok(());
            }

            tracing::warn!(
                "[{}] Failed to read frame. Retrying... Try {}!",
                self.camera.name,
                attempt
            );
            self.shutdown().await;
            self.frames = None;
            tokio::time::sleep(self.policy.interval).await;
        }

        tracing::error!("[{}] Connection failed.", self.camera.name);
        Err(MulticamError::ConnectionError {
            camera: self.camera.name.clone(),
            attempts: self.policy.attempts,
        })
    }

    async fn grab_frame(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        let rx = self.frames.as_mut().ok_or_else(|| MulticamError::NotConnected {
            camera: self.camera.name.clone(),
        })?;

        match wait_for_frame(rx, self.last_grabbed, timeout).await {
            Ok(Some(frame)) => {
                self.last_grabbed = frame.sequence;
                Ok(Some(frame))
            }
            Ok(None) => {
                tracing::warn!("[{}] grab_frame timeout.", self.camera.name);
                Ok(None)
            }
            Err(_) => Err(MulticamError::StreamEnded {
                camera: self.camera.name.clone(),
            }),
        }
    }

    fn latest_frame(&self) -> Option<Frame> {
        self.frames.as_ref().and_then(|rx| rx.borrow().clone())
    }

    fn read_stats(&self) -> ReadStats {
        self.counter.snapshot(Instant::now())
    }

    async fn release(&mut self) {
        self.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    /// Runs a shell script in place of a decoder.
    struct ScriptBackend {
        program: &'static str,
        script: String,
    }

    impl ScriptBackend {
        fn sh(script: impl Into<String>) -> Self {
            Self {
                program: "sh",
                script: script.into(),
            }
        }
    }

    impl BackendCommand for ScriptBackend {
        fn kind(&self) -> StreamType {
            StreamType::Ffmpeg
        }

        fn program(&self) -> &str {
            self.program
        }

        fn args(&self, _url: &str) -> Vec<String> {
            vec!["-c".to_string(), self.script.clone()]
        }
    }

    /// 2x1 BGR frames, i.e. 6 bytes each.
    fn script_source(backend: ScriptBackend, attempts: u32) -> ProcessSource<ScriptBackend> {
        let mut settings = CaptureSettings::default();
        settings.frame_size = FrameSize::new(2, 1);
        settings.connect_policy = ConnectPolicy {
            attempts,
            interval: Duration::from_millis(10),
            first_frame_timeout: Duration::from_millis(300),
        };
        ProcessSource::new(CameraSpec::new("Stream 1", "rtsp://cam/101"), backend, &settings)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_exit_ends_stream() {
        let mut source = script_source(ScriptBackend::sh("head -c 30 /dev/zero"), 1);
        source.connect().await.unwrap();

        let mut ended = false;
        for _ in 0..10 {
            match source.grab_frame(Duration::from_millis(500)).await {
                Ok(_) => continue,
                Err(e) => {
                    assert!(matches!(e, MulticamError::StreamEnded { .. }));
                    ended = true;
                    break;
                }
            }
        }
        assert!(ended);
        assert_eq!(source.read_stats().frame_count, 5);
        assert!(source.latest_frame().is_some());

        source.release().await;
        source.release().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_grab_timeout_returns_none() {
        let mut source = script_source(ScriptBackend::sh("head -c 6 /dev/zero; exec sleep 5"), 1);
        source.connect().await.unwrap();

        let grabbed = source.grab_frame(Duration::from_millis(50)).await.unwrap();
        assert!(grabbed.is_none());
        assert_eq!(source.read_stats().frame_count, 1);
        source.release().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connect_retries_until_attempts_exhausted() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = dir.path().join("spawns.log");
        let script = format!("echo spawn >> '{}'; exec sleep 5", log.display());
        let mut source = script_source(ScriptBackend::sh(script), 3);

        let err = source.connect().await.unwrap_err();
        assert!(matches!(err, MulticamError::ConnectionError { attempts: 3, .. }));
        assert!(err.is_retryable());

        let spawns = std::fs::read_to_string(&log).unwrap();
        assert_eq!(spawns.lines().count(), 3);

        let not_connected = source.grab_frame(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(not_connected, MulticamError::NotConnected { .. }));
        source.release().await;
    }

    #[tokio::test]
    async fn test_missing_decoder_fails_without_retry() {
        let backend = ScriptBackend {
            program: "/nonexistent/decoder",
            script: String::new(),
        };
        let mut source = script_source(backend, 5);

        let started = Instant::now();
        let err = source.connect().await.unwrap_err();
        assert!(matches!(err, MulticamError::BackendSpawnError { .. }));
        assert!(!err.is_retryable());
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_reader_reassembles_split_frames() {
        let mock = Builder::new()
            .read(&[1, 2])
            .read(&[3, 4, 5, 6])
            .read(&[7, 8, 9, 10, 11, 12])
            .build();
        let mut reader = RawFrameReader::new(mock, 6);

        assert_eq!(reader.read_frame().await.unwrap().unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), vec![7, 8, 9, 10, 11, 12]);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_rejects_truncated_frame() {
        let data: &[u8] = &[1, 2, 3, 4];
        let mut reader = RawFrameReader::new(data, 6);
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(
            err,
            MulticamError::IncompleteFrame {
                expected: 6,
                received: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_wait_for_frame_skips_already_grabbed() {
        let size = FrameSize::new(1, 1);
        let (tx, mut rx) = watch::channel(Some(Frame::new(vec![0; 3], size, 1)));

        let none = wait_for_frame(&mut rx, 1, Duration::from_millis(20)).await.unwrap();
        assert!(none.is_none());

        tx.send_replace(Some(Frame::new(vec![0; 3], size, 2)));
        let next = wait_for_frame(&mut rx, 1, Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.sequence, 2);

        drop(tx);
        assert!(wait_for_frame(&mut rx, 2, Duration::from_millis(20)).await.is_err());
    }

    #[tokio::test]
    async fn test_pump_counts_frames_until_eof() {
        let data: Vec<u8> = (0..18).collect();
        let reader = RawFrameReader::new(&data[..], 6);
        let counter = Arc::new(ReadCounter::new());
        let (tx, rx) = watch::channel(None);

        pump_frames("Stream 1".to_string(), reader, FrameSize::new(2, 1), Arc::clone(&counter), tx).await;

        assert_eq!(counter.snapshot(Instant::now()).frame_count, 3);
        let last = rx.borrow().clone().unwrap();
        assert_eq!(last.sequence, 3);
        assert_eq!(last.data.as_slice(), &[12, 13, 14, 15, 16, 17]);
    }
}

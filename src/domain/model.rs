use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Which decoder front-end pulls frames from a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Ffmpeg,
    Gstreamer,
    Synthetic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum RunMode {
    #[serde(rename = "seq", alias = "sequential")]
    #[cfg_attr(feature = "cli", value(name = "seq", alias = "sequential"))]
    Sequential,
    #[serde(rename = "multithread", alias = "thread")]
    #[cfg_attr(feature = "cli", value(name = "multithread", alias = "thread"))]
    MultiThread,
    #[serde(rename = "multiproc", alias = "process")]
    #[cfg_attr(feature = "cli", value(name = "multiproc", alias = "process"))]
    MultiProcess,
}

/// `Read` only counts decoded frames, `Vis` also runs the display stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum MeasType {
    Read,
    Vis,
}

impl StreamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ffmpeg => "ffmpeg",
            Self::Gstreamer => "gstreamer",
            Self::Synthetic => "synthetic",
        }
    }
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "seq",
            Self::MultiThread => "multithread",
            Self::MultiProcess => "multiproc",
        }
    }
}

impl MeasType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Vis => "vis",
        }
    }

    pub fn is_visualized(&self) -> bool {
        matches!(self, Self::Vis)
    }
}

macro_rules! impl_text_enum {
    ($ty:ident, $field:literal, [$($text:literal => $variant:ident),+ $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = crate::utils::error::MulticamError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::utils::error::MulticamError::InvalidConfigValueError {
                        field: $field.to_string(),
                        value: other.to_string(),
                        reason: format!(
                            "Expected one of: {}",
                            [$($text),+].join(", ")
                        ),
                    }),
                }
            }
        }
    };
}

impl_text_enum!(StreamType, "stream_type", [
    "ffmpeg" => Ffmpeg,
    "gstreamer" => Gstreamer,
    "synthetic" => Synthetic,
]);

impl_text_enum!(RunMode, "run_mode", [
    "seq" => Sequential,
    "sequential" => Sequential,
    "multithread" => MultiThread,
    "thread" => MultiThread,
    "multiproc" => MultiProcess,
    "process" => MultiProcess,
]);

impl_text_enum!(MeasType, "meas_type", [
    "read" => Read,
    "vis" => Vis,
]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum RtspTransport {
    Tcp,
    Udp,
}

impl RtspTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraSpec {
    pub name: String,
    pub url: String,
}

impl CameraSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Default window name for the camera at `index` (zero based).
    pub fn default_name(index: usize) -> String {
        format!("Stream {}", index + 1)
    }

    pub fn from_urls<I, S>(urls: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter()
            .enumerate()
            .map(|(idx, url)| Self::new(Self::default_name(idx), url))
            .collect()
    }

    pub fn redacted_url(&self) -> String {
        crate::utils::redact::redact_url(&self.url)
    }
}

/// Dimensions every decoded frame is scaled to. Pixels are packed BGR24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const MAX_DIMENSION: u32 = 7680;
    pub const BYTES_PER_PIXEL: usize = 3;

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * Self::BYTES_PER_PIXEL
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Arc<Vec<u8>>,
    pub size: FrameSize,
    pub sequence: u64,
    pub captured_at: Instant,
    pub wall_time: DateTime<Local>,
}

impl Frame {
    pub fn new(data: Vec<u8>, size: FrameSize, sequence: u64) -> Self {
        Self {
            data: Arc::new(data),
            size,
            sequence,
            captured_at: Instant::now(),
            wall_time: Local::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectPolicy {
    pub attempts: u32,
    pub interval: Duration,
    pub first_frame_timeout: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(2),
            first_frame_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectPolicy {
    /// Upper bound on how long a full connect sequence may take.
    pub fn budget(&self) -> Duration {
        (self.first_frame_timeout + self.interval) * self.attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReadStats {
    pub frame_count: u64,
    pub read_fps: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraReport {
    pub name: String,
    pub url: String,
    pub connected: bool,
    pub total_frames: u64,
    pub read_fps: Option<f64>,
    pub display_frames: u64,
    pub display_fps: Option<f64>,
    pub mean_latency_ms: Option<f64>,
    pub error: Option<String>,
}

impl CameraReport {
    pub fn unconnected(camera: &CameraSpec, error: impl Into<String>) -> Self {
        Self {
            name: camera.name.clone(),
            url: camera.redacted_url(),
            connected: false,
            total_frames: 0,
            read_fps: None,
            display_frames: 0,
            display_fps: None,
            mean_latency_ms: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub stream_type: StreamType,
    pub run_mode: RunMode,
    pub meas_type: MeasType,
    pub duration_secs: f64,
    pub cameras: Vec<CameraReport>,
}

impl RunReport {
    pub fn connected_count(&self) -> usize {
        self.cameras.iter().filter(|c| c.connected).count()
    }

    pub fn camera(&self, name: &str) -> Option<&CameraReport> {
        self.cameras.iter().find(|c| c.name == name)
    }
}

/// Single line a multiprocess worker prints on stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    pub camera: CameraReport,
}

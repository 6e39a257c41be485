pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::domain::model::{
    CameraSpec, ConnectPolicy, FrameSize, MeasType, RtspTransport, RunMode, StreamType,
};
#[cfg(feature = "cli")]
use crate::domain::ports::ConfigProvider;
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "cli")]
use std::time::Duration;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "multicam")]
#[command(about = "Measure read and display FPS of several RTSP cameras through ffmpeg or GStreamer")]
pub struct CliConfig {
    /// Camera URLs, comma separated
    #[arg(long, value_delimiter = ',')]
    pub urls: Vec<String>,

    #[arg(long, value_enum, default_value = "gstreamer")]
    pub stream_type: StreamType,

    #[arg(long, value_enum, default_value = "seq")]
    pub run_mode: RunMode,

    #[arg(long, value_enum, default_value = "vis")]
    pub meas_type: MeasType,

    /// Capture duration in seconds
    #[arg(long, default_value = "60")]
    pub duration: f64,

    #[arg(long, default_value = "640")]
    pub width: u32,

    #[arg(long, default_value = "480")]
    pub height: u32,

    #[arg(long, default_value = "1000")]
    pub grab_timeout_ms: u64,

    #[arg(long, default_value = "5")]
    pub connect_attempts: u32,

    #[arg(long, default_value = "2000")]
    pub connect_interval_ms: u64,

    #[arg(long, default_value = "10000")]
    pub first_frame_timeout_ms: u64,

    #[arg(long, default_value = "10")]
    pub rtsp_latency_ms: u32,

    #[arg(long, value_enum, default_value = "tcp")]
    pub rtsp_transport: RtspTransport,

    /// Frame rate of the synthetic test source
    #[arg(long, default_value = "30")]
    pub synthetic_fps: u32,

    /// Directory for report files
    #[arg(long, default_value = "./reports")]
    pub output_path: String,

    #[arg(long, value_delimiter = ',', default_value = "json,csv")]
    pub report_formats: Vec<String>,

    /// Write every Nth displayed frame of each camera as a PPM snapshot here
    #[arg(long)]
    pub snapshot_dir: Option<String>,

    #[arg(long, default_value = "30")]
    pub snapshot_every: u64,

    /// Only check that the backend's external tool is installed
    #[arg(long)]
    pub check: bool,

    #[arg(long, help = "Enable system monitoring")]
    pub monitor: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Set by the parent of a multiprocess run; see `WORKER_URL_ENV`.
    #[arg(long, hide = true, env = "MULTICAM_WORKER_URL", hide_env_values = true)]
    pub worker_url: Option<String>,

    #[arg(long, hide = true)]
    pub worker_name: Option<String>,
}

#[cfg(feature = "cli")]
impl CliConfig {
    pub fn is_worker(&self) -> bool {
        self.worker_url.is_some()
    }

    /// The single camera a worker process is responsible for.
    pub fn worker_camera(&self) -> Option<CameraSpec> {
        let url = self.worker_url.clone()?;
        let name = self
            .worker_name
            .clone()
            .unwrap_or_else(|| CameraSpec::default_name(0));
        Some(CameraSpec::new(name, url))
    }
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn cameras(&self) -> Vec<CameraSpec> {
        match self.worker_camera() {
            Some(camera) => vec![camera],
            None => CameraSpec::from_urls(self.urls.iter().cloned()),
        }
    }

    fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    fn meas_type(&self) -> MeasType {
        self.meas_type
    }

    fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration).unwrap_or(Duration::ZERO)
    }

    fn frame_size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    fn grab_timeout(&self) -> Duration {
        Duration::from_millis(self.grab_timeout_ms)
    }

    fn connect_policy(&self) -> ConnectPolicy {
        ConnectPolicy {
            attempts: self.connect_attempts,
            interval: Duration::from_millis(self.connect_interval_ms),
            first_frame_timeout: Duration::from_millis(self.first_frame_timeout_ms),
        }
    }

    fn rtsp_latency_ms(&self) -> u32 {
        self.rtsp_latency_ms
    }

    fn rtsp_transport(&self) -> RtspTransport {
        self.rtsp_transport
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn report_formats(&self) -> Vec<String> {
        self.report_formats.clone()
    }

    fn synthetic_fps(&self) -> u32 {
        self.synthetic_fps
    }

    fn snapshot_dir(&self) -> Option<&str> {
        self.snapshot_dir.as_deref()
    }

    fn snapshot_every(&self) -> u64 {
        self.snapshot_every
    }
}

use crate::core::settings::CaptureSettings;
use crate::domain::model::{
    CameraSpec, ConnectPolicy, Frame, FrameSize, MeasType, ReadStats, RtspTransport, RunMode,
    StreamType,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A camera stream that yields decoded frames.
#[async_trait]
pub trait FrameSource: Send {
    fn name(&self) -> &str;
    fn url(&self) -> &str;

    /// Opens the stream and waits for its first frame, retrying per the
    /// source's connect policy.
    async fn connect(&mut self) -> Result<()>;

    /// Waits up to `timeout` for a frame newer than the last one grabbed.
    /// `Ok(None)` means the timeout elapsed.
    async fn grab_frame(&mut self, timeout: Duration) -> Result<Option<Frame>>;

    /// Newest decoded frame, without marking it as grabbed.
    fn latest_frame(&self) -> Option<Frame>;

    fn read_stats(&self) -> ReadStats;

    async fn release(&mut self);
}

pub trait SourceFactory: Send + Sync {
    fn create(&self, camera: &CameraSpec, settings: &CaptureSettings) -> Box<dyn FrameSource>;
}

/// Receives frames that passed the display stage.
pub trait FrameSink: Send {
    fn show(&mut self, window: &str, frame: &Frame, overlay: &[String]) -> Result<()>;
}

pub trait ReportStorage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<String>> + Send;
}

/// Accessors shared by the CLI flags and the TOML file.
pub trait ConfigProvider: Send + Sync {
    fn cameras(&self) -> Vec<CameraSpec>;
    fn stream_type(&self) -> StreamType;
    fn run_mode(&self) -> RunMode;
    fn meas_type(&self) -> MeasType;
    fn duration(&self) -> Duration;
    fn frame_size(&self) -> FrameSize;
    fn grab_timeout(&self) -> Duration;
    fn connect_policy(&self) -> ConnectPolicy;
    fn rtsp_latency_ms(&self) -> u32;
    fn rtsp_transport(&self) -> RtspTransport;
    fn output_path(&self) -> &str;
    fn report_formats(&self) -> Vec<String>;

    fn synthetic_fps(&self) -> u32 {
        30
    }

    fn snapshot_dir(&self) -> Option<&str> {
        None
    }

    fn snapshot_every(&self) -> u64 {
        30
    }
}

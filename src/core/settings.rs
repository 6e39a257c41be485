use crate::domain::model::{
    CameraSpec, ConnectPolicy, FrameSize, MeasType, RtspTransport, RunMode, StreamType,
};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{MulticamError, Result};
use crate::utils::validation::{
    validate_positive_number, validate_range, validate_stream_url, validate_unique_names, Validate,
};
use std::path::PathBuf;
use std::time::Duration;

pub const REPORT_FORMATS: &[&str] = &["json", "csv"];

/// Resolved settings for one capture run.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub stream_type: StreamType,
    pub run_mode: RunMode,
    pub meas_type: MeasType,
    pub duration: Duration,
    pub frame_size: FrameSize,
    pub grab_timeout: Duration,
    pub connect_policy: ConnectPolicy,
    pub rtsp_latency_ms: u32,
    pub rtsp_transport: RtspTransport,
    pub synthetic_fps: u32,
    pub cameras: Vec<CameraSpec>,
    pub output_path: String,
    pub report_formats: Vec<String>,
    pub snapshot_dir: Option<PathBuf>,
    pub snapshot_every: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            stream_type: StreamType::Gstreamer,
            run_mode: RunMode::Sequential,
            meas_type: MeasType::Vis,
            duration: Duration::from_secs(60),
            frame_size: FrameSize::default(),
            grab_timeout: Duration::from_secs(1),
            connect_policy: ConnectPolicy::default(),
            rtsp_latency_ms: 10,
            rtsp_transport: RtspTransport::Tcp,
            synthetic_fps: 30,
            cameras: Vec::new(),
            output_path: "./reports".to_string(),
            report_formats: REPORT_FORMATS.iter().map(|f| f.to_string()).collect(),
            snapshot_dir: None,
            snapshot_every: 30,
        }
    }
}

impl CaptureSettings {
    pub fn from_config<C: ConfigProvider + ?Sized>(config: &C) -> Self {
        Self {
            stream_type: config.stream_type(),
            run_mode: config.run_mode(),
            meas_type: config.meas_type(),
            duration: config.duration(),
            frame_size: config.frame_size(),
            grab_timeout: config.grab_timeout(),
            connect_policy: config.connect_policy(),
            rtsp_latency_ms: config.rtsp_latency_ms(),
            rtsp_transport: config.rtsp_transport(),
            synthetic_fps: config.synthetic_fps(),
            cameras: config.cameras(),
            output_path: config.output_path().to_string(),
            report_formats: config.report_formats(),
            snapshot_dir: config.snapshot_dir().map(PathBuf::from),
            snapshot_every: config.snapshot_every(),
        }
    }

    pub fn is_visualized(&self) -> bool {
        self.meas_type.is_visualized()
    }
}

impl Validate for CaptureSettings {
    fn validate(&self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(MulticamError::MissingConfigError {
                field: "cameras".to_string(),
            });
        }
        for camera in &self.cameras {
            validate_stream_url("cameras.url", &camera.url)?;
        }
        validate_unique_names("cameras.name", self.cameras.iter().map(|c| c.name.as_str()))?;

        if self.duration.is_zero() {
            return Err(MulticamError::InvalidConfigValueError {
                field: "duration_seconds".to_string(),
                value: "0".to_string(),
                reason: "Duration must be greater than zero".to_string(),
            });
        }
        validate_range(
            "capture.width",
            self.frame_size.width,
            1,
            FrameSize::MAX_DIMENSION,
        )?;
        validate_range(
            "capture.height",
            self.frame_size.height,
            1,
            FrameSize::MAX_DIMENSION,
        )?;
        validate_positive_number(
            "capture.connect_attempts",
            u64::from(self.connect_policy.attempts),
            1,
        )?;
        validate_positive_number(
            "capture.grab_timeout_ms",
            self.grab_timeout.as_millis() as u64,
            1,
        )?;
        validate_range("capture.synthetic_fps", self.synthetic_fps, 1, 1000)?;
        validate_positive_number("display.snapshot_every", self.snapshot_every, 1)?;

        for format in &self.report_formats {
            if !REPORT_FORMATS.contains(&format.as_str()) {
                return Err(MulticamError::InvalidConfigValueError {
                    field: "report.formats".to_string(),
                    value: format.clone(),
                    reason: format!(
                        "Unsupported format. Valid formats: {}",
                        REPORT_FORMATS.join(", ")
                    ),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(urls: &[&str]) -> CaptureSettings {
        CaptureSettings {
            cameras: CameraSpec::from_urls(urls.iter().copied()),
            ..CaptureSettings::default()
        }
    }

    #[test]
    fn test_defaults_are_valid_with_a_camera() {
        let settings = settings_with(&["rtsp://192.168.200.132:554/Streaming/Channels/101"]);
        assert!(settings.validate().is_ok());
        assert!(settings.is_visualized());
    }

    #[test]
    fn test_no_cameras_is_rejected() {
        let err = settings_with(&[]).validate().unwrap_err();
        assert!(matches!(err, MulticamError::MissingConfigError { .. }));
    }

    #[test]
    fn test_zero_duration_is_rejected() {
        let mut settings = settings_with(&["synthetic://a"]);
        settings.duration = Duration::ZERO;
        assert!(settings.validate().is_err());

        settings.duration = Duration::from_millis(300);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_unknown_report_format_is_rejected() {
        let mut settings = settings_with(&["synthetic://a"]);
        settings.report_formats = vec!["xml".to_string()];
        assert!(settings.validate().is_err());
    }
}

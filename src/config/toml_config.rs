use crate::core::settings::CaptureSettings;
use crate::domain::model::{
    CameraSpec, ConnectPolicy, FrameSize, MeasType, RtspTransport, RunMode, StreamType,
};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{MulticamError, Result};
use crate::utils::validation::{validate_path, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub run: RunConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    pub cameras: Vec<CameraConfig>,
    pub display: Option<DisplayConfig>,
    pub monitoring: Option<MonitoringConfig>,
    pub report: Option<ReportConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub description: Option<String>,
    pub stream_type: StreamType,
    pub run_mode: Option<RunMode>,
    pub meas_type: Option<MeasType>,
    pub duration_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub grab_timeout_ms: Option<u64>,
    pub connect_attempts: Option<u32>,
    pub connect_interval_ms: Option<u64>,
    pub first_frame_timeout_ms: Option<u64>,
    pub rtsp_latency_ms: Option<u32>,
    pub rtsp_transport: Option<RtspTransport>,
    pub synthetic_fps: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub name: Option<String>,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub snapshot_dir: Option<String>,
    pub snapshot_every: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub interval_seconds: Option<u64>,
    pub json_logs: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub output_path: String,
    pub formats: Option<Vec<String>>,
}

impl TomlConfig {
    /// Loads the configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(MulticamError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| MulticamError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value. Unset variables are left as is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| MulticamError::ProcessingError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        crate::utils::validation::validate_non_empty_string("run.name", &self.run.name)?;
        if let Some(report) = &self.report {
            validate_path("report.output_path", &report.output_path)?;
        }
        if let Some(display) = &self.display {
            if let Some(dir) = &display.snapshot_dir {
                validate_path("display.snapshot_dir", dir)?;
            }
        }
        if let Some(camera) = self
            .cameras
            .iter()
            .find(|c| c.enabled && c.url.contains("${"))
        {
            return Err(MulticamError::ConfigValidationError {
                field: "cameras.url".to_string(),
                message: format!(
                    "unresolved environment variable in {}",
                    crate::utils::redact::redact_url(&camera.url)
                ),
            });
        }
        CaptureSettings::from_config(self).validate()
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn monitoring_interval(&self) -> Duration {
        let secs = self
            .monitoring
            .as_ref()
            .and_then(|m| m.interval_seconds)
            .unwrap_or(5);
        Duration::from_secs(secs.max(1))
    }

    pub fn json_logs(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.json_logs)
            .unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    /// Enabled cameras in file order. Unnamed cameras are numbered by their
    /// position in the file.
    fn cameras(&self) -> Vec<CameraSpec> {
        self.cameras
            .iter()
            .enumerate()
            .filter(|(_, c)| c.enabled)
            .map(|(idx, c)| {
                let name = c.name.clone().unwrap_or_else(|| CameraSpec::default_name(idx));
                CameraSpec::new(name, c.url.clone())
            })
            .collect()
    }

    fn stream_type(&self) -> StreamType {
        self.run.stream_type
    }

    fn run_mode(&self) -> RunMode {
        self.run.run_mode.unwrap_or(RunMode::Sequential)
    }

    fn meas_type(&self) -> MeasType {
        self.run.meas_type.unwrap_or(MeasType::Vis)
    }

    fn duration(&self) -> Duration {
        Duration::from_secs(self.run.duration_seconds.unwrap_or(60))
    }

    fn frame_size(&self) -> FrameSize {
        let default = FrameSize::default();
        FrameSize::new(
            self.capture.width.unwrap_or(default.width),
            self.capture.height.unwrap_or(default.height),
        )
    }

    fn grab_timeout(&self) -> Duration {
        Duration::from_millis(self.capture.grab_timeout_ms.unwrap_or(1000))
    }

    fn connect_policy(&self) -> ConnectPolicy {
        let default = ConnectPolicy::default();
        ConnectPolicy {
            attempts: self.capture.connect_attempts.unwrap_or(default.attempts),
            interval: self
                .capture
                .connect_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(default.interval),
            first_frame_timeout: self
                .capture
                .first_frame_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.first_frame_timeout),
        }
    }

    fn rtsp_latency_ms(&self) -> u32 {
        self.capture.rtsp_latency_ms.unwrap_or(10)
    }

    fn rtsp_transport(&self) -> RtspTransport {
        self.capture.rtsp_transport.unwrap_or(RtspTransport::Tcp)
    }

    fn output_path(&self) -> &str {
        self.report
            .as_ref()
            .map(|r| r.output_path.as_str())
            .unwrap_or("./reports")
    }

    fn report_formats(&self) -> Vec<String> {
        self.report
            .as_ref()
            .and_then(|r| r.formats.clone())
            .unwrap_or_else(|| vec!["json".to_string(), "csv".to_string()])
    }

    fn synthetic_fps(&self) -> u32 {
        self.capture.synthetic_fps.unwrap_or(30)
    }

    fn snapshot_dir(&self) -> Option<&str> {
        self.display.as_ref().and_then(|d| d.snapshot_dir.as_deref())
    }

    fn snapshot_every(&self) -> u64 {
        self.display
            .as_ref()
            .and_then(|d| d.snapshot_every)
            .unwrap_or(30)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

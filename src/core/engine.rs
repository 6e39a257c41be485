use crate::core::report::persist_report;
use crate::core::visualizer::MultiCamVisualizer;
use crate::domain::model::{RunMode, RunReport};
use crate::domain::ports::ReportStorage;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use crate::utils::preflight;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of a full capture run.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub report: RunReport,
    pub report_paths: Vec<String>,
}

/// Drives a run end to end: preflight, connect, capture, evaluate, persist.
pub struct CaptureEngine<S: ReportStorage> {
    visualizer: MultiCamVisualizer,
    storage: S,
    monitor: SystemMonitor,
    monitor_interval: Duration,
    preflight: bool,
}

impl<S: ReportStorage> CaptureEngine<S> {
    pub fn new(visualizer: MultiCamVisualizer, storage: S) -> Self {
        Self::new_with_monitoring(visualizer, storage, false)
    }

    pub fn new_with_monitoring(
        visualizer: MultiCamVisualizer,
        storage: S,
        monitor_enabled: bool,
    ) -> Self {
        Self {
            visualizer,
            storage,
            monitor: SystemMonitor::new(monitor_enabled),
            monitor_interval: Duration::from_secs(5),
            preflight: true,
        }
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Skip the PATH lookup for the backend's external tool.
    pub fn without_preflight(mut self) -> Self {
        self.preflight = false;
        self
    }

    pub async fn run(&mut self, cancel: CancellationToken) -> Result<EngineOutput> {
        let settings = self.visualizer.settings().clone();
        tracing::info!(
            "🚀 Starting capture: {} camera(s), backend={}, mode={}, measure={}, duration={:?}",
            settings.cameras.len(),
            settings.stream_type,
            settings.run_mode,
            settings.meas_type,
            settings.duration
        );

        if self.preflight {
            preflight::check_backend(settings.stream_type)?;
        }

        let connected = self.visualizer.connect_cameras().await?;
        if settings.run_mode != RunMode::MultiProcess {
            tracing::info!("🔗 {}/{} camera(s) connected", connected, settings.cameras.len());
        }
        self.monitor.log_stats("connect");

        let monitor_stop = cancel.child_token();
        let monitor_task = tokio::spawn(
            self.monitor
                .clone()
                .run_periodic(self.monitor_interval, monitor_stop.clone()),
        );

        let result = self.visualizer.run(cancel).await;

        monitor_stop.cancel();
        if let Err(e) = monitor_task.await {
            tracing::debug!("monitor task ended abnormally: {}", e);
        }

        let report = result?;
        self.monitor.log_stats("report");

        let report_paths = persist_report(&self.storage, &report, &settings.report_formats).await?;
        for path in &report_paths {
            tracing::info!("📁 Report saved to: {}", path);
        }
        self.monitor.log_final_stats();

        Ok(EngineOutput {
            report,
            report_paths,
        })
    }
}

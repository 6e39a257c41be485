use crate::adapters::BackendFactory;
use crate::core::display::{DisplayTracker, LogSink, NullSink, SinkChain, SnapshotSink};
use crate::core::settings::CaptureSettings;
use crate::core::worker::WorkerPool;
use crate::domain::model::{
    CameraReport, CameraSpec, Frame, MeasType, RunMode, RunReport, StreamType,
};
use crate::domain::ports::{FrameSink, FrameSource, SourceFactory};
use crate::utils::error::{MulticamError, Result};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Connects a set of cameras and measures how fast frames can be read and
/// displayed under the configured run mode.
pub struct MultiCamVisualizer {
    settings: CaptureSettings,
    factory: Arc<dyn SourceFactory>,
    sources: Vec<Box<dyn FrameSource>>,
    trackers: Vec<DisplayTracker>,
    unconnected: Vec<CameraReport>,
    worker_program: Option<PathBuf>,
}

impl MultiCamVisualizer {
    pub fn new(settings: CaptureSettings) -> Self {
        Self::with_factory(settings, Arc::new(BackendFactory))
    }

    pub fn with_factory(settings: CaptureSettings, factory: Arc<dyn SourceFactory>) -> Self {
        Self {
            settings,
            factory,
            sources: Vec::new(),
            trackers: Vec::new(),
            unconnected: Vec::new(),
            worker_program: None,
        }
    }

    /// Binary started for each camera in multiprocess mode. Defaults to the
    /// current executable.
    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(program.into());
        self
    }

    pub fn set_settings(
        &mut self,
        stream_type: StreamType,
        run_mode: RunMode,
        meas_type: MeasType,
        duration: Duration,
    ) {
        self.settings.stream_type = stream_type;
        self.settings.run_mode = run_mode;
        self.settings.meas_type = meas_type;
        self.settings.duration = duration;
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn connected_count(&self) -> usize {
        self.sources.len()
    }

    /// Opens every configured camera. Failed cameras are kept for the report.
    ///
    /// In multiprocess mode nothing is opened here; each worker connects to
    /// its own camera.
    pub async fn connect_cameras(&mut self) -> Result<usize> {
        if self.settings.run_mode == RunMode::MultiProcess {
            tracing::info!("Camera connections are deferred to worker processes");
            return Ok(0);
        }

        tracing::info!("Setting up camera connections...");
        self.release_all().await;
        self.unconnected.clear();

        for camera in self.settings.cameras.clone() {
            let mut source = self.factory.create(&camera, &self.settings);
            match source.connect().await {
                Ok(()) => {
                    self.trackers.push(DisplayTracker::new(camera.name.clone()));
                    self.sources.push(source);
                }
                Err(e) => {
                    tracing::warn!("Failed to connect: {}", camera.redacted_url());
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    self.unconnected.push(CameraReport::unconnected(&camera, e.to_string()));
                }
            }
        }

        Ok(self.sources.len())
    }

    /// Runs the configured mode and prints the FPS evaluation.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<RunReport> {
        let started_at = Local::now();
        let started = Instant::now();
        let run_id = started_at.format("%Y%m%d_%H%M%S_%3f").to_string();

        let cameras = match self.settings.run_mode {
            RunMode::Sequential => {
                self.run_sequential(&cancel).await;
                let reports = self.collect_reports();
                self.evaluate_fps(&reports);
                reports
            }
            RunMode::MultiThread => {
                self.run_multithread(&cancel).await?;
                let reports = self.collect_reports();
                self.evaluate_fps(&reports);
                reports
            }
            RunMode::MultiProcess => {
                let reports = self.run_multiprocess(&cancel).await?;
                print_multiprocess_results(&reports);
                reports
            }
        };

        self.release_all().await;

        Ok(RunReport {
            run_id,
            started_at,
            finished_at: Local::now(),
            stream_type: self.settings.stream_type,
            run_mode: self.settings.run_mode,
            meas_type: self.settings.meas_type,
            duration_secs: started.elapsed().as_secs_f64(),
            cameras,
        })
    }

    async fn run_sequential(&mut self, cancel: &CancellationToken) {
        println!("Running in sequential mode...");
        let visualize = self.settings.is_visualized();
        let timeout = self.settings.grab_timeout;
        let deadline = Instant::now() + self.settings.duration;
        let mut sink = build_sink(&self.settings);
        let mut active = vec![true; self.sources.len()];

        'outer: while Instant::now() < deadline && active.iter().any(|a| *a) {
            for (idx, source) in self.sources.iter_mut().enumerate() {
                if !active[idx] {
                    continue;
                }
                let grabbed = tokio::select! {
                    _ = cancel.cancelled() => break 'outer,
                    grabbed = source.grab_frame(timeout) => grabbed,
                };
                match grabbed {
                    Ok(Some(frame)) if visualize => {
                        display_frame(&mut self.trackers[idx], sink.as_mut(), &frame);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("[{}] {}. Removed from rotation.", source.name(), e);
                        active[idx] = false;
                    }
                }
            }
        }
    }

    async fn run_multithread(&mut self, cancel: &CancellationToken) -> Result<()> {
        println!("Running in multithread mode...");
        let sources = std::mem::take(&mut self.sources);
        let trackers = std::mem::take(&mut self.trackers);
        let loop_settings = LoopSettings::from(&self.settings);

        let mut tasks = JoinSet::new();
        for (idx, (source, tracker)) in sources.into_iter().zip(trackers).enumerate() {
            let sink = build_sink(&self.settings);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let (source, tracker) =
                    capture_loop(source, tracker, sink, loop_settings, cancel).await;
                (idx, source, tracker)
            });
        }
        tracing::debug!("Spawned {} capture tasks", tasks.len());

        let mut finished = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let finished_task = joined.map_err(|e| MulticamError::ProcessingError {
                message: format!("capture task failed: {}", e),
            })?;
            finished.push(finished_task);
        }
        finished.sort_by_key(|(idx, _, _)| *idx);

        for (_, source, tracker) in finished {
            self.sources.push(source);
            self.trackers.push(tracker);
        }
        Ok(())
    }

    async fn run_multiprocess(&mut self, cancel: &CancellationToken) -> Result<Vec<CameraReport>> {
        println!("Running in multiprocessing mode...");
        let program = match &self.worker_program {
            Some(program) => program.clone(),
            None => std::env::current_exe()?,
        };
        let pool = WorkerPool::new(program, self.settings.clone());
        Ok(pool.run(cancel).await)
    }

    fn collect_reports(&self) -> Vec<CameraReport> {
        let now = Instant::now();
        let visualize = self.settings.is_visualized();
        let mut reports: Vec<CameraReport> = self
            .sources
            .iter()
            .zip(&self.trackers)
            .map(|(source, tracker)| camera_report(source.as_ref(), tracker, visualize, now))
            .collect();
        reports.extend(self.unconnected.iter().cloned());

        let order = |name: &str| {
            self.settings
                .cameras
                .iter()
                .position(|c| c.name == name)
                .unwrap_or(usize::MAX)
        };
        reports.sort_by_key(|r| order(&r.name));
        reports
    }

    fn evaluate_fps(&self, reports: &[CameraReport]) {
        for report in reports.iter().filter(|r| r.connected) {
            match report.read_fps {
                Some(fps) => println!(
                    "[{}] Read FPS: {:.2} (Total frames: {})",
                    report.name, fps, report.total_frames
                ),
                None => println!(
                    "[{}] Read FPS: Not enough frames to compute FPS.",
                    report.name
                ),
            }
        }

        if self.settings.is_visualized() {
            for report in reports.iter().filter(|r| r.connected) {
                match report.display_fps {
                    Some(fps) => println!(
                        "[{}] Visualization FPS: {:.2} (Frames: {})",
                        report.name, fps, report.display_frames
                    ),
                    None => println!(
                        "[{}] Visualization FPS: Not enough frames to compute FPS.",
                        report.name
                    ),
                }
            }
        }
    }

    pub async fn release_all(&mut self) {
        for source in &mut self.sources {
            source.release().await;
        }
        self.sources.clear();
        self.trackers.clear();
    }
}

/// Settings a single capture loop needs, copied into each task.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopSettings {
    pub duration: Duration,
    pub grab_timeout: Duration,
    pub visualize: bool,
}

impl From<&CaptureSettings> for LoopSettings {
    fn from(settings: &CaptureSettings) -> Self {
        Self {
            duration: settings.duration,
            grab_timeout: settings.grab_timeout,
            visualize: settings.is_visualized(),
        }
    }
}

/// Pulls frames from one source until the duration elapses, the run is
/// cancelled, or a grab fails.
pub(crate) async fn capture_loop(
    mut source: Box<dyn FrameSource>,
    mut tracker: DisplayTracker,
    mut sink: Box<dyn FrameSink>,
    settings: LoopSettings,
    cancel: CancellationToken,
) -> (Box<dyn FrameSource>, DisplayTracker) {
    let deadline = Instant::now() + settings.duration;

    while Instant::now() < deadline {
        let grabbed = tokio::select! {
            _ = cancel.cancelled() => break,
            grabbed = source.grab_frame(settings.grab_timeout) => grabbed,
        };

        match grabbed {
            Ok(Some(frame)) => {
                if settings.visualize {
                    display_frame(&mut tracker, sink.as_mut(), &frame);
                }
            }
            Ok(None) | Err(_) => {
                tracing::warn!("[{}] Failed to grab frame. Exiting loop.", source.name());
                break;
            }
        }
    }

    (source, tracker)
}

fn display_frame(tracker: &mut DisplayTracker, sink: &mut dyn FrameSink, frame: &Frame) {
    if let Some(update) = tracker.observe(frame, Instant::now(), Local::now()) {
        if let Err(e) = sink.show(tracker.window(), frame, &update.overlay) {
            tracing::warn!("[{}] display sink failed: {}", tracker.window(), e);
        }
    }
}

pub(crate) fn build_sink(settings: &CaptureSettings) -> Box<dyn FrameSink> {
    if !settings.is_visualized() {
        return Box::new(NullSink);
    }
    match &settings.snapshot_dir {
        Some(dir) => Box::new(SinkChain(vec![
            Box::new(LogSink),
            Box::new(SnapshotSink::new(dir.clone(), settings.snapshot_every)),
        ])),
        None => Box::new(LogSink),
    }
}

pub(crate) fn camera_report(
    source: &dyn FrameSource,
    tracker: &DisplayTracker,
    visualize: bool,
    now: Instant,
) -> CameraReport {
    let stats = source.read_stats();
    CameraReport {
        name: source.name().to_string(),
        url: CameraSpec::new(source.name(), source.url()).redacted_url(),
        connected: true,
        total_frames: stats.frame_count,
        read_fps: stats.read_fps,
        display_frames: tracker.display_count(),
        display_fps: if visualize { tracker.display_fps(now) } else { None },
        mean_latency_ms: if visualize { tracker.mean_latency_ms() } else { None },
        error: None,
    }
}

fn print_multiprocess_results(reports: &[CameraReport]) {
    println!("Multiprocessing results:");
    for report in reports {
        if report.connected {
            println!(
                "{} - Vis FPS: {:.2}, Read FPS: {:.2}, Total Frames: {}",
                report.name,
                report.display_fps.unwrap_or(0.0),
                report.read_fps.unwrap_or(0.0),
                report.total_frames
            );
        } else {
            println!(
                "{} - Not connected: {}",
                report.name,
                report.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

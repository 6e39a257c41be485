use crate::core::display::DisplayTracker;
use crate::core::settings::CaptureSettings;
use crate::core::visualizer::{build_sink, camera_report, capture_loop, LoopSettings};
use crate::domain::model::{CameraReport, CameraSpec, WorkerReport};
use crate::domain::ports::SourceFactory;
use crate::utils::error::{MulticamError, Result};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Extra time a worker gets beyond its capture duration and connect budget.
pub const WORKER_GRACE: Duration = Duration::from_secs(10);

/// Binary that serves multiprocess workers.
pub const WORKER_BINARY: &str = "multicam";

/// Environment variable carrying the camera URL to a worker. The URL may hold
/// credentials, so it stays out of the worker's argv.
pub const WORKER_URL_ENV: &str = "MULTICAM_WORKER_URL";

/// Locates the worker binary installed next to `exe`.
pub fn sibling_worker_program(exe: &Path) -> Result<PathBuf> {
    let program = exe.with_file_name(format!("{}{}", WORKER_BINARY, std::env::consts::EXE_SUFFIX));
    if program.is_file() {
        Ok(program)
    } else {
        Err(MulticamError::ToolNotFound {
            tool: program.display().to_string(),
        })
    }
}

/// Command line that starts one worker process for one camera.
#[derive(Debug, Clone)]
pub struct WorkerInvocation {
    pub program: PathBuf,
    pub camera: CameraSpec,
    pub settings: CaptureSettings,
}

impl WorkerInvocation {
    pub fn args(&self) -> Vec<String> {
        let s = &self.settings;
        let mut args = vec![
            "--worker-name".to_string(),
            self.camera.name.clone(),
            "--stream-type".to_string(),
            s.stream_type.to_string(),
            "--meas-type".to_string(),
            s.meas_type.to_string(),
            "--duration".to_string(),
            s.duration.as_secs_f64().to_string(),
            "--width".to_string(),
            s.frame_size.width.to_string(),
            "--height".to_string(),
            s.frame_size.height.to_string(),
            "--grab-timeout-ms".to_string(),
            s.grab_timeout.as_millis().to_string(),
            "--connect-attempts".to_string(),
            s.connect_policy.attempts.to_string(),
            "--connect-interval-ms".to_string(),
            s.connect_policy.interval.as_millis().to_string(),
            "--first-frame-timeout-ms".to_string(),
            s.connect_policy.first_frame_timeout.as_millis().to_string(),
            "--rtsp-latency-ms".to_string(),
            s.rtsp_latency_ms.to_string(),
            "--rtsp-transport".to_string(),
            s.rtsp_transport.as_str().to_string(),
            "--synthetic-fps".to_string(),
            s.synthetic_fps.to_string(),
        ];
        if let Some(dir) = &s.snapshot_dir {
            args.push("--snapshot-dir".to_string());
            args.push(dir.display().to_string());
            args.push("--snapshot-every".to_string());
            args.push(s.snapshot_every.to_string());
        }
        args
    }

    pub fn deadline(&self) -> Duration {
        self.settings.duration + self.settings.connect_policy.budget() + WORKER_GRACE
    }

    fn spawn(&self) -> Result<Child> {
        Command::new(&self.program)
            .args(self.args())
            .env(WORKER_URL_ENV, &self.camera.url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MulticamError::BackendSpawnError {
                backend: self.program.display().to_string(),
                camera: self.camera.name.clone(),
                source,
            })
    }
}

/// Parses the report line a worker printed. Only the last non-empty line
/// counts; anything before it is ignored.
pub fn parse_worker_output(stdout: &str) -> Result<WorkerReport> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| MulticamError::ProcessingError {
            message: "worker produced no output".to_string(),
        })?;
    Ok(serde_json::from_str(line)?)
}

pub fn render_worker_report(report: &WorkerReport) -> Result<String> {
    Ok(serde_json::to_string(report)?)
}

/// One worker process per camera.
pub struct WorkerPool {
    program: PathBuf,
    settings: CaptureSettings,
}

impl WorkerPool {
    pub fn new(program: PathBuf, settings: CaptureSettings) -> Self {
        Self { program, settings }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Vec<CameraReport> {
        let mut tasks = JoinSet::new();

        for (idx, camera) in self.settings.cameras.iter().enumerate() {
            let invocation = WorkerInvocation {
                program: self.program.clone(),
                camera: camera.clone(),
                settings: self.settings.clone(),
            };
            let cancel = cancel.clone();
            tasks.spawn(async move { (idx, supervise(invocation, cancel).await) });
        }

        let mut reports = Vec::with_capacity(self.settings.cameras.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!("Worker supervisor task failed: {}", e),
            }
        }
        reports.sort_by_key(|(idx, _)| *idx);
        reports.into_iter().map(|(_, report)| report).collect()
    }
}

async fn collect_output(child: &mut Child) -> std::io::Result<(String, ExitStatus)> {
    let mut out = String::new();
    if let Some(stdout) = child.stdout.as_mut() {
        stdout.read_to_string(&mut out).await?;
    }
    let status = child.wait().await?;
    Ok((out, status))
}

async fn supervise(invocation: WorkerInvocation, cancel: CancellationToken) -> CameraReport {
    let camera = invocation.camera.clone();
    let mut child = match invocation.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::error!("[{}] {}", camera.name, e);
            return CameraReport::unconnected(&camera, e.to_string());
        }
    };
    tracing::info!("[{}] Worker started (pid {:?})", camera.name, child.id());

    // Workers share the terminal's Ctrl-C and finish on their own; the
    // grace period only covers a cancel that did not reach them.
    let outcome = tokio::select! {
        out = collect_output(&mut child) => Some(out),
        _ = async {
            cancel.cancelled().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        } => None,
        _ = tokio::time::sleep(invocation.deadline()) => None,
    };

    let error = match outcome {
        Some(Ok((stdout, status))) => match parse_worker_output(&stdout) {
            Ok(report) => return report.camera,
            Err(e) => format!("worker exited with {} without a report: {}", status, e),
        },
        Some(Err(e)) => format!("failed to read worker output: {}", e),
        None => {
            if let Err(e) = child.kill().await {
                tracing::debug!("[{}] worker kill failed: {}", camera.name, e);
            }
            "worker did not finish in time".to_string()
        }
    };

    let err = MulticamError::WorkerError {
        camera: camera.name.clone(),
        message: error,
    };
    tracing::warn!("{}", err);
    CameraReport::unconnected(&camera, err.to_string())
}

/// Worker-side entry point: connect one camera, capture, and report.
pub async fn run_worker(
    settings: &CaptureSettings,
    camera: CameraSpec,
    factory: &dyn SourceFactory,
    cancel: CancellationToken,
) -> WorkerReport {
    let mut source = factory.create(&camera, settings);
    if let Err(e) = source.connect().await {
        tracing::error!("[{}] Unable to connect. Exiting process.", camera.name);
        return WorkerReport {
            camera: CameraReport::unconnected(&camera, e.to_string()),
        };
    }

    let tracker = DisplayTracker::new(camera.name.clone());
    let loop_settings = LoopSettings::from(settings);
    let (mut source, tracker) =
        capture_loop(source, tracker, build_sink(settings), loop_settings, cancel).await;

    let report = camera_report(
        source.as_ref(),
        &tracker,
        loop_settings.visualize,
        Instant::now(),
    );
    source.release().await;
    WorkerReport { camera: report }
}

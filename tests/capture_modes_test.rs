use anyhow::Result;
use multicam::adapters::{BackendFactory, SyntheticSource};
use multicam::core::settings::CaptureSettings;
use multicam::domain::model::{
    CameraSpec, ConnectPolicy, FrameSize, MeasType, RunMode, RunReport, StreamType,
};
use multicam::domain::ports::{FrameSource, SourceFactory};
use multicam::{CaptureEngine, LocalStorage, MultiCamVisualizer};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn synthetic_settings(output_path: &str, run_mode: RunMode, meas_type: MeasType) -> CaptureSettings {
    let mut settings = CaptureSettings::default();
    settings.stream_type = StreamType::Synthetic;
    settings.run_mode = run_mode;
    settings.meas_type = meas_type;
    settings.duration = Duration::from_millis(600);
    settings.frame_size = FrameSize::new(32, 24);
    settings.synthetic_fps = 50;
    settings.grab_timeout = Duration::from_millis(200);
    settings.connect_policy = ConnectPolicy {
        attempts: 2,
        interval: Duration::from_millis(10),
        first_frame_timeout: Duration::from_millis(100),
    };
    settings.cameras = CameraSpec::from_urls(["synthetic://lobby", "synthetic://dock"]);
    settings.output_path = output_path.to_string();
    settings
}

async fn run_engine(settings: CaptureSettings) -> Result<(RunReport, Vec<String>)> {
    let storage = LocalStorage::new(settings.output_path.clone());
    let visualizer = MultiCamVisualizer::with_factory(settings, Arc::new(BackendFactory));
    let mut engine = CaptureEngine::new(visualizer, storage).without_preflight();
    let output = engine.run(CancellationToken::new()).await?;
    Ok((output.report, output.report_paths))
}

#[tokio::test]
async fn test_sequential_mode_measures_every_camera() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let (report, paths) =
        run_engine(synthetic_settings(&output_path, RunMode::Sequential, MeasType::Vis)).await?;

    assert_eq!(report.run_mode, RunMode::Sequential);
    assert_eq!(report.connected_count(), 2);
    let names: Vec<&str> = report.cameras.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Stream 1", "Stream 2"]);

    for camera in &report.cameras {
        assert!(camera.total_frames >= 10, "{} read too few frames", camera.name);
        assert!(camera.read_fps.is_some());
        assert!(camera.display_frames > 0);
        assert!(camera.display_frames <= camera.total_frames);
        assert!(camera.display_fps.is_some());
    }

    assert_eq!(paths.len(), 2);
    for path in &paths {
        assert!(std::path::Path::new(path).exists());
    }
    Ok(())
}

#[tokio::test]
async fn test_multithread_read_only_skips_display_stats() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let (report, _) =
        run_engine(synthetic_settings(&output_path, RunMode::MultiThread, MeasType::Read)).await?;

    assert_eq!(report.connected_count(), 2);
    for camera in &report.cameras {
        assert!(camera.total_frames >= 10);
        let fps = camera.read_fps.unwrap();
        assert!(fps > 10.0 && fps < 100.0, "unexpected read fps {}", fps);
        assert_eq!(camera.display_frames, 0);
        assert!(camera.display_fps.is_none());
        assert!(camera.mean_latency_ms.is_none());
    }
    Ok(())
}

#[tokio::test]
async fn test_csv_report_lists_cameras_in_config_order() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let (report, paths) =
        run_engine(synthetic_settings(&output_path, RunMode::MultiThread, MeasType::Vis)).await?;

    let csv_path = paths.iter().find(|p| p.ends_with(".csv")).unwrap();
    assert!(csv_path.contains(&report.run_id));

    let mut reader = csv::Reader::from_path(csv_path)?;
    let cameras: Vec<String> = reader
        .records()
        .map(|r| r.map(|rec| rec[4].to_string()))
        .collect::<std::result::Result<_, _>>()?;
    assert_eq!(cameras, vec!["Stream 1", "Stream 2"]);
    Ok(())
}

#[tokio::test]
async fn test_cancellation_stops_run_early() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();
    let mut settings = synthetic_settings(&output_path, RunMode::Sequential, MeasType::Vis);
    settings.duration = Duration::from_secs(30);

    let storage = LocalStorage::new(output_path);
    let visualizer = MultiCamVisualizer::new(settings);
    let mut engine = CaptureEngine::new(visualizer, storage).without_preflight();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let output = engine.run(cancel).await?;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(output.report.connected_count(), 2);
    Ok(())
}

/// Cameras whose URL contains "broken" never deliver a first frame.
struct FlakyFactory;

impl SourceFactory for FlakyFactory {
    fn create(&self, camera: &CameraSpec, settings: &CaptureSettings) -> Box<dyn FrameSource> {
        let source = SyntheticSource::new(camera.clone(), settings);
        if camera.url.contains("broken") {
            Box::new(source.with_failed_connects(u32::MAX))
        } else {
            Box::new(source)
        }
    }
}

#[tokio::test]
async fn test_unreachable_camera_is_reported_not_fatal() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();
    let mut settings = synthetic_settings(&output_path, RunMode::Sequential, MeasType::Vis);
    settings.cameras = vec![
        CameraSpec::new("Gate", "synthetic://gate"),
        CameraSpec::new("Yard", "synthetic://admin:pw@broken/1"),
    ];

    let storage = LocalStorage::new(output_path);
    let visualizer = MultiCamVisualizer::with_factory(settings, Arc::new(FlakyFactory));
    let mut engine = CaptureEngine::new(visualizer, storage).without_preflight();
    let output = engine.run(CancellationToken::new()).await?;

    let gate = output.report.camera("Gate").unwrap();
    assert!(gate.connected);
    assert!(gate.total_frames > 0);

    let yard = output.report.camera("Yard").unwrap();
    assert!(!yard.connected);
    assert_eq!(yard.total_frames, 0);
    assert!(yard.error.as_deref().unwrap().contains("Yard"));
    assert!(!yard.url.contains("pw"));
    Ok(())
}

#[tokio::test]
async fn test_snapshots_written_when_visualizing() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().join("reports");
    let snapshot_dir = temp_dir.path().join("snapshots");
    let mut settings =
        synthetic_settings(output_path.to_str().unwrap(), RunMode::Sequential, MeasType::Vis);
    settings.cameras = vec![CameraSpec::new("Front Door", "synthetic://front")];
    settings.snapshot_dir = Some(snapshot_dir.clone());
    settings.snapshot_every = 5;

    run_engine(settings).await?;

    let snapshots: Vec<_> = std::fs::read_dir(&snapshot_dir)?.collect();
    assert_eq!(snapshots.len(), 1);
    let bytes = std::fs::read(snapshots[0].as_ref().unwrap().path())?;
    assert!(bytes.starts_with(b"P6"));
    Ok(())
}

/// Cameras whose URL contains "short" end after three frames.
struct ShortStreamFactory;

impl SourceFactory for ShortStreamFactory {
    fn create(&self, camera: &CameraSpec, settings: &CaptureSettings) -> Box<dyn FrameSource> {
        let source = SyntheticSource::new(camera.clone(), settings);
        if camera.url.contains("short") {
            Box::new(source.with_frame_limit(3))
        } else {
            Box::new(source)
        }
    }
}

#[tokio::test]
async fn test_sequential_ended_stream_leaves_rotation_and_keeps_stats() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();
    let mut settings = synthetic_settings(&output_path, RunMode::Sequential, MeasType::Vis);
    settings.cameras = vec![
        CameraSpec::new("Clip", "synthetic://short"),
        CameraSpec::new("Live", "synthetic://live"),
    ];

    let mut visualizer = MultiCamVisualizer::with_factory(settings, Arc::new(ShortStreamFactory));
    assert_eq!(visualizer.connect_cameras().await?, 2);
    let report = visualizer.run(CancellationToken::new()).await?;

    let clip = report.camera("Clip").unwrap();
    assert!(clip.connected);
    assert_eq!(clip.total_frames, 3);
    assert!(clip.display_frames >= 1 && clip.display_frames <= 3);

    let live = report.camera("Live").unwrap();
    assert!(live.total_frames >= 10, "live camera stopped early");
    assert!(live.display_frames > clip.display_frames);
    Ok(())
}

#[tokio::test]
async fn test_set_settings_switches_to_read_only() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();
    let settings = synthetic_settings(&output_path, RunMode::Sequential, MeasType::Vis);

    let mut visualizer = MultiCamVisualizer::new(settings);
    visualizer.set_settings(
        StreamType::Synthetic,
        RunMode::MultiThread,
        MeasType::Read,
        Duration::from_millis(300),
    );
    assert_eq!(visualizer.settings().run_mode, RunMode::MultiThread);
    assert!(!visualizer.settings().is_visualized());

    visualizer.connect_cameras().await?;
    let report = visualizer.run(CancellationToken::new()).await?;

    assert_eq!(report.run_mode, RunMode::MultiThread);
    assert_eq!(report.meas_type, MeasType::Read);
    for camera in &report.cameras {
        assert!(camera.total_frames > 0);
        assert_eq!(camera.display_frames, 0);
        assert!(camera.display_fps.is_none());
    }
    Ok(())
}

#[tokio::test]
async fn test_back_to_back_runs_get_distinct_report_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();
    let mut settings = synthetic_settings(&output_path, RunMode::MultiThread, MeasType::Read);
    settings.duration = Duration::from_millis(50);
    settings.report_formats = vec!["json".to_string()];

    let (first, _) = run_engine(settings.clone()).await?;
    let (second, _) = run_engine(settings).await?;

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(std::fs::read_dir(temp_dir.path())?.count(), 2);
    Ok(())
}

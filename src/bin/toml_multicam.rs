use clap::Parser;
use multicam::config::toml_config::TomlConfig;
use multicam::domain::model::{CameraSpec, RunMode, StreamType};
use multicam::domain::ports::ConfigProvider;
use multicam::core::worker::sibling_worker_program;
use multicam::utils::error::{ErrorSeverity, MulticamError};
use multicam::utils::{logger, preflight, redact::redact_url, validation::Validate};
use multicam::{CaptureEngine, CaptureSettings, LocalStorage, MultiCamVisualizer};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "toml-multicam")]
#[command(about = "Multi-camera FPS measurement driven by a TOML configuration file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "multicam.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Override capture duration (seconds) from config
    #[arg(long)]
    duration: Option<u64>,

    /// Override run mode from config
    #[arg(long, value_enum)]
    run_mode: Option<RunMode>,

    /// Dry run - show what would be captured without opening any camera
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if config.json_logs() {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting TOML-based multicam tool");
    tracing::info!("📁 Loaded configuration from: {}", args.config);

    if let Some(secs) = args.duration {
        config.run.duration_seconds = Some(secs);
        tracing::info!("🔧 Duration overridden to: {}s", secs);
    }
    if let Some(mode) = args.run_mode {
        config.run.run_mode = Some(mode);
        tracing::info!("🔧 Run mode overridden to: {}", mode);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");

    let settings = CaptureSettings::from_config(&config);
    display_config_summary(&config, &settings, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No camera will be opened");
        perform_dry_run(&settings).await?;
        return Ok(());
    }

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(config.output_path().to_string());
    let mut visualizer = MultiCamVisualizer::new(settings);
    if config.run_mode() == RunMode::MultiProcess {
        // Workers are served by the `multicam` binary installed alongside.
        let program = match std::env::current_exe()
            .map_err(MulticamError::from)
            .and_then(|exe| sibling_worker_program(&exe))
        {
            Ok(program) => program,
            Err(e) => exit_with(e),
        };
        tracing::info!("🧵 Worker program: {}", program.display());
        visualizer = visualizer.with_worker_program(program);
    }
    let mut engine = CaptureEngine::new_with_monitoring(visualizer, storage, monitor_enabled)
        .with_monitor_interval(config.monitoring_interval());

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("🛑 Interrupt received, stopping capture...");
            interrupt.cancel();
        }
    });

    match engine.run(cancel).await {
        Ok(output) => {
            let connected = output.report.connected_count();
            let total = output.report.cameras.len();
            if connected < total {
                tracing::warn!("⚠️ {}/{} camera(s) connected", connected, total);
            }
            tracing::info!("✅ Capture completed successfully!");
            println!("✅ Capture completed successfully! ({}/{} camera(s) connected)", connected, total);
            for path in &output.report_paths {
                println!("📁 Report saved to: {}", path);
            }
        }
        Err(e) => exit_with(e),
    }

    Ok(())
}

fn exit_with(e: MulticamError) -> ! {
    tracing::error!(
        "❌ Capture failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}

fn display_config_summary(config: &TomlConfig, settings: &CaptureSettings, args: &Args) {
    println!("📋 Configuration Summary:");
    println!("  Run: {}", config.run.name);
    if let Some(description) = &config.run.description {
        println!("  Description: {}", description);
    }
    println!("  Backend: {}", settings.stream_type);
    println!("  Mode: {}", settings.run_mode);
    println!("  Measure: {}", settings.meas_type);
    println!("  Duration: {}s", settings.duration.as_secs());
    println!("  Cameras: {}", settings.cameras.len());
    println!("  Output: {}", settings.output_path);
    println!("  Formats: {}", settings.report_formats.join(", "));

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

async fn perform_dry_run(settings: &CaptureSettings) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Dry Run Analysis:");
    println!();

    println!("📡 Cameras:");
    for camera in &settings.cameras {
        println!("  {} -> {}", camera.name, redact_url(&camera.url));
    }

    println!();
    println!("⚙️ Capture:");
    println!(
        "  Frame size: {}x{} (BGR24, {} bytes/frame)",
        settings.frame_size.width,
        settings.frame_size.height,
        settings.frame_size.frame_len()
    );
    println!("  Grab timeout: {} ms", settings.grab_timeout.as_millis());
    println!(
        "  Connect: {} attempt(s), {} ms apart",
        settings.connect_policy.attempts,
        settings.connect_policy.interval.as_millis()
    );
    println!(
        "  Worst-case connect time per camera: ~{}s",
        settings.connect_policy.budget().as_secs()
    );

    if settings.run_mode == RunMode::MultiProcess {
        println!("  Workers: {} process(es)", settings.cameras.len());
    }

    println!();
    println!("🧰 Backend tools:");
    let tools = preflight::required_tools(settings.stream_type);
    if tools.is_empty() {
        println!("  (none required)");
    }
    for tool in tools {
        match preflight::find_on_path(tool) {
            Some(path) => println!("  ✅ {} -> {}", tool, path.display()),
            None => println!("  ❌ {} not found on PATH", tool),
        }
    }

    if let Some(dir) = &settings.snapshot_dir {
        println!();
        println!("🖼️ Snapshots every {} frame(s) into {}", settings.snapshot_every, dir.display());
    }

    println!();
    println!("🧪 Synthetic pipeline check (1s at {}):", settings.frame_size);
    let mut check = settings.clone();
    check.stream_type = StreamType::Synthetic;
    check.run_mode = RunMode::Sequential;
    check.duration = Duration::from_secs(1);
    check.snapshot_dir = None;
    check.cameras = vec![CameraSpec::new("dry-run", "synthetic://dry-run")];

    let mut visualizer = MultiCamVisualizer::new(check);
    visualizer.connect_cameras().await?;
    let report = visualizer.run(CancellationToken::new()).await?;
    if let Some(camera) = report.cameras.first() {
        println!(
            "  Read FPS: {:.2}, Display FPS: {:.2}, Mean latency: {:.1} ms",
            camera.read_fps.unwrap_or(0.0),
            camera.display_fps.unwrap_or(0.0),
            camera.mean_latency_ms.unwrap_or(0.0)
        );
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during actual run.");
    Ok(())
}

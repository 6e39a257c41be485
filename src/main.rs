use clap::Parser;
use multicam::adapters::BackendFactory;
use multicam::core::worker::{render_worker_report, run_worker};
use multicam::utils::error::{ErrorSeverity, MulticamError};
use multicam::utils::{logger, preflight, validation::Validate};
use multicam::{CaptureEngine, CaptureSettings, CliConfig, LocalStorage, MultiCamVisualizer};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::parse();

    if config.is_worker() {
        return run_as_worker(config).await;
    }

    if config.json_logs {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting multicam CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    if config.check {
        match preflight::check_backend(config.stream_type) {
            Ok(tools) => {
                for tool in &tools {
                    println!("✅ {} found at {}", preflight::display_name(tool), tool.display());
                }
                return Ok(());
            }
            Err(e) => exit_with(e),
        }
    }

    let settings = CaptureSettings::from_config(&config);
    if let Err(e) = settings.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let monitor_enabled = config.monitor;
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(config.output_path.clone());
    let visualizer = MultiCamVisualizer::new(settings);
    let mut engine = CaptureEngine::new_with_monitoring(visualizer, storage, monitor_enabled);

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    match engine.run(cancel).await {
        Ok(output) => {
            tracing::info!(
                "✅ Capture completed: {}/{} camera(s) connected",
                output.report.connected_count(),
                output.report.cameras.len()
            );
            println!("✅ Capture completed successfully!");
            for path in &output.report_paths {
                println!("📁 Report saved to: {}", path);
            }
        }
        Err(e) => exit_with(e),
    }

    Ok(())
}

/// Child process of a multiprocess run. Logs go to stderr so stdout carries
/// only the JSON report line.
async fn run_as_worker(config: CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    logger::init_worker_logger(config.verbose);

    let Some(camera) = config.worker_camera() else {
        return Ok(());
    };
    let settings = CaptureSettings::from_config(&config);
    if let Err(e) = settings.validate() {
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    let report = run_worker(&settings, camera, &BackendFactory, cancel).await;
    println!("{}", render_worker_report(&report)?);
    Ok(())
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("🛑 Interrupt received, stopping capture...");
                cancel.cancel();
            }
            Err(e) => tracing::warn!("Unable to listen for Ctrl-C: {}", e),
        }
    });
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

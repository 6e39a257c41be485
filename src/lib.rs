pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use config::cli::LocalStorage;
pub use core::{
    engine::CaptureEngine, settings::CaptureSettings, visualizer::MultiCamVisualizer,
};
pub use utils::error::{MulticamError, Result};

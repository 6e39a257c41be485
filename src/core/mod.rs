pub mod display;
pub mod engine;
pub mod report;
pub mod settings;
pub mod stats;
pub mod visualizer;
pub mod worker;

pub use crate::domain::model::{CameraReport, Frame, RunReport};
pub use crate::domain::ports::{ConfigProvider, FrameSink, FrameSource, ReportStorage, SourceFactory};
pub use crate::utils::error::Result;

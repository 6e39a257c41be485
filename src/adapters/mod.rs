// Adapters layer: concrete frame sources for the external decoders plus
// the in-process synthetic camera.

pub mod ffmpeg;
pub mod gstreamer;
pub mod process;
pub mod synthetic;

use crate::core::settings::CaptureSettings;
use crate::domain::model::{CameraSpec, StreamType};
use crate::domain::ports::{FrameSource, SourceFactory};

pub use ffmpeg::{FfmpegBackend, FfmpegSource};
pub use gstreamer::{GstreamerBackend, GstreamerSource};
pub use synthetic::SyntheticSource;

/// Picks the source implementation from `settings.stream_type`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendFactory;

impl SourceFactory for BackendFactory {
    fn create(&self, camera: &CameraSpec, settings: &CaptureSettings) -> Box<dyn FrameSource> {
        match settings.stream_type {
            StreamType::Ffmpeg => Box::new(FfmpegSource::new(
                camera.clone(),
                FfmpegBackend::from_settings(settings),
                settings,
            )),
            StreamType::Gstreamer => Box::new(GstreamerSource::new(
                camera.clone(),
                GstreamerBackend::from_settings(settings),
                settings,
            )),
            StreamType::Synthetic => Box::new(SyntheticSource::new(camera.clone(), settings)),
        }
    }
}

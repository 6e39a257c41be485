use crate::adapters::ffmpeg::is_rtsp;
use crate::adapters::process::{BackendCommand, ProcessSource};
use crate::core::settings::CaptureSettings;
use crate::domain::model::{FrameSize, RtspTransport, StreamType};

pub const GST_LAUNCH_PROGRAM: &str = "gst-launch-1.0";

/// Runs a `gst-launch-1.0` pipeline ending in `fdsink fd=1`.
///
/// RTSP sources use `rtspsrc ! rtph264depay ! h264parse ! avdec_h264`;
/// other URIs go through `uridecodebin`. Both are converted and scaled to
/// packed BGR at the configured size.
#[derive(Debug, Clone)]
pub struct GstreamerBackend {
    pub program: String,
    pub frame_size: FrameSize,
    pub latency_ms: u32,
    pub transport: RtspTransport,
}

impl GstreamerBackend {
    pub fn from_settings(settings: &CaptureSettings) -> Self {
        Self {
            program: GST_LAUNCH_PROGRAM.to_string(),
            frame_size: settings.frame_size,
            latency_ms: settings.rtsp_latency_ms,
            transport: settings.rtsp_transport,
        }
    }

    fn source_elements(&self, url: &str) -> Vec<String> {
        if is_rtsp(url) {
            let mut src = vec![
                "rtspsrc".to_string(),
                format!("location={}", url),
                format!("latency={}", self.latency_ms),
            ];
            if self.transport == RtspTransport::Tcp {
                src.push("protocols=tcp".to_string());
            }
            for element in ["rtph264depay", "h264parse", "avdec_h264"] {
                src.push("!".to_string());
                src.push(element.to_string());
            }
            src
        } else {
            vec!["uridecodebin".to_string(), format!("uri={}", url)]
        }
    }
}

impl BackendCommand for GstreamerBackend {
    fn kind(&self) -> StreamType {
        StreamType::Gstreamer
    }

    fn program(&self) -> &str {
        &self.program
    }

    fn args(&self, url: &str) -> Vec<String> {
        let mut args = vec!["-q".to_string()];
        args.extend(self.source_elements(url));
        for element in [
            "videoconvert".to_string(),
            "videoscale".to_string(),
            format!(
                "video/x-raw,format=BGR,width={},height={}",
                self.frame_size.width, self.frame_size.height
            ),
        ] {
            args.push("!".to_string());
            args.push(element);
        }
        args.extend(
            ["!", "fdsink", "fd=1", "sync=false"]
                .iter()
                .map(|s| s.to_string()),
        );
        args
    }
}

pub type GstreamerSource = ProcessSource<GstreamerBackend>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtsp_pipeline() {
        let backend = GstreamerBackend::from_settings(&CaptureSettings::default());
        let args = backend.args("rtsp://cam.local:554/Streaming/Channels/201");
        assert_eq!(
            args.join(" "),
            "-q rtspsrc location=rtsp://cam.local:554/Streaming/Channels/201 latency=10 \
             protocols=tcp ! rtph264depay ! h264parse ! avdec_h264 ! videoconvert ! \
             videoscale ! video/x-raw,format=BGR,width=640,height=480 ! fdsink fd=1 sync=false"
        );
    }

    #[test]
    fn test_uri_pipeline_uses_uridecodebin() {
        let mut settings = CaptureSettings::default();
        settings.rtsp_transport = RtspTransport::Udp;
        settings.frame_size = FrameSize::new(320, 240);
        let backend = GstreamerBackend::from_settings(&settings);

        let args = backend.args("file:///videos/sample.mp4");
        assert_eq!(args[1], "uridecodebin");
        assert_eq!(args[2], "uri=file:///videos/sample.mp4");
        assert!(args.contains(&"video/x-raw,format=BGR,width=320,height=240".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("protocols=")));
    }
}

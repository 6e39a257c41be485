use crate::adapters::process::{BackendCommand, ProcessSource};
use crate::core::settings::CaptureSettings;
use crate::domain::model::{FrameSize, RtspTransport, StreamType};

pub const FFMPEG_PROGRAM: &str = "ffmpeg";

/// Decodes a stream with the `ffmpeg` CLI into raw BGR24 on stdout.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    pub program: String,
    pub frame_size: FrameSize,
    pub transport: RtspTransport,
}

impl FfmpegBackend {
    pub fn from_settings(settings: &CaptureSettings) -> Self {
        Self {
            program: FFMPEG_PROGRAM.to_string(),
            frame_size: settings.frame_size,
            transport: settings.rtsp_transport,
        }
    }
}

pub(crate) fn is_rtsp(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("rtsp://") || lower.starts_with("rtsps://")
}

impl BackendCommand for FfmpegBackend {
    fn kind(&self) -> StreamType {
        StreamType::Ffmpeg
    }

    fn program(&self) -> &str {
        &self.program
    }

    fn args(&self, url: &str) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if is_rtsp(url) {
            args.push("-rtsp_transport".to_string());
            args.push(self.transport.as_str().to_string());
        }

        args.extend([
            "-i".to_string(),
            url.to_string(),
            "-an".to_string(),
            "-vf".to_string(),
            format!("scale={}:{}", self.frame_size.width, self.frame_size.height),
            "-pix_fmt".to_string(),
            "bgr24".to_string(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }
}

pub type FfmpegSource = ProcessSource<FfmpegBackend>;

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> FfmpegBackend {
        FfmpegBackend::from_settings(&CaptureSettings::default())
    }

    #[test]
    fn test_rtsp_args() {
        let args = backend().args("rtsp://cam.local:554/Streaming/Channels/101");
        assert_eq!(
            args.join(" "),
            "-hide_banner -loglevel error -nostdin -rtsp_transport tcp \
             -i rtsp://cam.local:554/Streaming/Channels/101 -an -vf scale=640:480 \
             -pix_fmt bgr24 -f rawvideo pipe:1"
        );
    }

    #[test]
    fn test_file_input_has_no_transport_flag() {
        let args = backend().args("file:///videos/sample.mp4");
        assert!(!args.iter().any(|a| a == "-rtsp_transport"));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_udp_transport() {
        let mut b = backend();
        b.transport = RtspTransport::Udp;
        let args = b.args("RTSP://cam.local/live");
        let pos = args.iter().position(|a| a == "-rtsp_transport").unwrap();
        assert_eq!(args[pos + 1], "udp");
    }
}

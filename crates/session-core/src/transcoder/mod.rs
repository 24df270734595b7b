//! Transcoder handoff
//!
//! The negotiated SRTP streams are relayed over loopback to an ffmpeg
//! process that reads an SDP description from stdin.

pub mod process;
pub mod routing;
pub mod sdp;

use crate::config::{TranscodeConfig, VideoTranscode};

pub use process::{FfmpegSpawner, TranscoderProcess, TranscoderRequest, TranscoderSpawner};
pub use routing::{transcoder_route, TranscoderRouter};
pub use sdp::{build_transcoder_sdp, crypto_line};

/// Loopback ports the transcoder listens on. RTCP for each leg is on `port + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscoderPorts {
    pub audio: u16,
    pub video: u16,
}

const QUICK_START_ARGS: &[&str] = &[
    "-probesize",
    "32",
    "-analyzeduration",
    "1000",
    "-r",
    "15",
    "-fflags",
    "nobuffer",
    "-flags",
    "low_delay",
];

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

/// ffmpeg command line for reading the session SDP from stdin
pub fn build_ffmpeg_args(config: &TranscodeConfig) -> Vec<String> {
    let mut args = owned(&["-hide_banner", "-protocol_whitelist", "pipe,udp,rtp,file,crypto", "-f", "sdp"]);

    if config.quick_start {
        args.extend(owned(QUICK_START_ARGS));
    }

    args.extend(config.input.iter().cloned());
    args.extend(owned(&["-i", "pipe:"]));

    match &config.audio {
        Some(audio) => args.extend(audio.iter().cloned()),
        None => args.extend(owned(&["-acodec", "aac"])),
    }

    // Quick start leaves video codec selection to the output args
    if !config.quick_start {
        match &config.video {
            VideoTranscode::Copy => args.extend(owned(&["-vcodec", "copy"])),
            VideoTranscode::Args(video) => args.extend(video.iter().cloned()),
            VideoTranscode::Disabled => {}
        }
    }

    args.extend(config.output.iter().cloned());
    args
}

/// Label transcoder output is logged under
pub fn log_label(camera_name: &str) -> String {
    format!("From camera ({})", camera_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(args: &[&str]) -> Vec<String> {
        owned(args)
    }

    #[test]
    fn default_args_copy_video_and_encode_aac() {
        let config = TranscodeConfig::new(strings(&["-f", "mpegts", "udp://127.0.0.1:9000"]));
        assert_eq!(
            build_ffmpeg_args(&config),
            strings(&[
                "-hide_banner",
                "-protocol_whitelist",
                "pipe,udp,rtp,file,crypto",
                "-f",
                "sdp",
                "-i",
                "pipe:",
                "-acodec",
                "aac",
                "-vcodec",
                "copy",
                "-f",
                "mpegts",
                "udp://127.0.0.1:9000",
            ])
        );
    }

    #[test]
    fn quick_start_adds_probe_flags_and_skips_video_args() {
        let config = TranscodeConfig {
            input: strings(&["-re"]),
            audio: Some(strings(&["-acodec", "libopus"])),
            video: VideoTranscode::Args(strings(&["-vcodec", "libx264"])),
            output: strings(&["out.mp4"]),
            quick_start: true,
        };
        let args = build_ffmpeg_args(&config);

        assert_eq!(&args[5..15], &strings(QUICK_START_ARGS)[..]);
        assert_eq!(&args[15..], &strings(&["-re", "-i", "pipe:", "-acodec", "libopus", "out.mp4"])[..]);
    }

    #[test]
    fn disabled_video_has_no_video_args() {
        let config = TranscodeConfig {
            video: VideoTranscode::Disabled,
            output: strings(&["out.aac"]),
            ..Default::default()
        };
        let args = build_ffmpeg_args(&config);
        assert!(!args.iter().any(|arg| arg == "-vcodec"));
        assert_eq!(args.last().map(String::as_str), Some("out.aac"));
    }

    #[test]
    fn label_names_the_camera() {
        assert_eq!(log_label("Front Door"), "From camera (Front Door)");
    }
}

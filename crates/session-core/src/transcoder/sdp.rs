//! SDP fed to the transcoder on stdin

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use super::TranscoderPorts;
use crate::config::TranscodeConfig;
use crate::types::{RtpDescription, SrtpParams};

/// Only suite the cameras negotiate
pub const CRYPTO_SUITE: &str = "AES_CM_128_HMAC_SHA1_80";

/// RFC 4568 `a=crypto` line for `srtp`, or `None` without key material
pub fn crypto_line(srtp: &SrtpParams) -> Option<String> {
    if srtp.is_empty() {
        return None;
    }

    let mut material = Vec::with_capacity(srtp.key.len() + srtp.salt.len());
    material.extend_from_slice(&srtp.key);
    material.extend_from_slice(&srtp.salt);

    Some(format!("a=crypto:1 {} inline:{}", CRYPTO_SUITE, BASE64.encode(material)))
}

/// Describe the remote streams as if they arrived on the transcoder ports.
///
/// Audio is PCMU; video (when enabled) is H264 on payload type 99. Both use
/// the remote crypto parameters so ffmpeg can decrypt what is relayed.
pub fn build_transcoder_sdp(remote: &RtpDescription, ports: TranscoderPorts, config: &TranscodeConfig) -> String {
    let mut lines: Vec<Option<String>> = vec![
        Some("v=0".into()),
        Some("o=105202070 3747 461 IN IP4 127.0.0.1".into()),
        Some("s=Talk".into()),
        Some("c=IN IP4 127.0.0.1".into()),
        Some("b=AS:380".into()),
        Some("t=0 0".into()),
        Some("a=rtcp-xr:rcvr-rtt=all:10000 stat-summary=loss,dup,jitt,TTL voip-metrics".into()),
        Some(format!("m=audio {} RTP/SAVP 0 101", ports.audio)),
        Some("a=rtpmap:0 PCMU/8000".into()),
        crypto_line(&remote.audio.srtp),
        Some("a=rtcp-mux".into()),
    ];

    if config.video_enabled() {
        lines.push(Some(format!("m=video {} RTP/SAVP 99", ports.video)));
        lines.push(Some("a=rtpmap:99 H264/90000".into()));
        if config.quick_start {
            lines.push(Some("a=framesize:99 1920-1080".into()));
        }
        lines.push(crypto_line(&remote.video.srtp));
        lines.push(Some("a=rtcp-mux".into()));
    }

    lines
        .into_iter()
        .flatten()
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

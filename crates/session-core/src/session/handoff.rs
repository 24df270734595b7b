//! Wiring between a session and its transcoder
//!
//! The two lifetimes end each other: transcoder exit tears the session down,
//! and teardown stops the transcoder.

use std::sync::Arc;

use tracing::{debug, info};

use super::SessionInner;
use crate::config::TranscodeConfig;
use crate::errors::Result;
use crate::transcoder::{
    build_ffmpeg_args, build_transcoder_sdp, process::TranscoderRequest, TranscoderPorts, TranscoderRouter,
};
use crate::types::RtpDescription;

pub(super) fn start_transcoder(
    session: &Arc<SessionInner>,
    config: &TranscodeConfig,
    remote: &RtpDescription,
    ports: TranscoderPorts,
) -> Result<()> {
    let request = TranscoderRequest {
        program: session.config.ffmpeg_path.clone(),
        args: build_ffmpeg_args(config),
        sdp: build_transcoder_sdp(remote, ports, config),
        log_label: crate::transcoder::log_label(session.camera.name()),
    };
    debug!("Transcoder SDP:\n{}", request.sdp);

    let process = session.transcoder.spawn(request)?;

    let mut exited = process.exited();
    let weak = Arc::downgrade(session);
    session.subscriptions.spawn_then(
        "transcoder exit",
        async move {
            // A dropped sender means the process is gone as well
            let _ = exited.wait_for(|exited| *exited).await;
        },
        move |_| async move {
            if let Some(session) = weak.upgrade() {
                info!(camera = %session.camera.name(), "Transcoder exited, ending session");
                session.call_ended(true).await;
            }
        },
    );
    session.subscriptions.add(move || process.stop());

    let router = TranscoderRouter::new(ports, session.codec.clone());
    if config.video_enabled() {
        let weak = Arc::downgrade(session);
        let handler = router.video_handler(move || {
            if let Some(session) = weak.upgrade() {
                session.request_key_frame_in_background();
            }
        });
        session.subscriptions.add_message_handler(&session.media.video, handler);
    }
    session
        .subscriptions
        .add_message_handler(&session.media.audio, router.audio_handler());

    Ok(())
}

//! RTP latching for remotes without ICE
//!
//! Two activities per session. A keep-alive timer sends a STUN probe to the
//! remote RTP and RTCP endpoint of both legs on every tick, for the whole
//! session. Each leg also streams synthetic RTP at its remote RTP endpoint
//! until the first inbound datagram arrives on that leg's media path.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::NatContext;
use crate::media::{MediaPath, RtpLatchGenerator};
use crate::types::MediaKind;
use crate::stun::send_keep_alive;

pub fn start_rtp_latch(ctx: &NatContext<'_>) {
    debug!("Remote offers no ICE, latching media paths");
    start_keep_alive(ctx);

    for kind in [MediaKind::Audio, MediaKind::Video] {
        start_latch_stream(ctx, kind, RtpLatchGenerator::for_kind(kind));
    }
}

fn start_keep_alive(ctx: &NatContext<'_>) {
    let codec = ctx.codec.clone();
    let audio = ctx.media.audio.clone();
    let video = ctx.media.video.clone();
    let audio_targets = [ctx.remote.rtp_addr(MediaKind::Audio), ctx.remote.rtcp_addr(MediaKind::Audio)];
    let video_targets = [ctx.remote.rtp_addr(MediaKind::Video), ctx.remote.rtcp_addr(MediaKind::Video)];
    let period = ctx.config.keep_alive_interval();

    ctx.subscriptions.spawn("stun keep-alive", async move {
        // First tick fires immediately
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            // Fresh transaction per leg and tick
            send_keep_alive(audio.as_ref(), &codec.keep_alive(), &audio_targets).await;
            send_keep_alive(video.as_ref(), &codec.keep_alive(), &video_targets).await;
        }
    });
}

fn start_latch_stream(ctx: &NatContext<'_>, kind: MediaKind, mut generator: RtpLatchGenerator) {
    let path: Arc<dyn MediaPath> = ctx.media.get(kind).clone();
    let target = ctx.remote.rtp_addr(kind);
    let period: Duration = ctx.config.latch_interval();

    // Subscribed before the task starts so an early packet still stops the stream
    let mut inbound = path.subscribe();

    ctx.subscriptions.spawn(&format!("{} rtp latch", kind), async move {
        let mut interval = tokio::time::interval(period);
        let mut sent = 0usize;

        loop {
            tokio::select! {
                biased;
                // Any outcome means traffic arrived or the path went away
                _ = inbound.recv() => break,
                _ = interval.tick() => {
                    if let Err(e) = path.send(generator.next_packet(), target).await {
                        trace!("Failed to send {} latch packet to {}: {}", kind, target, e);
                    }
                    sent += 1;
                }
            }
        }

        debug!("{} latched after {} packets", kind, sent);
    });
}

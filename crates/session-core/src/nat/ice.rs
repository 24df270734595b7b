//! ICE strategy: answer connectivity checks and send one of our own per leg

use tracing::{debug, error};

use super::NatContext;
use crate::types::MediaKind;
use crate::stun::{create_stun_responder, send_stun_binding_request};

pub fn start_ice(ctx: &NatContext<'_>) {
    debug!("Remote offers ICE, answering connectivity checks");

    create_stun_responder(&ctx.media.video, ctx.codec.clone(), ctx.subscriptions);
    create_stun_responder(&ctx.media.audio, ctx.codec.clone(), ctx.subscriptions);

    for kind in [MediaKind::Video, MediaKind::Audio] {
        let codec = ctx.codec.clone();
        let path = ctx.media.get(kind).clone();
        let remote = ctx.remote.clone();
        let local_ufrag = ctx.call.local_ufrag(kind);
        let timeout = ctx.config.stun_request_timeout();

        ctx.subscriptions.spawn(&format!("{} stun binding", kind), async move {
            match send_stun_binding_request(codec.as_ref(), &local_ufrag, &remote, path.as_ref(), kind, timeout)
                .await
            {
                Ok(_) => debug!("{} stun complete", kind),
                Err(e) => error!("{} stun error: {}", kind, e),
            }
        });
    }
}

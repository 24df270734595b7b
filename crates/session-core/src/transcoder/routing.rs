//! Relay of inbound media to the transcoder ports

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sipcam_ice_core::StunCodec;

use super::TranscoderPorts;
use crate::media::{ForwardTarget, InboundMessage, MessageHandler};

/// Where `message` goes for a transcoder listening on `port`.
///
/// STUN, as classified by `codec`, is never relayed. RTP goes to `port` and
/// RTCP to `port + 1`.
pub fn transcoder_route(codec: &dyn StunCodec, message: &InboundMessage, port: u16) -> Option<ForwardTarget> {
    if codec.is_stun(&message.message) {
        return None;
    }

    Some(ForwardTarget {
        port: if message.is_rtp { port } else { port.wrapping_add(1) },
    })
}

/// Builds the media path handlers for one transcoder
#[derive(Clone)]
pub struct TranscoderRouter {
    ports: TranscoderPorts,
    codec: Arc<dyn StunCodec>,
}

impl TranscoderRouter {
    pub fn new(ports: TranscoderPorts, codec: Arc<dyn StunCodec>) -> Self {
        Self { ports, codec }
    }

    pub fn audio_handler(&self) -> MessageHandler {
        let port = self.ports.audio;
        let codec = self.codec.clone();
        Arc::new(move |message| transcoder_route(codec.as_ref(), message, port))
    }

    /// Video handler that calls `on_first_packet` for the first relayed
    /// datagram only
    pub fn video_handler(&self, on_first_packet: impl Fn() + Send + Sync + 'static) -> MessageHandler {
        let port = self.ports.video;
        let codec = self.codec.clone();
        let seen_stream = AtomicBool::new(false);

        Arc::new(move |message| {
            let target = transcoder_route(codec.as_ref(), message, port)?;
            if !seen_stream.swap(true, Ordering::SeqCst) {
                on_first_packet();
            }
            Some(target)
        })
    }
}

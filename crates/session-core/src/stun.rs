//! STUN traffic on media paths
//!
//! Connectivity checks and keep-alives share the media sockets with RTP.
//! Nothing here is allowed to fail a session: send and decode errors are
//! logged by the callers and the media path keeps running.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use sipcam_ice_core::{is_binding_request, StunCodec, StunMessage, StunMessageType};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, trace};

use crate::errors::{Result, SessionError};
use crate::media::{HandlerId, MediaPath, MessageHandler};
use crate::session::Subscriptions;
use crate::types::{MediaKind, RtpDescription};

pub use sipcam_ice_core::is_stun_message;

/// Handler answering inbound Binding Requests with a Binding Response
/// carrying the observed source as XOR-MAPPED-ADDRESS.
///
/// The handler never claims a datagram, so STUN is consumed here and not
/// relayed anywhere.
pub fn stun_responder_handler(path: &Arc<dyn MediaPath>, codec: Arc<dyn StunCodec>) -> MessageHandler {
    let path: Weak<dyn MediaPath> = Arc::downgrade(path);

    Arc::new(move |inbound| {
        if !codec.is_stun(&inbound.message) {
            return None;
        }

        let request = match codec.decode(&inbound.message) {
            Ok(request) => request,
            Err(e) => {
                debug!("Failed to decode STUN message from {}: {}", inbound.source, e);
                trace!("Undecodable STUN message: {:02x?}", &inbound.message[..]);
                return None;
            }
        };

        if !is_binding_request(&request) {
            trace!("Ignoring STUN {:?} from {}", request.msg_type, inbound.source);
            return None;
        }

        let Some(path) = path.upgrade() else {
            return None;
        };
        let response = codec.binding_response(&request, inbound.source);
        let source = inbound.source;
        tokio::spawn(async move {
            if let Err(e) = path.send(response, source).await {
                error!("Failed to send STUN binding response to {}: {}", source, e);
            }
        });

        None
    })
}

/// Attach a STUN responder to `path` for the lifetime of `subscriptions`
pub fn create_stun_responder(
    path: &Arc<dyn MediaPath>,
    codec: Arc<dyn StunCodec>,
    subscriptions: &Subscriptions,
) -> HandlerId {
    let handler = stun_responder_handler(path, codec);
    subscriptions.add_message_handler(path, handler)
}

/// Send an ICE connectivity check for `kind` and wait for its response.
///
/// The request carries USERNAME `<remote ufrag>:<local ufrag>` and
/// MESSAGE-INTEGRITY keyed with the remote ICE password. It is sent once to
/// the remote RTP endpoint; the matching Binding Response must arrive on the
/// same media path within `timeout`.
pub async fn send_stun_binding_request(
    codec: &dyn StunCodec,
    local_ufrag: &str,
    remote: &RtpDescription,
    path: &dyn MediaPath,
    kind: MediaKind,
    timeout: Duration,
) -> Result<StunMessage> {
    let stream = remote.stream(kind);
    let (remote_ufrag, remote_pwd) = stream.ice_credentials().ok_or_else(|| {
        SessionError::Stun(sipcam_ice_core::Error::stun(format!("no ICE credentials offered for {}", kind)))
    })?;

    let (request, encoded) = codec.ice_binding_request(remote_ufrag, local_ufrag, remote_pwd)?;
    let target = remote.rtp_addr(kind);

    // Subscribe before sending so a fast response cannot slip past
    let mut messages = path.subscribe();
    path.send(encoded, target).await?;
    debug!("Sent {} STUN binding request to {}", kind, target);

    let wait = async {
        loop {
            let inbound = match messages.recv().await {
                Ok(inbound) => inbound,
                Err(RecvError::Lagged(skipped)) => {
                    trace!("STUN waiter lagged by {} datagrams", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return Err(SessionError::MediaPathClosed),
            };

            if !codec.is_stun(&inbound.message) {
                continue;
            }
            let Ok(message) = codec.decode(&inbound.message) else {
                continue;
            };
            if message.transaction_id != request.transaction_id {
                continue;
            }

            return match message.msg_type {
                StunMessageType::BindingResponse => Ok(message),
                StunMessageType::BindingErrorResponse => Err(SessionError::Stun(
                    sipcam_ice_core::Error::stun(format!("{} binding request rejected by {}", kind, inbound.source)),
                )),
                _ => continue,
            };
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| SessionError::timeout(format!("{} STUN binding response from {}", kind, target)))?
}

/// Send the same keep-alive probe to every target, logging failures
pub(crate) async fn send_keep_alive(path: &dyn MediaPath, probe: &bytes::Bytes, targets: &[SocketAddr]) {
    for target in targets {
        if let Err(e) = path.send(probe.clone(), *target).await {
            debug!("Failed to send STUN keep-alive to {}: {}", target, e);
        }
    }
}

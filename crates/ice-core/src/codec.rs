//! Injectable STUN codec
//!
//! Media-path helpers never touch the wire format directly; they go through a
//! [`StunCodec`] so tests can substitute a double.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::error::Result;
use crate::stun::{is_stun_message, StunAttribute, StunMessage, StunMessageType};

/// Stateless STUN encode/decode capability
pub trait StunCodec: Send + Sync {
    /// Whether a datagram looks like STUN rather than media
    fn is_stun(&self, data: &[u8]) -> bool {
        is_stun_message(data)
    }

    /// Decode a datagram
    fn decode(&self, data: &[u8]) -> Result<StunMessage>;

    /// Encode a message without integrity protection
    fn encode(&self, message: &StunMessage) -> Bytes;

    /// Encode a message and append MESSAGE-INTEGRITY keyed with `key`
    fn encode_with_integrity(&self, message: &StunMessage, key: &[u8]) -> Result<Bytes>;

    /// Bare Binding request used as a keep-alive probe
    fn keep_alive(&self) -> Bytes {
        self.encode(&StunMessage::binding_request())
    }

    /// ICE connectivity check: Binding request with USERNAME
    /// `<remote_ufrag>:<local_ufrag>`, authenticated with the remote password.
    fn ice_binding_request(
        &self,
        remote_ufrag: &str,
        local_ufrag: &str,
        remote_pwd: &str,
    ) -> Result<(StunMessage, Bytes)> {
        let mut request = StunMessage::binding_request();
        request.add_attribute(StunAttribute::username(&format!("{}:{}", remote_ufrag, local_ufrag)));
        let encoded = self.encode_with_integrity(&request, remote_pwd.as_bytes())?;
        Ok((request, encoded))
    }

    /// Binding response echoing `request`'s transaction id and reporting `source`
    fn binding_response(&self, request: &StunMessage, source: SocketAddr) -> Bytes {
        let mut response = StunMessage::binding_response(request.transaction_id);
        response.add_attribute(StunAttribute::xor_mapped_address(source, &request.transaction_id));
        self.encode(&response)
    }
}

/// RFC 5389 codec backed by [`StunMessage`]
#[derive(Debug, Default, Clone, Copy)]
pub struct Rfc5389Codec;

impl StunCodec for Rfc5389Codec {
    fn decode(&self, data: &[u8]) -> Result<StunMessage> {
        StunMessage::decode(data)
    }

    fn encode(&self, message: &StunMessage) -> Bytes {
        message.encode()
    }

    fn encode_with_integrity(&self, message: &StunMessage, key: &[u8]) -> Result<Bytes> {
        message.encode_with_integrity(key)
    }
}

/// True for the message types a responder should answer
pub fn is_binding_request(message: &StunMessage) -> bool {
    message.msg_type == StunMessageType::BindingRequest
}

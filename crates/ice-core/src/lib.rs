//! STUN support for keeping camera media paths open across NAT.
//!
//! This crate provides the binding-message subset of RFC 5389 used for ICE
//! connectivity checks (RFC 8445 short-term credentials) and keep-alive
//! probing. It has no I/O of its own; callers hand it datagrams.

pub mod error;

pub mod stun;

pub mod codec;

pub use codec::{is_binding_request, Rfc5389Codec, StunCodec};
pub use error::{Error, Result};
pub use stun::{
    is_stun_message, verify_message_integrity, StunAttribute, StunAttributeType, StunMessage,
    StunMessageType,
};

/// Re-export of common types
pub mod prelude {
    pub use super::{
        is_stun_message, Error, Result, Rfc5389Codec, StunAttribute, StunCodec, StunMessage,
        StunMessageType,
    };
}

/// STUN protocol constants
pub mod constants {
    pub use crate::stun::{STUN_HEADER_SIZE, STUN_MAGIC_COOKIE};
}

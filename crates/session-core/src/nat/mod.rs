//! NAT traversal for the negotiated media paths
//!
//! A remote that offers ICE credentials gets STUN responders and one
//! connectivity check per media type. Anything else is latched: keep-alive
//! probes to all four remote endpoints plus synthetic RTP until the camera
//! starts talking.

pub mod ice;
pub mod rtp_latch;

use std::fmt;
use std::sync::Arc;

use sipcam_ice_core::StunCodec;

use crate::config::SessionConfig;
use crate::media::MediaPaths;
use crate::session::Subscriptions;
use crate::signaling::SignalingCall;
use crate::types::RtpDescription;

pub use ice::start_ice;
pub use rtp_latch::start_rtp_latch;

/// How the session keeps its media paths reachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatStrategy {
    Ice,
    RtpLatch,
}

impl NatStrategy {
    /// Chosen once per session from the remote description
    pub fn select(remote: &RtpDescription) -> Self {
        if remote.offers_ice() {
            Self::Ice
        } else {
            Self::RtpLatch
        }
    }
}

impl fmt::Display for NatStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ice => write!(f, "ice"),
            Self::RtpLatch => write!(f, "rtp-latch"),
        }
    }
}

/// Everything a strategy needs from the session that runs it
pub struct NatContext<'a> {
    pub media: &'a MediaPaths,
    pub remote: &'a RtpDescription,
    pub call: &'a Arc<dyn SignalingCall>,
    pub codec: &'a Arc<dyn StunCodec>,
    pub config: &'a SessionConfig,
    pub subscriptions: &'a Subscriptions,
}

/// Select a strategy for `ctx.remote` and start it
pub fn start_nat_traversal(ctx: &NatContext<'_>) -> NatStrategy {
    let strategy = NatStrategy::select(ctx.remote);
    match strategy {
        NatStrategy::Ice => start_ice(ctx),
        NatStrategy::RtpLatch => start_rtp_latch(ctx),
    }
    strategy
}

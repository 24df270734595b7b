//! Media paths: bound UDP sockets carrying one RTP/RTCP leg each
//!
//! A media path demultiplexes inbound datagrams. Every datagram is published
//! on the path's message stream, then offered to the registered handlers in
//! registration order; the first handler that returns a [`ForwardTarget`]
//! decides where the datagram is relayed on the loopback interface. A
//! datagram no handler claims is dropped.

pub mod latch_generator;
pub mod ports;
pub mod udp;

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::errors::Result;
use crate::types::{MediaKind, RtpOptions};

pub use latch_generator::RtpLatchGenerator;
pub use ports::{PortLedger, PortReserver, UdpPortReserver};
pub use udp::UdpMediaPath;

/// One inbound datagram
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message: Bytes,
    pub source: SocketAddr,
    /// RTP rather than RTCP, per the RFC 5761 demultiplexing rule
    pub is_rtp: bool,
}

impl InboundMessage {
    pub fn new(message: Bytes, source: SocketAddr) -> Self {
        let is_rtp = is_rtp_message(&message);
        Self {
            message,
            source,
            is_rtp,
        }
    }
}

/// Loopback port a handler wants a datagram relayed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardTarget {
    pub port: u16,
}

/// Inspects an inbound datagram and optionally claims it for forwarding
pub type MessageHandler = Arc<dyn Fn(&InboundMessage) -> Option<ForwardTarget> + Send + Sync>;

/// Identifies a registered handler so it can be removed again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// RTCP packet types 192..=223 occupy the second byte; anything else is RTP
pub fn is_rtp_message(data: &[u8]) -> bool {
    data.len() >= 2 && !(192..=223).contains(&data[1])
}

/// A bound UDP socket owned by one session
#[async_trait]
pub trait MediaPath: Send + Sync {
    fn local_port(&self) -> u16;

    fn add_message_handler(&self, handler: MessageHandler) -> HandlerId;

    fn remove_message_handler(&self, id: HandlerId);

    async fn send(&self, data: Bytes, target: SocketAddr) -> Result<()>;

    /// Stream of every inbound datagram, regardless of handlers
    fn subscribe(&self) -> broadcast::Receiver<InboundMessage>;

    /// Stop receiving and release the socket. Further calls are no-ops.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Ordered handler list shared by media path implementations
#[derive(Default)]
pub struct HandlerChain {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(HandlerId, MessageHandler)>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handler: MessageHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, handler));
        id
    }

    pub fn remove(&self, id: HandlerId) {
        self.handlers.write().retain(|(existing, _)| *existing != id);
    }

    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offer `message` to each handler in order; the first claim wins
    pub fn route(&self, message: &InboundMessage) -> Option<ForwardTarget> {
        // Handlers may spawn work that registers more handlers, so run them
        // against a snapshot rather than under the lock.
        let handlers: Vec<MessageHandler> =
            self.handlers.read().iter().map(|(_, h)| h.clone()).collect();
        handlers.iter().find_map(|handler| handler(message))
    }
}

/// The audio and video media paths of a session
#[derive(Clone)]
pub struct MediaPaths {
    pub audio: Arc<dyn MediaPath>,
    pub video: Arc<dyn MediaPath>,
}

impl MediaPaths {
    pub fn new(audio: Arc<dyn MediaPath>, video: Arc<dyn MediaPath>) -> Self {
        Self { audio, video }
    }

    /// Bind UDP media paths on the local RTP ports of `rtp_options`
    pub async fn bind_udp(ip: IpAddr, rtp_options: &RtpOptions) -> Result<Self> {
        let audio = UdpMediaPath::bind(SocketAddr::new(ip, rtp_options.audio.port)).await?;
        let video = UdpMediaPath::bind(SocketAddr::new(ip, rtp_options.video.port)).await?;
        Ok(Self::new(Arc::new(audio), Arc::new(video)))
    }

    pub fn get(&self, kind: MediaKind) -> &Arc<dyn MediaPath> {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }
}

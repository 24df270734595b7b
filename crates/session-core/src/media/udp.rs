//! UDP media path backed by a tokio socket

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{ForwardTarget, HandlerChain, HandlerId, InboundMessage, MediaPath, MessageHandler};
use crate::errors::{Result, SessionError};

// Default channel capacity
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

// Large enough for any RTP packet on a 1500 byte MTU with room to spare
const RECEIVE_BUFFER_SIZE: usize = 4096;

/// Media path on a bound UDP socket
#[derive(Clone)]
pub struct UdpMediaPath {
    inner: Arc<UdpMediaPathInner>,
}

struct UdpMediaPathInner {
    // Taken on close so the port is released even while clones are alive
    socket: RwLock<Option<Arc<UdpSocket>>>,
    local_addr: SocketAddr,
    handlers: HandlerChain,
    messages_tx: broadcast::Sender<InboundMessage>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl UdpMediaPath {
    /// Bind a media path and start its receive loop
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        debug!("Media path bound to {}", local_addr);

        let (messages_tx, _) = broadcast::channel(DEFAULT_CHANNEL_CAPACITY);
        let path = UdpMediaPath {
            inner: Arc::new(UdpMediaPathInner {
                socket: RwLock::new(Some(Arc::new(socket))),
                local_addr,
                handlers: HandlerChain::new(),
                messages_tx,
                closed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        };

        path.spawn_receive_loop();
        Ok(path)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    fn spawn_receive_loop(&self) {
        let inner = self.inner.clone();
        let Some(socket) = inner.socket.read().clone() else {
            return;
        };

        tokio::spawn(async move {
            let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];

            loop {
                let received = tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    received = socket.recv_from(&mut buf) => received,
                };

                match received {
                    Ok((len, source)) => {
                        let message = InboundMessage::new(Bytes::copy_from_slice(&buf[..len]), source);
                        trace!("{} byte datagram from {} on {}", len, source, inner.local_addr);

                        // Nobody listening is fine
                        let _ = inner.messages_tx.send(message.clone());

                        if let Some(ForwardTarget { port }) = inner.handlers.route(&message) {
                            let target = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
                            if let Err(e) = socket.send_to(&message.message, target).await {
                                debug!("Failed to forward datagram to {}: {}", target, e);
                            }
                        }
                    }
                    Err(e) => {
                        if inner.closed.load(Ordering::Relaxed) {
                            break;
                        }
                        // ICMP port unreachable surfaces here on some platforms; keep going
                        warn!("Error receiving on media path {}: {}", inner.local_addr, e);
                    }
                }
            }

            debug!("Media path {} receive loop terminated", inner.local_addr);
        });
    }
}

#[async_trait]
impl MediaPath for UdpMediaPath {
    fn local_port(&self) -> u16 {
        self.inner.local_addr.port()
    }

    fn add_message_handler(&self, handler: MessageHandler) -> HandlerId {
        self.inner.handlers.add(handler)
    }

    fn remove_message_handler(&self, id: HandlerId) {
        self.inner.handlers.remove(id);
    }

    async fn send(&self, data: Bytes, target: SocketAddr) -> Result<()> {
        let socket = self
            .inner
            .socket
            .read()
            .clone()
            .ok_or(SessionError::MediaPathClosed)?;
        socket.send_to(&data, target).await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<InboundMessage> {
        self.inner.messages_tx.subscribe()
    }

    fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.handlers.clear();
        self.inner.shutdown.cancel();
        self.inner.socket.write().take();
        debug!("Closed media path {}", self.inner.local_addr);
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for UdpMediaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UdpMediaPath({})", self.inner.local_addr)
    }
}

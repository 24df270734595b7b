//! Local port reservation
//!
//! Reserved ports are only bookkeeping: the reserver probes that a port is
//! free, then remembers it so it is not handed out twice. The process that
//! actually binds it (the transcoder) comes later.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::errors::{Result, SessionError};

/// Reserves and releases local ports
#[async_trait]
pub trait PortReserver: Send + Sync {
    /// Reserve `count` consecutive free ports
    async fn reserve_ports(&self, count: usize) -> Result<Vec<u16>>;

    fn release_ports(&self, ports: &[u16]);
}

/// Reserves UDP ports by probing the OS with ephemeral binds
pub struct UdpPortReserver {
    bind_ip: IpAddr,
    max_attempts: usize,
    reserved: Mutex<HashSet<u16>>,
}

impl Default for UdpPortReserver {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

impl UdpPortReserver {
    pub fn new(bind_ip: IpAddr) -> Self {
        Self {
            bind_ip,
            max_attempts: 100,
            reserved: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Ports currently held by this reserver
    pub fn reserved(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.reserved.lock().iter().copied().collect();
        ports.sort_unstable();
        ports
    }

    fn try_reserve_run(&self, count: usize) -> Option<Vec<u16>> {
        // Keep every probe socket alive until the whole run is known to be free
        let first = UdpSocket::bind(SocketAddr::new(self.bind_ip, 0)).ok()?;
        let first_port = first.local_addr().ok()?.port();
        let mut probes = vec![first];

        for offset in 1..count {
            let port = first_port.checked_add(offset as u16)?;
            probes.push(UdpSocket::bind(SocketAddr::new(self.bind_ip, port)).ok()?);
        }

        let ports: Vec<u16> = (0..count as u16).map(|offset| first_port + offset).collect();

        let mut reserved = self.reserved.lock();
        if ports.iter().any(|port| reserved.contains(port)) {
            return None;
        }
        reserved.extend(ports.iter().copied());
        Some(ports)
    }
}

#[async_trait]
impl PortReserver for UdpPortReserver {
    async fn reserve_ports(&self, count: usize) -> Result<Vec<u16>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        for attempt in 0..self.max_attempts {
            if let Some(ports) = self.try_reserve_run(count) {
                debug!("Reserved ports {:?}", ports);
                return Ok(ports);
            }
            trace!("Port reservation attempt {} for {} ports failed", attempt + 1, count);
            tokio::task::yield_now().await;
        }

        Err(SessionError::port_reservation(format!(
            "no run of {} free ports after {} attempts",
            count, self.max_attempts
        )))
    }

    fn release_ports(&self, ports: &[u16]) {
        let mut reserved = self.reserved.lock();
        for port in ports {
            reserved.remove(port);
        }
        debug!("Released ports {:?}", ports);
    }
}

/// Append-only record of every port a session reserved.
///
/// Anything that reserves on behalf of the session appends here; only
/// teardown drains it.
#[derive(Debug, Clone, Default)]
pub struct PortLedger {
    ports: Arc<Mutex<Vec<u16>>>,
}

impl PortLedger {
    pub fn new(initial: impl IntoIterator<Item = u16>) -> Self {
        Self {
            ports: Arc::new(Mutex::new(initial.into_iter().collect())),
        }
    }

    pub fn append(&self, ports: &[u16]) {
        self.ports.lock().extend_from_slice(ports);
    }

    pub fn snapshot(&self) -> Vec<u16> {
        self.ports.lock().clone()
    }

    pub(crate) fn take_all(&self) -> Vec<u16> {
        std::mem::take(&mut *self.ports.lock())
    }
}

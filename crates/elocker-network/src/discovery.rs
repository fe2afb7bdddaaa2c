//! UDP broadcast discovery of the sensor peer.
//!
//! The gateway repeatedly broadcasts a fixed ASCII probe. The peer answers
//! with a fixed reply from the port it will accept the TCP session on; the
//! first matching reply ends discovery.

use elocker_core::constants::{
    DEFAULT_DISCOVERY_INTERVAL, DISCOVERY_BROADCAST_ADDR, DISCOVERY_PORT, DISCOVERY_PROBE,
    DISCOVERY_REPLY,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

const RECV_BUFFER_SIZE: usize = 512;

/// Discovery parameters.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Local address the probe socket binds to.
    pub bind_addr: SocketAddr,

    /// Where probes are sent.
    pub target: SocketAddr,

    pub interval: Duration,
    pub probe: String,

    /// Expected answer, compared after trimming whitespace.
    pub reply: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let broadcast = DISCOVERY_BROADCAST_ADDR
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V4(Ipv4Addr::BROADCAST));
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DISCOVERY_PORT),
            target: SocketAddr::new(broadcast, DISCOVERY_PORT),
            interval: Duration::from_millis(DEFAULT_DISCOVERY_INTERVAL),
            probe: DISCOVERY_PROBE.to_string(),
            reply: DISCOVERY_REPLY.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The probe socket could not be bound.
    #[error("Failed to bind discovery socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broadcast prober.
pub struct Discovery {
    config: DiscoveryConfig,
}

impl Discovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Probe until the peer answers and return its address.
    ///
    /// Send failures are logged and retried on the next tick; only a bind
    /// failure or a broken receive ends discovery with an error.
    pub async fn run(&self) -> Result<SocketAddr, DiscoveryError> {
        let socket = UdpSocket::bind(self.config.bind_addr)
            .await
            .map_err(|source| DiscoveryError::Bind {
                addr: self.config.bind_addr,
                source,
            })?;
        socket.set_broadcast(true)?;

        info!(
            local = %socket.local_addr()?,
            target = %self.config.target,
            "Broadcasting discovery probe"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    trace!(target = %self.config.target, "Sending probe");
                    if let Err(e) = socket.send_to(self.config.probe.as_bytes(), self.config.target).await {
                        warn!(error = %e, "Failed to send discovery probe");
                    }
                }
                received = socket.recv_from(&mut buf) => {
                    let (len, from) = received?;
                    if self.is_reply(&buf[..len]) {
                        info!(peer = %from, "Found sensor peer");
                        return Ok(from);
                    }
                    debug!(from = %from, len, "Ignoring datagram");
                }
            }
        }
    }

    fn is_reply(&self, datagram: &[u8]) -> bool {
        std::str::from_utf8(datagram)
            .map(|text| text.trim() == self.config.reply)
            .unwrap_or(false)
    }
}

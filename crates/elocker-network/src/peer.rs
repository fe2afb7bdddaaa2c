//! Self-healing TCP session to the sensor peer.
//!
//! ```text
//!            connect ok                 close / error
//! Connecting ──────────> Connected ─────────────────> Reconnecting
//!     ^  │                                                 │
//!     │  └─ connect error ────────────────────────────────>│
//!     └──────────────────── sleep(backoff) ────────────────┘
//! ```
//!
//! One loop owns the session, so at most one reconnect is ever pending.

use elocker_core::constants::{RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY};
use elocker_protocol::{DeviceReading, ReadingsCodec};
use futures::StreamExt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::backoff::ReconnectBackoff;

const DEFAULT_CONNECT_TIMEOUT: u64 = 3000;

/// Session lifecycle as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Discovering,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone)]
pub struct PeerLinkConfig {
    pub connect_timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for PeerLinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT),
            base_delay: Duration::from_millis(RECONNECT_BASE_DELAY),
            max_delay: Duration::from_millis(RECONNECT_MAX_DELAY),
        }
    }
}

#[derive(Debug, Error)]
pub enum PeerLinkError {
    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    /// Readings payload could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] elocker_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a connected session ended without an error.
enum SessionEnd {
    /// Peer closed the connection.
    Closed,
    /// Nobody listens for readings any more.
    ReceiverGone,
}

/// TCP session to one peer address.
pub struct PeerLink {
    peer: SocketAddr,
    config: PeerLinkConfig,
    backoff: ReconnectBackoff,
    state: watch::Sender<LinkState>,
}

impl PeerLink {
    pub fn new(peer: SocketAddr, config: PeerLinkConfig) -> Self {
        let (state, _) = watch::channel(LinkState::Connecting);
        Self::with_state(peer, config, state)
    }

    /// Link that reports its state through an existing channel.
    pub fn with_state(
        peer: SocketAddr,
        config: PeerLinkConfig,
        state: watch::Sender<LinkState>,
    ) -> Self {
        let backoff = ReconnectBackoff::new(config.base_delay, config.max_delay);
        Self {
            peer,
            config,
            backoff,
            state,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Keep a session open and forward every readings batch to `readings`.
    ///
    /// Returns once `readings` is closed.
    pub async fn run(mut self, readings: mpsc::Sender<Vec<DeviceReading>>) {
        loop {
            self.state.send_replace(LinkState::Connecting);

            match self.connect().await {
                Ok(stream) => {
                    self.backoff.reset();
                    self.state.send_replace(LinkState::Connected);

                    match pump(stream, &readings).await {
                        Ok(SessionEnd::Closed) => info!(peer = %self.peer, "Peer closed connection"),
                        Ok(SessionEnd::ReceiverGone) => return,
                        Err(e) => warn!(peer = %self.peer, error = %e, "Peer session failed"),
                    }
                }
                Err(e) => warn!(peer = %self.peer, error = %e, "Peer connect failed"),
            }

            if readings.is_closed() {
                return;
            }

            self.state.send_replace(LinkState::Reconnecting);
            let delay = self.backoff.next_delay();
            info!(
                peer = %self.peer,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to peer"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = readings.closed() => return,
            }
        }
    }

    /// Open one TCP connection with keepalive enabled.
    async fn connect(&self) -> Result<TcpStream, PeerLinkError> {
        info!(peer = %self.peer, "Connecting to peer");

        let socket = if self.peer.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(true)?;

        let stream = tokio::time::timeout(self.config.connect_timeout, socket.connect(self.peer))
            .await
            .map_err(|_| {
                PeerLinkError::ConnectionTimeout(self.config.connect_timeout.as_millis() as u64)
            })??;

        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }

        info!(peer = %self.peer, "Connected to peer");
        Ok(stream)
    }
}

async fn pump(
    stream: TcpStream,
    readings: &mpsc::Sender<Vec<DeviceReading>>,
) -> Result<SessionEnd, PeerLinkError> {
    let mut framed = FramedRead::new(stream, ReadingsCodec::new());

    loop {
        tokio::select! {
            item = framed.next() => {
                let Some(batch) = item else {
                    return Ok(SessionEnd::Closed);
                };
                let batch = batch?;
                debug!(count = batch.len(), "Readings from peer");
                if batch.is_empty() {
                    continue;
                }
                if readings.send(batch).await.is_err() {
                    return Ok(SessionEnd::ReceiverGone);
                }
            }
            _ = readings.closed() => return Ok(SessionEnd::ReceiverGone),
        }
    }
}

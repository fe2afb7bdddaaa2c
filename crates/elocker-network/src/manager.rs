//! Discovery followed by the peer session, as one long-running task.

use elocker_protocol::DeviceReading;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::discovery::{Discovery, DiscoveryConfig, DiscoveryError};
use crate::peer::{LinkState, PeerLink, PeerLinkConfig};

pub struct PeerManager {
    discovery: Discovery,
    link: PeerLinkConfig,
    state: watch::Sender<LinkState>,
}

impl PeerManager {
    pub fn new(discovery: DiscoveryConfig, link: PeerLinkConfig) -> Self {
        let (state, _) = watch::channel(LinkState::Discovering);
        Self {
            discovery: Discovery::new(discovery),
            link,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Discover the peer once, then keep the session to it alive.
    ///
    /// The discovered address is kept for every later reconnect. Returns
    /// when `readings` is closed, or with an error if discovery cannot
    /// start.
    pub async fn run(self, readings: mpsc::Sender<Vec<DeviceReading>>) -> Result<(), DiscoveryError> {
        self.state.send_replace(LinkState::Discovering);

        let peer = tokio::select! {
            found = self.discovery.run() => found?,
            _ = readings.closed() => return Ok(()),
        };
        info!(peer = %peer, "Starting peer session");

        PeerLink::with_state(peer, self.link, self.state)
            .run(readings)
            .await;
        Ok(())
    }
}

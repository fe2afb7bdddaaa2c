//! Network transport for the eLocker sensor peer.
//!
//! In the networked deployment the charge sensors hang off a separate
//! controller board. The gateway finds it with a UDP broadcast probe and
//! then keeps a TCP session open to it, receiving counted readings
//! payloads.
//!
//! # Components
//!
//! - [`Discovery`]: broadcast probe until the peer answers
//! - [`PeerLink`]: self-healing TCP session with exponential backoff
//! - [`PeerManager`]: discovery followed by the link, as one task
//!
//! # Example
//!
//! ```no_run
//! use elocker_network::{DiscoveryConfig, PeerLinkConfig, PeerManager};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (tx, mut rx) = mpsc::channel(16);
//! let manager = PeerManager::new(DiscoveryConfig::default(), PeerLinkConfig::default());
//! tokio::spawn(manager.run(tx));
//!
//! while let Some(batch) = rx.recv().await {
//!     println!("{} readings", batch.len());
//! }
//! # Ok(())
//! # }
//! ```

mod backoff;
mod discovery;
mod manager;
mod peer;

pub use backoff::ReconnectBackoff;
pub use discovery::{Discovery, DiscoveryConfig, DiscoveryError};
pub use manager::PeerManager;
pub use peer::{LinkState, PeerLink, PeerLinkConfig, PeerLinkError};

//! eLocker charging-locker gateway.
//!
//! Bridges a bank of charging lockers to a small HTTP API:
//!
//! - a CU lock controller on one serial port (open commands, status masks)
//! - charge sensors, either polled on a second serial port or pushed by a
//!   networked peer found through UDP discovery
//! - a device table that classifies each slot's charge state and decides
//!   whether a locker may be opened
//!
//! ```text
//!              ┌────────────┐   chunks   ┌──────────────┐
//!  CU serial ──┤ lock link  ├──────────> │ lock pump    ├──┐
//!              └────────────┘            └──────────────┘  │
//!              ┌────────────┐   frames   ┌──────────────┐  │  ┌──────────────┐
//!  sensors  ───┤ sensor link├──────────> │ correlator   │  ├─>│ GatewayState │
//!              └────────────┘            └──────┬───────┘  │  └──────┬───────┘
//!                                               │ sweep    │         │
//!  HTTP ──────────────────────────────────> Gateway ───────┘ <───────┘
//! ```

pub mod config;
pub mod correlator;
pub mod error;
pub mod http;
pub mod link;
pub mod lock;
pub mod runtime;
pub mod sensor;
pub mod service;
pub mod state;
pub mod store;

pub use config::GatewayConfig;
pub use error::{ApiError, CorrelatorError, GatewayError, Result, StoreError, TransportError};
pub use runtime::run;
pub use service::Gateway;
pub use state::{DeviceRecord, DeviceStatus, GatewayState};

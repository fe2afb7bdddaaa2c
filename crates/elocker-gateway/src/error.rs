//! Error types for the gateway.
//!
//! Only [`GatewayError`] is fatal, and only at startup. Everything else is
//! either logged by the task that hit it or turned into an HTTP response.

use elocker_network::DiscoveryError;
use elocker_protocol::FrameError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Startup failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Core(#[from] elocker_core::Error),

    #[error("Threshold store {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("Failed to open {name} port {port}: {source}")]
    Serial {
        name: &'static str,
        port: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to bind HTTP listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// Threshold persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serial link failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The I/O thread behind the link has stopped.
    #[error("Link closed")]
    Closed,

    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Command could not be encoded for the wire.
    #[error("Cannot encode command: {0}")]
    Encode(#[from] FrameError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CorrelatorError {
    /// Another request is already waiting for its reply.
    #[error("A sensor request is already pending")]
    Busy,
}

/// Errors surfaced by the HTTP facade.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input; nothing was changed.
    #[error("{0}")]
    Validation(String),

    /// Request understood but refused by the unlock policy.
    #[error("{reason}")]
    PolicyDenied { reason: String },

    #[error("Lock controller unavailable: {0}")]
    Transport(#[from] TransportError),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        ApiError::PolicyDenied {
            reason: reason.into(),
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Validation(_) | ApiError::PolicyDenied { .. } => 400,
            ApiError::Transport(_) => 503,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ApiError::validation("Invalid JSON"), 400)]
    #[case(ApiError::denied("Device is charging!"), 400)]
    #[case(ApiError::Transport(TransportError::Closed), 503)]
    fn test_status_codes(#[case] err: ApiError, #[case] code: u16) {
        assert_eq!(err.status_code(), code);
    }

    #[test]
    fn test_policy_message_is_reason() {
        assert_eq!(
            ApiError::denied("Already unlocked!").to_string(),
            "Already unlocked!"
        );
    }
}

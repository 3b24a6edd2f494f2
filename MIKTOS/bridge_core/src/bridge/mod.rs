//! Boundary to the external 3D host.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parameter::ParameterValue;

/// In-process simulated host.
pub mod loopback;
/// Newline-delimited JSON over TCP.
pub mod tcp;

pub use loopback::LoopbackBridge;
pub use tcp::TcpBridge;

/// Parameters handed to the host, keyed by name.
pub type BridgeParams = IndexMap<String, ParameterValue>;

/// Failure at the host boundary.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BridgeError {
    /// Connection dropped mid-request.
    #[error("connection reset: {0}")]
    ConnectionReset(String),
    /// Host could not be reached.
    #[error("host unavailable: {0}")]
    Unavailable(String),
    /// Host refused the operation.
    #[error("host rejected operation: {0}")]
    Rejected(String),
    /// Malformed response.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl BridgeError {
    /// Connection-level failures that may succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionReset(_) | Self::Unavailable(_))
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConnectionReset(_) => "BRIDGE_CONNECTION_RESET",
            Self::Unavailable(_) => "BRIDGE_UNAVAILABLE",
            Self::Rejected(_) => "BRIDGE_REJECTED",
            Self::Protocol(_) => "BRIDGE_PROTOCOL",
        }
    }
}

/// Host reply to a successful operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeResponse {
    /// Host message.
    #[serde(default)]
    pub message: String,
    /// Objects the operation created.
    #[serde(default)]
    pub objects_created: Vec<String>,
    /// Objects the operation touched, created ones included.
    #[serde(default)]
    pub objects_affected: Vec<String>,
    /// Objects the operation removed.
    #[serde(default)]
    pub objects_removed: Vec<String>,
    /// Extra payload, e.g. a scene listing.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl BridgeResponse {
    /// Response with only a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

/// Request/response channel into the host process.
#[async_trait]
pub trait BridgeAdapter: Send + Sync {
    /// Adapter name for diagnostics.
    fn name(&self) -> &str;

    /// Executes one host operation.
    async fn execute(
        &self,
        operation: &str,
        params: &BridgeParams,
    ) -> Result<BridgeResponse, BridgeError>;

    /// Checks the host is reachable.
    async fn ping(&self) -> Result<(), BridgeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BridgeError::ConnectionReset("eof".into()).is_transient());
        assert!(BridgeError::Unavailable("refused".into()).is_transient());
        assert!(!BridgeError::Rejected("no such object".into()).is_transient());
        assert!(!BridgeError::Protocol("bad json".into()).is_transient());
        assert_eq!(BridgeError::Rejected(String::new()).code(), "BRIDGE_REJECTED");
    }
}

//! Topology and routing error types

use thiserror::Error;

/// Errors that can occur while tracking the topology or routing commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShoalError {
    #[error("Invalid address '{address}': {reason}")]
    AddressParse { address: String, reason: String },

    #[error("Database isn't connected")]
    NotConnected,

    #[error("Node unavailable: {0}")]
    NodeUnavailable(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Command failed ({code}): {message}")]
    CommandFailed { code: i64, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection pool closed for {0}")]
    PoolClosed(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ShoalError {
    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self {
            ShoalError::AddressParse { .. } => "address_parse",
            ShoalError::NotConnected => "not_connected",
            ShoalError::NodeUnavailable(_) => "node_unavailable",
            ShoalError::Connection(_) => "connection",
            ShoalError::Protocol(_) => "protocol",
            ShoalError::CommandFailed { .. } => "command_failed",
            ShoalError::Timeout(_) => "timeout",
            ShoalError::PoolClosed(_) => "pool_closed",
            ShoalError::Cancelled(_) => "cancelled",
            ShoalError::Config(_) => "config",
        }
    }

    /// Whether the connection that produced this error must be evicted
    /// rather than returned to its pool
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            ShoalError::Connection(_) | ShoalError::Protocol(_) | ShoalError::Timeout(_)
        )
    }

    pub(crate) fn address(address: &str, reason: impl Into<String>) -> Self {
        ShoalError::AddressParse {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for ShoalError {
    fn from(err: std::io::Error) -> Self {
        ShoalError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for ShoalError {
    fn from(err: serde_json::Error) -> Self {
        ShoalError::Protocol(err.to_string())
    }
}

impl From<toml::de::Error> for ShoalError {
    fn from(err: toml::de::Error) -> Self {
        ShoalError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShoalError>;

//! Anchoring-specific error types

use thiserror::Error;

/// Calendar and block explorer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnchorError {
    /// Network communication error
    #[error("network error: {0}")]
    Network(String),

    /// Service returned an error status
    #[error("service error: {0}")]
    ServiceError(String),

    /// Invalid response from service
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Request timeout
    #[error("timeout after {0} seconds")]
    Timeout(u64),

    /// Service not configured
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// Explorer has no block at this height
    #[error("block not found: height {0}")]
    BlockNotFound(u64),

    /// Failed to fetch block data for a height
    #[error("Failed to fetch block for height {height}: {details}")]
    BlockFetchFailed { height: u64, details: String },
}

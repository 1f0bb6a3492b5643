//! OpenTimestamps client library
//!
//! - [`timestamp`]: the commitment tree
//! - [`codec`], [`op`], [`attestation`], [`detached`]: the proof wire format
//! - [`anchoring`]: calendars, block explorers, stamp/upgrade/verify

pub mod anchoring;
pub mod attestation;
pub mod codec;
pub mod config;
pub mod detached;
pub mod error;
pub mod op;
pub mod proof_file;
pub mod timestamp;

// Re-exports
pub use anchoring::{OpenTimestampsClient, VerifyOutcome};
pub use attestation::Attestation;
pub use config::OtsConfig;
pub use detached::DetachedTimestampFile;
pub use error::{AnchorError, EncodingError, OtsError, OtsResult, TimestampError};
pub use op::Op;
pub use timestamp::Timestamp;

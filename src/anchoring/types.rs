//! Verification types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Block data needed to check a Bitcoin attestation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Merkle root in display (RPC) byte order
    #[serde(with = "hex_bytes")]
    pub merkle_root: Vec<u8>,

    /// Block header time (unix seconds)
    pub time: u64,
}

/// Why a verification could not reach a verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconclusiveReason {
    /// Tree has no Bitcoin attestation (only pending or unknown ones)
    NoBitcoinAttestation,

    /// Block explorer could not answer
    CollaboratorUnavailable { height: u64, details: String },
}

impl fmt::Display for InconclusiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InconclusiveReason::NoBitcoinAttestation => {
                f.write_str("no Bitcoin attestation yet (timestamp pending, try upgrading)")
            }
            InconclusiveReason::CollaboratorUnavailable { height, details } => {
                write!(f, "could not fetch block {height}: {details}")
            }
        }
    }
}

/// Result of verifying a timestamp against the Bitcoin chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerifyOutcome {
    /// Attested message is the Merkle root of the block
    Verified { block_height: u64, block_time: u64 },

    /// Attested message does not match the block
    Mismatch { block_height: u64 },

    /// No verdict either way
    Inconclusive { reason: InconclusiveReason },
}

impl VerifyOutcome {
    #[must_use]
    pub fn is_verified(&self) -> bool {
        matches!(self, VerifyOutcome::Verified { .. })
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

//! Crate error types

use thiserror::Error;

use crate::codec::CodecError;

pub use crate::anchoring::error::AnchorError;

/// Proof encoding and decoding errors
///
/// A corrupted proof must never be treated as valid, so these are always
/// surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// Underlying byte codec failure (truncation, bad varuint, bad magic)
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Proof file major version is not supported
    #[error("unsupported major version {0}")]
    UnsupportedVersion(u64),

    /// Tag is a marker byte or otherwise not valid where it appears
    #[error("invalid op tag {0:#04x}")]
    InvalidTag(u8),

    /// File hash op must be a cryptographic hash
    #[error("file hash op {0:#04x} is not a cryptographic hash")]
    NotCryptoOp(u8),

    /// Digest length does not match the file hash op
    #[error("digest is {actual} bytes, {op} produces {expected}")]
    DigestLength {
        op: String,
        expected: usize,
        actual: usize,
    },

    /// Message fed to an op is too long
    #[error("message of {len} bytes exceeds op limit of {max}")]
    MsgTooLong { len: usize, max: usize },

    /// Op result is too long
    #[error("op result of {len} bytes exceeds limit of {max}")]
    ResultTooLong { len: usize, max: usize },

    /// Op argument length is outside what the wire format allows
    #[error("{op} argument of {len} bytes is outside {min}..={max}")]
    ArgLength {
        op: String,
        len: usize,
        min: usize,
        max: usize,
    },

    /// Attestation payload is malformed
    #[error("invalid attestation: {0}")]
    InvalidAttestation(String),

    /// Tree nesting exceeds the decode depth guard
    #[error("recursion limit of {0} reached")]
    RecursionLimit(usize),

    /// A node with neither ops nor attestations has no encoding
    #[error("an empty timestamp can't be serialized")]
    EmptyTimestamp,
}

/// Commitment tree errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    /// Merge of two timestamps committing to different messages
    #[error("incompatible merge: expected msg {expected}, got {actual}")]
    IncompatibleMerge { expected: String, actual: String },
}

/// Top-level error type
#[derive(Debug, Error)]
pub enum OtsError {
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("timestamp error: {0}")]
    Timestamp(#[from] TimestampError),

    #[error("anchoring error: {0}")]
    Anchor(#[from] AnchorError),

    /// Fewer calendars accepted the digest than required
    #[error("only {succeeded} of {required} required calendars responded: {details}")]
    CalendarUnavailable {
        succeeded: usize,
        required: usize,
        details: String,
    },

    /// Data being verified does not match the digest stored in the proof
    #[error("file does not match original: expected digest {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type OtsResult<T> = Result<T, OtsError>;

//! Operation registry
//!
//! Every edge of a commitment tree is an [`Op`]: a pure, deterministic
//! transform over byte strings identified by a one-byte tag. Tags below
//! `0xf0` are unary; tags from `0xf0` up carry a varbytes argument.

use std::fmt;
use std::io::{self, Read};

use sha2::Digest;

use crate::codec::{DeserializationContext, SerializationContext};
use crate::error::EncodingError;
use crate::timestamp::{ATTESTATION_MARKER, FORK_MARKER};

/// Longest message an op accepts while decoding a proof
pub const MAX_MSG_LENGTH: usize = 4096;

/// Longest result (and binary argument) an op may produce while decoding
pub const MAX_RESULT_LENGTH: usize = 4096;

pub const TAG_SHA1: u8 = 0x02;
pub const TAG_RIPEMD160: u8 = 0x03;
pub const TAG_SHA256: u8 = 0x08;
pub const TAG_KECCAK256: u8 = 0x67;
pub const TAG_APPEND: u8 = 0xf0;
pub const TAG_PREPEND: u8 = 0xf1;
pub const TAG_REVERSE: u8 = 0xf2;
pub const TAG_HEXLIFY: u8 = 0xf3;

/// First tag of the binary (argument-carrying) range
pub const BINARY_TAG_MIN: u8 = 0xf0;

/// A commitment operation
///
/// Equality is by tag and argument, which is what makes two edges "the same"
/// during merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    Sha1,
    Ripemd160,
    Sha256,
    Keccak256,
    /// `msg ‖ arg`
    Append(Vec<u8>),
    /// `arg ‖ msg`
    Prepend(Vec<u8>),
    Reverse,
    Hexlify,
    /// Tag not known to this implementation, kept for re-encoding only
    Unknown { tag: u8, arg: Vec<u8> },
}

impl Op {
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Op::Sha1 => TAG_SHA1,
            Op::Ripemd160 => TAG_RIPEMD160,
            Op::Sha256 => TAG_SHA256,
            Op::Keccak256 => TAG_KECCAK256,
            Op::Append(_) => TAG_APPEND,
            Op::Prepend(_) => TAG_PREPEND,
            Op::Reverse => TAG_REVERSE,
            Op::Hexlify => TAG_HEXLIFY,
            Op::Unknown { tag, .. } => *tag,
        }
    }

    #[must_use]
    pub fn tag_name(&self) -> &'static str {
        match self {
            Op::Sha1 => "sha1",
            Op::Ripemd160 => "ripemd160",
            Op::Sha256 => "sha256",
            Op::Keccak256 => "keccak256",
            Op::Append(_) => "append",
            Op::Prepend(_) => "prepend",
            Op::Reverse => "reverse",
            Op::Hexlify => "hexlify",
            Op::Unknown { .. } => "unknown",
        }
    }

    /// Argument written after the tag, if this op carries one
    #[must_use]
    pub fn arg(&self) -> Option<&[u8]> {
        match self {
            Op::Append(arg) | Op::Prepend(arg) => Some(arg),
            Op::Unknown { tag, arg } if *tag >= BINARY_TAG_MIN => Some(arg),
            _ => None,
        }
    }

    /// Output length of cryptographic hash ops, `None` for everything else
    #[must_use]
    pub fn digest_len(&self) -> Option<usize> {
        match self {
            Op::Sha1 | Op::Ripemd160 => Some(20),
            Op::Sha256 | Op::Keccak256 => Some(32),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_crypto(&self) -> bool {
        self.digest_len().is_some()
    }

    /// True for ops whose result cannot be computed
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        matches!(self, Op::Unknown { .. })
    }

    /// Apply the op to `msg`
    ///
    /// Opaque ops return an empty result; their subtrees are never
    /// interpreted.
    #[must_use]
    pub fn call(&self, msg: &[u8]) -> Vec<u8> {
        match self {
            Op::Sha1 => sha1::Sha1::digest(msg).to_vec(),
            Op::Ripemd160 => ripemd::Ripemd160::digest(msg).to_vec(),
            Op::Sha256 => sha2::Sha256::digest(msg).to_vec(),
            Op::Keccak256 => sha3::Keccak256::digest(msg).to_vec(),
            Op::Append(arg) => {
                let mut out = Vec::with_capacity(msg.len() + arg.len());
                out.extend_from_slice(msg);
                out.extend_from_slice(arg);
                out
            }
            Op::Prepend(arg) => {
                let mut out = Vec::with_capacity(arg.len() + msg.len());
                out.extend_from_slice(arg);
                out.extend_from_slice(msg);
                out
            }
            Op::Reverse => msg.iter().rev().copied().collect(),
            Op::Hexlify => hex::encode(msg).into_bytes(),
            Op::Unknown { .. } => Vec::new(),
        }
    }

    /// Apply the op with the length limits enforced on decoded proofs
    ///
    /// # Errors
    ///
    /// Returns `EncodingError::MsgTooLong` or `EncodingError::ResultTooLong`
    pub fn call_checked(&self, msg: &[u8]) -> Result<Vec<u8>, EncodingError> {
        if msg.len() > MAX_MSG_LENGTH {
            return Err(EncodingError::MsgTooLong {
                len: msg.len(),
                max: MAX_MSG_LENGTH,
            });
        }

        let result = self.call(msg);
        if result.len() > MAX_RESULT_LENGTH {
            return Err(EncodingError::ResultTooLong {
                len: result.len(),
                max: MAX_RESULT_LENGTH,
            });
        }

        Ok(result)
    }

    /// Hash everything `reader` yields with this op
    ///
    /// # Errors
    ///
    /// Returns `io::ErrorKind::InvalidInput` for non-hash ops, or any read error
    pub fn hash_reader<R: Read>(&self, reader: R) -> io::Result<Vec<u8>> {
        match self {
            Op::Sha1 => hash_stream::<sha1::Sha1, R>(reader),
            Op::Ripemd160 => hash_stream::<ripemd::Ripemd160, R>(reader),
            Op::Sha256 => hash_stream::<sha2::Sha256, R>(reader),
            Op::Keccak256 => hash_stream::<sha3::Keccak256, R>(reader),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a hash op", other.tag_name()),
            )),
        }
    }

    /// Check that decoding the encoded op gives this op back
    ///
    /// # Errors
    ///
    /// `EncodingError::InvalidTag` for an unknown op reusing a marker or
    /// registered tag, `EncodingError::ArgLength` for an argument the decoder
    /// would refuse or drop
    pub fn validate(&self) -> Result<(), EncodingError> {
        let (min, max) = match self {
            Op::Append(_) | Op::Prepend(_) => (1, MAX_RESULT_LENGTH),
            Op::Unknown { tag, .. } if is_reserved_tag(*tag) => {
                return Err(EncodingError::InvalidTag(*tag));
            }
            Op::Unknown { tag, .. } if *tag >= BINARY_TAG_MIN => (0, MAX_RESULT_LENGTH),
            Op::Unknown { .. } => (0, 0),
            _ => return Ok(()),
        };

        let len = match self {
            Op::Append(arg) | Op::Prepend(arg) | Op::Unknown { arg, .. } => arg.len(),
            _ => 0,
        };
        if len < min || len > max {
            return Err(EncodingError::ArgLength {
                op: self.tag_name().to_string(),
                len,
                min,
                max,
            });
        }
        Ok(())
    }

    /// Write the tag and argument
    ///
    /// # Errors
    ///
    /// As [`Op::validate`]
    pub fn serialize(&self, ctx: &mut SerializationContext) -> Result<(), EncodingError> {
        self.validate()?;
        ctx.write_byte(self.tag());
        if let Some(arg) = self.arg() {
            ctx.write_varbytes(arg);
        }
        Ok(())
    }

    /// Read the rest of an op whose tag has already been consumed
    ///
    /// # Errors
    ///
    /// Returns `EncodingError::InvalidTag` for marker bytes, or a codec error
    /// for a missing or out-of-range argument
    pub fn deserialize_from_tag(
        ctx: &mut DeserializationContext<'_>,
        tag: u8,
    ) -> Result<Self, EncodingError> {
        let op = match tag {
            TAG_SHA1 => Op::Sha1,
            TAG_RIPEMD160 => Op::Ripemd160,
            TAG_SHA256 => Op::Sha256,
            TAG_KECCAK256 => Op::Keccak256,
            TAG_APPEND => Op::Append(ctx.read_varbytes(MAX_RESULT_LENGTH, 1)?.to_vec()),
            TAG_PREPEND => Op::Prepend(ctx.read_varbytes(MAX_RESULT_LENGTH, 1)?.to_vec()),
            TAG_REVERSE => Op::Reverse,
            TAG_HEXLIFY => Op::Hexlify,
            ATTESTATION_MARKER | FORK_MARKER => return Err(EncodingError::InvalidTag(tag)),
            tag if tag >= BINARY_TAG_MIN => Op::Unknown {
                tag,
                arg: ctx.read_varbytes(MAX_RESULT_LENGTH, 0)?.to_vec(),
            },
            tag => Op::Unknown {
                tag,
                arg: Vec::new(),
            },
        };

        Ok(op)
    }
}

/// Markers and registered tags; an `Op::Unknown` carrying one would decode
/// as something else
fn is_reserved_tag(tag: u8) -> bool {
    matches!(
        tag,
        ATTESTATION_MARKER
            | FORK_MARKER
            | TAG_SHA1
            | TAG_RIPEMD160
            | TAG_SHA256
            | TAG_KECCAK256
            | TAG_APPEND
            | TAG_PREPEND
            | TAG_REVERSE
            | TAG_HEXLIFY
    )
}

fn hash_stream<D: Digest + io::Write, R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut hasher = D::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().to_vec())
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Unknown { tag, arg } if arg.is_empty() => write!(f, "unknown({tag:#04x})"),
            Op::Unknown { tag, arg } => write!(f, "unknown({tag:#04x}) {}", hex::encode(arg)),
            op => match op.arg() {
                Some(arg) => write!(f, "{} {}", op.tag_name(), hex::encode(arg)),
                None => f.write_str(op.tag_name()),
            },
        }
    }
}

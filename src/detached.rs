//! Detached timestamp files (`.ots` proofs)
//!
//! Layout: header magic, varuint major version, file hash op tag, file
//! digest, root node.

use std::io::Read;

use crate::codec::{DeserializationContext, SerializationContext};
use crate::error::{EncodingError, OtsResult};
use crate::op::Op;
use crate::timestamp::Timestamp;

/// `\0OpenTimestamps\0\0Proof\0` followed by 8 magic bytes
pub const HEADER_MAGIC: &[u8; 31] =
    b"\x00OpenTimestamps\x00\x00Proof\x00\xbf\x89\xe2\xe8\x84\xe8\x92\x94";

pub const MAJOR_VERSION: u64 = 1;

/// A timestamp proof for a file, committed to by its digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedTimestampFile {
    pub file_hash_op: Op,
    pub timestamp: Timestamp,
}

impl DetachedTimestampFile {
    /// Wrap an existing tree
    ///
    /// # Errors
    ///
    /// Fails if `file_hash_op` is not a hash or the root msg has the wrong length
    pub fn new(file_hash_op: Op, timestamp: Timestamp) -> Result<Self, EncodingError> {
        check_digest(&file_hash_op, timestamp.msg())?;
        Ok(Self {
            file_hash_op,
            timestamp,
        })
    }

    /// Fresh proof for an already computed digest
    pub fn from_digest(file_hash_op: Op, digest: &[u8]) -> Result<Self, EncodingError> {
        Self::new(file_hash_op, Timestamp::new(digest.to_vec()))
    }

    /// Hash a stream and start a proof for it
    ///
    /// # Errors
    ///
    /// Propagates read errors, or an encoding error for a non-hash op
    pub fn from_reader<R: Read>(file_hash_op: Op, reader: R) -> OtsResult<Self> {
        if !file_hash_op.is_crypto() {
            return Err(EncodingError::NotCryptoOp(file_hash_op.tag()).into());
        }
        let digest = file_hash_op.hash_reader(reader)?;
        Ok(Self::from_digest(file_hash_op, &digest)?)
    }

    #[must_use]
    pub fn file_digest(&self) -> &[u8] {
        self.timestamp.msg()
    }

    pub fn serialize(&self, ctx: &mut SerializationContext) -> Result<(), EncodingError> {
        check_digest(&self.file_hash_op, self.file_digest())?;
        ctx.write_bytes(HEADER_MAGIC);
        ctx.write_varuint(MAJOR_VERSION);
        self.file_hash_op.serialize(ctx)?;
        ctx.write_bytes(self.timestamp.msg());
        self.timestamp.serialize(ctx)
    }

    /// Decode a complete proof; trailing bytes are an error
    pub fn deserialize(ctx: &mut DeserializationContext<'_>) -> Result<Self, EncodingError> {
        ctx.assert_magic(HEADER_MAGIC)?;

        let version = ctx.read_varuint()?;
        if version != MAJOR_VERSION {
            return Err(EncodingError::UnsupportedVersion(version));
        }

        let tag = ctx.read_byte()?;
        let file_hash_op = Op::deserialize_from_tag(ctx, tag)?;
        let digest_len = file_hash_op
            .digest_len()
            .ok_or(EncodingError::NotCryptoOp(tag))?;

        let digest = ctx.read_bytes(digest_len)?.to_vec();
        let timestamp = Timestamp::deserialize(ctx, digest)?;
        ctx.assert_eof()?;

        Ok(Self {
            file_hash_op,
            timestamp,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        let mut ctx = SerializationContext::new();
        self.serialize(&mut ctx)?;
        Ok(ctx.into_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        let mut ctx = DeserializationContext::new(bytes);
        Self::deserialize(&mut ctx)
    }

    /// Human-readable summary
    #[must_use]
    pub fn info(&self) -> String {
        format!(
            "File {} hash: {}\nTimestamp:\n{}",
            self.file_hash_op.tag_name(),
            hex::encode(self.file_digest()),
            self.timestamp.str_tree(0)
        )
    }
}

fn check_digest(file_hash_op: &Op, digest: &[u8]) -> Result<(), EncodingError> {
    let expected = file_hash_op
        .digest_len()
        .ok_or(EncodingError::NotCryptoOp(file_hash_op.tag()))?;

    if digest.len() != expected {
        return Err(EncodingError::DigestLength {
            op: file_hash_op.tag_name().to_string(),
            expected,
            actual: digest.len(),
        });
    }
    Ok(())
}

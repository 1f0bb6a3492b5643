//! Time attestations
//!
//! Wire form: 8-byte tag followed by a varbytes payload. Attestations order
//! by tag first, then pending ones by URI, Bitcoin ones by height and unknown
//! ones by payload, so a set of attestations has one canonical encoding order.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::codec::{DeserializationContext, SerializationContext};
use crate::error::EncodingError;

pub const TAG_SIZE: usize = 8;

/// Largest attestation payload accepted while decoding
pub const MAX_PAYLOAD_SIZE: usize = 8192;

/// Longest calendar URI a pending attestation may carry
pub const MAX_URI_LENGTH: usize = 1000;

pub const PENDING_TAG: [u8; TAG_SIZE] = [0x83, 0xdf, 0xe3, 0x0d, 0x2e, 0xf9, 0x0c, 0x8e];
pub const BITCOIN_TAG: [u8; TAG_SIZE] = [0x05, 0x88, 0x96, 0x0d, 0x73, 0xd7, 0x19, 0x01];

/// A claim that a message existed at or before some point in time
#[derive(Debug, Clone)]
pub enum Attestation {
    /// Promise from a calendar; confirmable later via upgrade
    Pending { uri: String },

    /// Message (byte-reversed) is the Merkle root of the block at `height`
    Bitcoin { height: u64 },

    /// Unrecognized attestation, preserved byte-for-byte
    Unknown { tag: [u8; TAG_SIZE], payload: Vec<u8> },
}

impl Attestation {
    /// Pending attestation for a calendar URI
    #[must_use]
    pub fn pending(uri: impl Into<String>) -> Self {
        Attestation::Pending { uri: uri.into() }
    }

    #[must_use]
    pub fn tag(&self) -> [u8; TAG_SIZE] {
        match self {
            Attestation::Pending { .. } => PENDING_TAG,
            Attestation::Bitcoin { .. } => BITCOIN_TAG,
            Attestation::Unknown { tag, .. } => *tag,
        }
    }

    /// Encoded payload (without the outer length prefix)
    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Attestation::Pending { uri } => {
                let mut ctx = SerializationContext::new();
                ctx.write_varbytes(uri.as_bytes());
                ctx.into_bytes()
            }
            Attestation::Bitcoin { height } => {
                let mut ctx = SerializationContext::new();
                ctx.write_varuint(*height);
                ctx.into_bytes()
            }
            Attestation::Unknown { payload, .. } => payload.clone(),
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Attestation::Pending { .. })
    }

    #[must_use]
    pub fn bitcoin_height(&self) -> Option<u64> {
        match self {
            Attestation::Bitcoin { height } => Some(*height),
            _ => None,
        }
    }

    /// Check that decoding the encoded attestation gives it back
    ///
    /// # Errors
    ///
    /// Returns `EncodingError::InvalidAttestation` for a URI or payload the
    /// decoder would refuse, or an unknown attestation reusing a known tag
    pub fn validate(&self) -> Result<(), EncodingError> {
        match self {
            Attestation::Pending { uri } => {
                if uri.len() > MAX_URI_LENGTH {
                    return Err(EncodingError::InvalidAttestation(format!(
                        "pending uri of {} bytes exceeds {MAX_URI_LENGTH}",
                        uri.len()
                    )));
                }
                check_uri(uri.as_bytes())
            }
            Attestation::Bitcoin { .. } => Ok(()),
            Attestation::Unknown { tag, .. } if *tag == PENDING_TAG || *tag == BITCOIN_TAG => {
                Err(EncodingError::InvalidAttestation(format!(
                    "unknown attestation uses known tag {}",
                    hex::encode(tag)
                )))
            }
            Attestation::Unknown { payload, .. } if payload.len() > MAX_PAYLOAD_SIZE => {
                Err(EncodingError::InvalidAttestation(format!(
                    "payload of {} bytes exceeds {MAX_PAYLOAD_SIZE}",
                    payload.len()
                )))
            }
            Attestation::Unknown { .. } => Ok(()),
        }
    }

    /// Write the tag and payload
    ///
    /// # Errors
    ///
    /// As [`Attestation::validate`]
    pub fn serialize(&self, ctx: &mut SerializationContext) -> Result<(), EncodingError> {
        self.validate()?;
        ctx.write_bytes(&self.tag());
        ctx.write_varbytes(&self.payload());
        Ok(())
    }

    /// Read an attestation (the `0x00` marker has already been consumed)
    ///
    /// # Errors
    ///
    /// Returns `EncodingError::InvalidAttestation` for malformed payloads of
    /// known attestation types, or a codec error for truncated input
    pub fn deserialize(ctx: &mut DeserializationContext<'_>) -> Result<Self, EncodingError> {
        let tag_bytes = ctx.read_bytes(TAG_SIZE)?;
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(tag_bytes);

        let payload = ctx.read_varbytes(MAX_PAYLOAD_SIZE, 0)?;
        let mut payload_ctx = DeserializationContext::new(payload);

        let attestation = match tag {
            PENDING_TAG => {
                let uri = payload_ctx
                    .read_varbytes(MAX_URI_LENGTH, 0)
                    .map_err(|e| EncodingError::InvalidAttestation(format!("pending uri: {e}")))?;
                Attestation::Pending {
                    uri: parse_uri(uri)?,
                }
            }
            BITCOIN_TAG => {
                let height = payload_ctx
                    .read_varuint()
                    .map_err(|e| EncodingError::InvalidAttestation(format!("block height: {e}")))?;
                Attestation::Bitcoin { height }
            }
            _ => {
                return Ok(Attestation::Unknown {
                    tag,
                    payload: payload.to_vec(),
                })
            }
        };

        payload_ctx
            .assert_eof()
            .map_err(|e| EncodingError::InvalidAttestation(e.to_string()))?;

        Ok(attestation)
    }

    fn sort_key(&self) -> ([u8; TAG_SIZE], SortKey<'_>) {
        let key = match self {
            Attestation::Pending { uri } => SortKey::Uri(uri.as_bytes()),
            Attestation::Bitcoin { height } => SortKey::Height(*height),
            Attestation::Unknown { payload, .. } => SortKey::Payload(payload),
        };
        (self.tag(), key)
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Hash)]
enum SortKey<'a> {
    Uri(&'a [u8]),
    Height(u64),
    Payload(&'a [u8]),
}

fn check_uri(raw: &[u8]) -> Result<(), EncodingError> {
    let allowed = |b: &u8| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_' | b'/' | b':');
    if !raw.iter().all(allowed) {
        return Err(EncodingError::InvalidAttestation(
            "pending uri contains disallowed characters".into(),
        ));
    }
    Ok(())
}

fn parse_uri(raw: &[u8]) -> Result<String, EncodingError> {
    check_uri(raw)?;
    String::from_utf8(raw.to_vec())
        .map_err(|e| EncodingError::InvalidAttestation(format!("pending uri: {e}")))
}

impl PartialEq for Attestation {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for Attestation {}

impl Hash for Attestation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sort_key().hash(state);
    }
}

impl PartialOrd for Attestation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Attestation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for Attestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attestation::Pending { uri } => write!(f, "PendingAttestation('{uri}')"),
            Attestation::Bitcoin { height } => write!(f, "BitcoinBlockHeaderAttestation({height})"),
            Attestation::Unknown { tag, payload } => write!(
                f,
                "UnknownAttestation({}, {})",
                hex::encode(tag),
                hex::encode(payload)
            ),
        }
    }
}

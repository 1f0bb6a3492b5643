//! Test fixtures for calendar responses

use crate::attestation::Attestation;
use crate::op::Op;
use crate::timestamp::Timestamp;

/// sha256("test fixture data")
pub fn test_hash() -> [u8; 32] {
    hash_of(b"test fixture data")
}

pub fn hash_of(data: &[u8]) -> [u8; 32] {
    use sha2::Digest;
    sha2::Sha256::digest(data).into()
}

/// Bare node a calendar returns right after submission: a pending
/// attestation on the submitted digest
pub fn pending_response(calendar_url: &str) -> Vec<u8> {
    // 00 = attestation marker, then PENDING_TAG, payload length, uri length, uri
    let mut response = vec![0x00, 0x83, 0xdf, 0xe3, 0x0d, 0x2e, 0xf9, 0x0c, 0x8e];

    let url_bytes = calendar_url.as_bytes();
    assert!(url_bytes.len() < 127, "fixture only handles short URLs");
    response.push(url_bytes.len() as u8 + 1);
    response.push(url_bytes.len() as u8);
    response.extend_from_slice(url_bytes);

    response
}

/// Bare node with a Bitcoin attestation one hash away from the commitment
pub fn bitcoin_response(height: u64) -> Vec<u8> {
    let mut node = Timestamp::new(vec![0u8; 32]);
    node.add_op(Op::Sha256)
        .add_attestation(Attestation::Bitcoin { height });
    node.to_bytes().expect("fixture tree is non-empty")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_hash() {
        let hash = test_hash();
        assert_eq!(hash, hash_of(b"test fixture data"));
        assert_ne!(hash, hash_of(b"other data"));
    }

    #[test]
    fn test_pending_response_parses() {
        let hash = test_hash();
        let response = pending_response("https://a.pool.opentimestamps.org");

        let fragment = Timestamp::from_calendar_response(&hash, &response).unwrap();
        assert_eq!(fragment.msg(), hash.as_slice());
        assert!(fragment
            .attestations_here()
            .contains(&Attestation::pending("https://a.pool.opentimestamps.org")));
    }

    #[test]
    fn test_bitcoin_response_is_message_independent() {
        let bytes = bitcoin_response(7);
        for msg in [[1u8; 32], [2u8; 32]] {
            let fragment = Timestamp::from_calendar_response(&msg, &bytes).unwrap();
            assert!(fragment.is_complete());
        }
    }
}

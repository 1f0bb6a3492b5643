//! Stamp, upgrade and verify
//!
//! Tree manipulation is synchronous; only collaborator calls are awaited,
//! one at a time.

use std::io::Read;

use crate::anchoring::calendar::CalendarClient;
use crate::anchoring::error::AnchorError;
use crate::anchoring::explorer::BlockExplorer;
use crate::anchoring::types::{BlockInfo, InconclusiveReason, VerifyOutcome};
use crate::config::OtsConfig;
use crate::detached::DetachedTimestampFile;
use crate::error::{OtsError, OtsResult};
use crate::op::Op;
use crate::timestamp::Timestamp;

/// Bytes of randomness appended before hashing each file digest
pub const NONCE_SIZE: usize = 16;

/// Timestamp one file
///
/// # Errors
///
/// `AnchorError::NotConfigured` without calendars, or
/// `OtsError::CalendarUnavailable` when fewer than
/// `config.min_calendar_responses` calendars accepted the digest
pub async fn stamp(
    config: &OtsConfig,
    calendar: &dyn CalendarClient,
    file: &mut DetachedTimestampFile,
) -> OtsResult<()> {
    stamp_batch(config, calendar, std::slice::from_mut(file)).await
}

/// Timestamp several files with a single calendar submission
///
/// Each file gets its own nonce, then the per-file tips are aggregated into
/// a Merkle tree whose root is submitted. Every file ends up with the full
/// path from its digest to the calendar's answer.
pub async fn stamp_batch(
    config: &OtsConfig,
    calendar: &dyn CalendarClient,
    files: &mut [DetachedTimestampFile],
) -> OtsResult<()> {
    if files.is_empty() {
        return Ok(());
    }
    if config.calendar_urls.is_empty() {
        return Err(AnchorError::NotConfigured("no calendar URLs configured".into()).into());
    }

    let mut tip_paths = Vec::with_capacity(files.len());
    let mut tips = Vec::with_capacity(files.len());
    for file in files.iter_mut() {
        let nonce: [u8; NONCE_SIZE] = rand::random();
        let path = vec![Op::Append(nonce.to_vec()), Op::Sha256];
        let tip = add_path(&mut file.timestamp, &path);
        tips.push(tip.msg().to_vec());
        tip_paths.push(path);
    }

    let (merkle_paths, root_msg) = merkle_paths(&tips);
    let root = submit_to_calendars(config, calendar, &root_msg).await?;

    for ((file, mut path), merkle_path) in files.iter_mut().zip(tip_paths).zip(merkle_paths) {
        path.extend(merkle_path);
        add_path(&mut file.timestamp, &path).merge(&root)?;
    }

    Ok(())
}

fn add_path<'a>(timestamp: &'a mut Timestamp, path: &[Op]) -> &'a mut Timestamp {
    path.iter()
        .fold(timestamp, |node, op| node.add_op(op.clone()))
}

/// Op paths from each leaf to the root of a Merkle tree over `leaves`,
/// and the root itself
///
/// Leaves are paired left to right; an odd leaf is carried up unchanged.
fn merkle_paths(leaves: &[Vec<u8>]) -> (Vec<Vec<Op>>, Vec<u8>) {
    let mut paths = vec![Vec::new(); leaves.len()];
    let mut level: Vec<(Vec<u8>, Vec<usize>)> = leaves
        .iter()
        .enumerate()
        .map(|(i, leaf)| (leaf.clone(), vec![i]))
        .collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut nodes = level.into_iter();

        while let Some((left, mut left_members)) = nodes.next() {
            let Some((right, right_members)) = nodes.next() else {
                next.push((left, left_members));
                break;
            };

            for &i in &left_members {
                paths[i].push(Op::Append(right.clone()));
                paths[i].push(Op::Sha256);
            }
            for &i in &right_members {
                paths[i].push(Op::Prepend(left.clone()));
                paths[i].push(Op::Sha256);
            }

            let parent = Op::Sha256.call(&Op::Append(right).call(&left));
            left_members.extend(right_members);
            next.push((parent, left_members));
        }

        level = next;
    }

    let root = level.pop().map(|(msg, _)| msg).unwrap_or_default();
    (paths, root)
}

async fn submit_to_calendars(
    config: &OtsConfig,
    calendar: &dyn CalendarClient,
    digest: &[u8],
) -> OtsResult<Timestamp> {
    let mut root = Timestamp::new(digest.to_vec());
    let mut succeeded = 0;
    let mut errors = Vec::new();

    for calendar_url in &config.calendar_urls {
        let result = match calendar.submit(calendar_url, digest).await {
            Ok(fragment) => root.merge(&fragment).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(()) => {
                succeeded += 1;
                tracing::info!(calendar_url = %calendar_url, "Calendar accepted digest");
            }
            Err(e) => {
                tracing::warn!(
                    calendar_url = %calendar_url,
                    error = %e,
                    "Calendar submission failed, trying next"
                );
                errors.push(format!("{calendar_url}: {e}"));
            }
        }
    }

    if succeeded < config.min_calendar_responses.max(1) {
        return Err(OtsError::CalendarUnavailable {
            succeeded,
            required: config.min_calendar_responses.max(1),
            details: errors.join("; "),
        });
    }

    Ok(root)
}

/// Ask calendars for newer attestations on every pending commitment
///
/// Calendar failures and "not found" answers leave the tree untouched.
/// Returns true if any new attestation was merged.
pub async fn upgrade(
    config: &OtsConfig,
    calendar: &dyn CalendarClient,
    timestamp: &mut Timestamp,
) -> bool {
    let mut known = timestamp.attestation_set();
    let mut changed = false;

    for pending in timestamp.pending_commitments() {
        let calendar_url = pending.calendar_url.as_str();

        if !config.is_whitelisted(calendar_url) {
            tracing::warn!(calendar_url = %calendar_url, "Ignoring attestation from calendar not in whitelist");
            continue;
        }

        let already_complete = timestamp
            .node_mut(&pending.path)
            .is_some_and(|node| node.is_complete());
        if already_complete {
            tracing::debug!(calendar_url = %calendar_url, "Commitment already complete, skipping");
            continue;
        }

        let fragment = match calendar.get_timestamp(calendar_url, &pending.commitment).await {
            Ok(Some(fragment)) => fragment,
            Ok(None) => {
                tracing::debug!(calendar_url = %calendar_url, "Calendar has no upgrade yet");
                continue;
            }
            Err(e) => {
                tracing::warn!(calendar_url = %calendar_url, error = %e, "Calendar upgrade failed");
                continue;
            }
        };

        let new: Vec<_> = fragment
            .attestation_set()
            .into_iter()
            .filter(|a| !known.contains(a))
            .collect();
        if new.is_empty() {
            continue;
        }

        let Some(node) = timestamp.node_mut(&pending.path) else {
            continue;
        };
        if let Err(e) = node.merge(&fragment) {
            tracing::warn!(calendar_url = %calendar_url, error = %e, "Discarding calendar response");
            continue;
        }

        for attestation in &new {
            tracing::info!(calendar_url = %calendar_url, attestation = %attestation, "Got new attestation");
        }
        known.extend(new);
        changed = true;
    }

    changed
}

/// Check the first Bitcoin attestation in the tree against the chain
pub async fn verify(explorer: &dyn BlockExplorer, timestamp: &Timestamp) -> VerifyOutcome {
    let Some((msg, height)) = timestamp
        .all_attestations()
        .into_iter()
        .find_map(|(msg, attestation)| attestation.bitcoin_height().map(|h| (msg, h)))
    else {
        return VerifyOutcome::Inconclusive {
            reason: InconclusiveReason::NoBitcoinAttestation,
        };
    };

    tracing::debug!(height = height, "Verifying Bitcoin attestation");

    let info = match lookup_block(explorer, height).await {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(height = height, error = %e, "Block lookup failed");
            return VerifyOutcome::Inconclusive {
                reason: InconclusiveReason::CollaboratorUnavailable {
                    height,
                    details: e.to_string(),
                },
            };
        }
    };

    let reversed: Vec<u8> = msg.iter().rev().copied().collect();
    if msg.len() != 32 || reversed != info.merkle_root {
        tracing::warn!(height = height, "Merkle root mismatch");
        return VerifyOutcome::Mismatch {
            block_height: height,
        };
    }

    tracing::info!(height = height, block_time = info.time, "Bitcoin attestation verified");
    VerifyOutcome::Verified {
        block_height: height,
        block_time: info.time,
    }
}

async fn lookup_block(
    explorer: &dyn BlockExplorer,
    height: u64,
) -> Result<BlockInfo, AnchorError> {
    let block_hash = explorer.block_hash_at(height).await?;
    explorer.block_info(&block_hash).await
}

/// Verify a proof for data whose digest has already been computed
///
/// # Errors
///
/// `OtsError::DigestMismatch` if `actual_digest` is not the proof's digest
pub async fn verify_file(
    explorer: &dyn BlockExplorer,
    file: &DetachedTimestampFile,
    actual_digest: &[u8],
) -> OtsResult<VerifyOutcome> {
    if actual_digest != file.file_digest() {
        return Err(OtsError::DigestMismatch {
            expected: hex::encode(file.file_digest()),
            actual: hex::encode(actual_digest),
        });
    }
    Ok(verify(explorer, &file.timestamp).await)
}

#[must_use]
pub fn info(file: &DetachedTimestampFile) -> String {
    file.info()
}

// Byte-level entry points

/// Stamp a digest and return the serialized proof
pub async fn stamp_digest(
    config: &OtsConfig,
    calendar: &dyn CalendarClient,
    file_hash_op: Op,
    digest: &[u8],
) -> OtsResult<Vec<u8>> {
    let mut file = DetachedTimestampFile::from_digest(file_hash_op, digest)?;
    stamp(config, calendar, &mut file).await?;
    Ok(file.to_bytes()?)
}

/// Hash a stream, stamp it and return the serialized proof
pub async fn stamp_reader<R: Read + Send>(
    config: &OtsConfig,
    calendar: &dyn CalendarClient,
    file_hash_op: Op,
    reader: R,
) -> OtsResult<Vec<u8>> {
    let mut file = DetachedTimestampFile::from_reader(file_hash_op, reader)?;
    stamp(config, calendar, &mut file).await?;
    Ok(file.to_bytes()?)
}

/// Upgrade a serialized proof; returns the new bytes and whether anything changed
pub async fn upgrade_proof(
    config: &OtsConfig,
    calendar: &dyn CalendarClient,
    proof: &[u8],
) -> OtsResult<(Vec<u8>, bool)> {
    let mut file = DetachedTimestampFile::from_bytes(proof)?;
    let changed = upgrade(config, calendar, &mut file.timestamp).await;
    let bytes = if changed {
        file.to_bytes()?
    } else {
        proof.to_vec()
    };
    Ok((bytes, changed))
}

pub async fn verify_proof(
    explorer: &dyn BlockExplorer,
    proof: &[u8],
    digest: &[u8],
) -> OtsResult<VerifyOutcome> {
    let file = DetachedTimestampFile::from_bytes(proof)?;
    verify_file(explorer, &file, digest).await
}

/// Verify a proof against the original data, hashed with the proof's own op
pub async fn verify_proof_reader<R: Read + Send>(
    explorer: &dyn BlockExplorer,
    proof: &[u8],
    reader: R,
) -> OtsResult<VerifyOutcome> {
    let file = DetachedTimestampFile::from_bytes(proof)?;
    let digest = file.file_hash_op.hash_reader(reader)?;
    verify_file(explorer, &file, &digest).await
}

pub fn info_proof(proof: &[u8]) -> OtsResult<String> {
    let file = DetachedTimestampFile::from_bytes(proof)?;
    Ok(info(&file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchoring::mock::{MockCalendar, MockExplorer};
    use crate::attestation::Attestation;

    const CAL_A: &str = "https://alice.btc.calendar.opentimestamps.org";
    const CAL_B: &str = "https://bob.btc.calendar.opentimestamps.org";

    fn config(urls: &[&str]) -> OtsConfig {
        OtsConfig::with_calendars(urls.iter().map(|s| (*s).to_string()).collect())
    }

    fn digest() -> Vec<u8> {
        Op::Sha256.call(b"engine test")
    }

    #[tokio::test]
    async fn test_stamp_builds_nonce_path() {
        let calendar = MockCalendar::new();
        let mut file = DetachedTimestampFile::from_digest(Op::Sha256, &digest()).unwrap();

        stamp(&config(&[CAL_A]), &calendar, &mut file).await.unwrap();

        let (append, after_append) = file.timestamp.ops().first().unwrap();
        assert!(matches!(append, Op::Append(nonce) if nonce.len() == NONCE_SIZE));
        let tip = after_append.child_for(&Op::Sha256).unwrap();
        assert!(tip.attestations_here().contains(&Attestation::pending(CAL_A)));
        assert_eq!(calendar.submit_calls(), 1);
    }

    #[tokio::test]
    async fn test_stamp_nonces_differ() {
        let calendar = MockCalendar::new();
        let a = stamp_digest(&config(&[CAL_A]), &calendar, Op::Sha256, &digest())
            .await
            .unwrap();
        let b = stamp_digest(&config(&[CAL_A]), &calendar, Op::Sha256, &digest())
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_stamp_tolerates_one_failing_calendar() {
        let calendar = MockCalendar::new().failing(CAL_A);
        let mut file = DetachedTimestampFile::from_digest(Op::Sha256, &digest()).unwrap();

        stamp(&config(&[CAL_A, CAL_B]), &calendar, &mut file)
            .await
            .unwrap();

        let uris: Vec<_> = file
            .timestamp
            .pending_commitments()
            .into_iter()
            .map(|p| p.calendar_url)
            .collect();
        assert_eq!(uris, vec![CAL_B.to_string()]);
        assert_eq!(calendar.submit_calls(), 2);
    }

    #[tokio::test]
    async fn test_stamp_requires_min_responses() {
        let calendar = MockCalendar::new().failing(CAL_A);
        let mut cfg = config(&[CAL_A, CAL_B]);
        cfg.min_calendar_responses = 2;
        let mut file = DetachedTimestampFile::from_digest(Op::Sha256, &digest()).unwrap();

        let err = stamp(&cfg, &calendar, &mut file).await.unwrap_err();
        match err {
            OtsError::CalendarUnavailable {
                succeeded,
                required,
                details,
            } => {
                assert_eq!(succeeded, 1);
                assert_eq!(required, 2);
                assert!(details.contains(CAL_A));
            }
            other => panic!("Expected CalendarUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stamp_without_calendars() {
        let calendar = MockCalendar::new();
        let mut file = DetachedTimestampFile::from_digest(Op::Sha256, &digest()).unwrap();

        let err = stamp(&config(&[]), &calendar, &mut file).await.unwrap_err();
        assert!(matches!(err, OtsError::Anchor(AnchorError::NotConfigured(_))));
        assert_eq!(calendar.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_stamp_batch_single_submission() {
        let calendar = MockCalendar::new();
        let mut files: Vec<_> = (0u8..3)
            .map(|i| DetachedTimestampFile::from_digest(Op::Sha256, &[i; 32]).unwrap())
            .collect();

        stamp_batch(&config(&[CAL_A]), &calendar, &mut files)
            .await
            .unwrap();

        assert_eq!(calendar.submit_calls(), 1);
        let commitments: Vec<_> = files
            .iter()
            .map(|f| f.timestamp.pending_commitments()[0].commitment.clone())
            .collect();
        assert!(commitments.iter().all(|c| c == &commitments[0]));
        for file in &files {
            assert!(file.to_bytes().is_ok());
        }
    }

    #[test]
    fn test_merkle_paths_lead_to_root() {
        let leaves: Vec<Vec<u8>> = (0u8..5).map(|i| vec![i; 32]).collect();
        let (paths, root) = merkle_paths(&leaves);

        for (leaf, path) in leaves.iter().zip(&paths) {
            let end = path.iter().fold(leaf.clone(), |msg, op| op.call(&msg));
            assert_eq!(end, root);
        }
        // the fifth leaf is carried up twice before its only pairing
        assert_eq!(paths[4].len(), 2);
        assert_eq!(paths[0].len(), 6);
    }

    #[test]
    fn test_merkle_paths_single_leaf() {
        let (paths, root) = merkle_paths(&[vec![7; 32]]);
        assert!(paths[0].is_empty());
        assert_eq!(root, vec![7; 32]);
    }

    fn pending_tree(calendar_url: &str) -> Timestamp {
        let mut ts = Timestamp::new(digest());
        ts.add_op(Op::Sha256)
            .add_attestation(Attestation::pending(calendar_url));
        ts
    }

    #[tokio::test]
    async fn test_upgrade_merges_new_attestation() {
        let calendar = MockCalendar::new().with_upgrade(CAL_A, 800_000);
        let mut ts = pending_tree(CAL_A);

        let changed = upgrade(&config(&[]), &calendar, &mut ts).await;

        assert!(changed);
        let all = ts.attestation_set();
        assert!(all.contains(&Attestation::pending(CAL_A)));
        assert!(all.contains(&Attestation::Bitcoin { height: 800_000 }));
    }

    #[tokio::test]
    async fn test_upgrade_is_idempotent() {
        let calendar = MockCalendar::new().with_upgrade(CAL_A, 800_000);
        let mut ts = pending_tree(CAL_A);

        assert!(upgrade(&config(&[]), &calendar, &mut ts).await);
        let after_first = ts.clone();
        assert!(!upgrade(&config(&[]), &calendar, &mut ts).await);
        assert_eq!(ts, after_first);
    }

    #[tokio::test]
    async fn test_upgrade_skips_non_whitelisted() {
        let calendar = MockCalendar::new().with_upgrade("https://evil.example", 1);
        let mut ts = pending_tree("https://evil.example");

        assert!(!upgrade(&config(&[]), &calendar, &mut ts).await);
        assert_eq!(calendar.upgrade_calls(), 0);
    }

    #[tokio::test]
    async fn test_upgrade_failure_is_no_change() {
        let calendar = MockCalendar::new().failing(CAL_A);
        let mut ts = pending_tree(CAL_A);
        let before = ts.clone();

        assert!(!upgrade(&config(&[]), &calendar, &mut ts).await);
        assert_eq!(ts, before);
        assert_eq!(calendar.upgrade_calls(), 1);
    }

    #[tokio::test]
    async fn test_upgrade_not_found_is_no_change() {
        let calendar = MockCalendar::new();
        let mut ts = pending_tree(CAL_A);

        assert!(!upgrade(&config(&[]), &calendar, &mut ts).await);
        assert_eq!(calendar.upgrade_calls(), 1);
    }

    fn bitcoin_tree(height: u64) -> Timestamp {
        let mut ts = Timestamp::new(digest());
        ts.add_op(Op::Sha256)
            .add_attestation(Attestation::Bitcoin { height });
        ts
    }

    fn merkle_root_for(ts: &Timestamp) -> Vec<u8> {
        let (msg, _) = &ts.all_attestations()[0];
        msg.iter().rev().copied().collect()
    }

    #[tokio::test]
    async fn test_verify_success() {
        let ts = bitcoin_tree(358_391);
        let explorer = MockExplorer::new().with_block(358_391, merkle_root_for(&ts), 1_432_827_678);

        assert_eq!(
            verify(&explorer, &ts).await,
            VerifyOutcome::Verified {
                block_height: 358_391,
                block_time: 1_432_827_678
            }
        );
    }

    #[tokio::test]
    async fn test_verify_mismatch() {
        let ts = bitcoin_tree(10);
        let mut root = merkle_root_for(&ts);
        root[0] ^= 0x01;
        let explorer = MockExplorer::new().with_block(10, root, 1);

        assert_eq!(
            verify(&explorer, &ts).await,
            VerifyOutcome::Mismatch { block_height: 10 }
        );
    }

    #[tokio::test]
    async fn test_verify_only_pending_is_inconclusive() {
        let explorer = MockExplorer::new();
        let outcome = verify(&explorer, &pending_tree(CAL_A)).await;

        assert_eq!(
            outcome,
            VerifyOutcome::Inconclusive {
                reason: InconclusiveReason::NoBitcoinAttestation
            }
        );
        assert_eq!(explorer.calls(), 0);
    }

    #[tokio::test]
    async fn test_verify_explorer_down_is_inconclusive() {
        let outcome = verify(&MockExplorer::unavailable(), &bitcoin_tree(5)).await;
        assert!(matches!(
            outcome,
            VerifyOutcome::Inconclusive {
                reason: InconclusiveReason::CollaboratorUnavailable { height: 5, .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_verify_checks_only_first_bitcoin_attestation() {
        let mut ts = Timestamp::new(digest());
        ts.add_op(Op::Sha256)
            .add_attestation(Attestation::Bitcoin { height: 1 });
        ts.add_op(Op::Reverse)
            .add_attestation(Attestation::Bitcoin { height: 2 });

        let good_second = ts.child_for(&Op::Reverse).unwrap().msg();
        let good_second: Vec<u8> = good_second.iter().rev().copied().collect();
        let explorer = MockExplorer::new()
            .with_block(1, vec![0; 32], 100)
            .with_block(2, good_second, 200);

        assert_eq!(
            verify(&explorer, &ts).await,
            VerifyOutcome::Mismatch { block_height: 1 }
        );
    }

    #[tokio::test]
    async fn test_verify_file_digest_mismatch() {
        let file = DetachedTimestampFile::new(Op::Sha256, bitcoin_tree(1)).unwrap();
        let explorer = MockExplorer::new();

        let err = verify_file(&explorer, &file, &[0; 32]).await.unwrap_err();
        assert!(matches!(err, OtsError::DigestMismatch { .. }));
    }

    #[tokio::test]
    async fn test_upgrade_proof_roundtrip() {
        let calendar = MockCalendar::new().with_upgrade(CAL_A, 700_000);
        let proof = stamp_digest(&config(&[CAL_A]), &calendar, Op::Sha256, &digest())
            .await
            .unwrap();

        let (upgraded, changed) = upgrade_proof(&config(&[CAL_A]), &calendar, &proof)
            .await
            .unwrap();
        assert!(changed);
        assert!(DetachedTimestampFile::from_bytes(&upgraded)
            .unwrap()
            .timestamp
            .is_complete());

        let (again, changed) = upgrade_proof(&config(&[CAL_A]), &calendar, &upgraded)
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(again, upgraded);
    }

    #[tokio::test]
    async fn test_verify_proof_reader() {
        let data = b"some document";
        let mut file = DetachedTimestampFile::from_reader(Op::Sha256, &data[..]).unwrap();
        file.timestamp
            .add_op(Op::Sha256)
            .add_attestation(Attestation::Bitcoin { height: 3 });
        let root: Vec<u8> = file
            .timestamp
            .child_for(&Op::Sha256)
            .unwrap()
            .msg()
            .iter()
            .rev()
            .copied()
            .collect();
        let proof = file.to_bytes().unwrap();
        let explorer = MockExplorer::new().with_block(3, root, 42);

        let outcome = verify_proof_reader(&explorer, &proof, &data[..]).await.unwrap();
        assert!(outcome.is_verified());

        let err = verify_proof_reader(&explorer, &proof, &b"tampered"[..])
            .await
            .unwrap_err();
        assert!(matches!(err, OtsError::DigestMismatch { .. }));
    }

    #[test]
    fn test_info_proof() {
        let file = DetachedTimestampFile::new(Op::Sha256, bitcoin_tree(9)).unwrap();
        let text = info_proof(&file.to_bytes().unwrap()).unwrap();
        assert!(text.starts_with("File sha256 hash: "));
        assert!(text.contains("verify BitcoinBlockHeaderAttestation(9)"));

        assert!(info_proof(b"not a proof").is_err());
    }
}

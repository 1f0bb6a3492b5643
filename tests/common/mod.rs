//! Shared collaborators for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use ots_client::anchoring::{BlockExplorer, BlockInfo, CalendarClient};
use ots_client::{AnchorError, Attestation, Op, Timestamp};

pub const CALENDAR: &str = "https://alice.btc.calendar.opentimestamps.org";
pub const BLOCK_HEIGHT: u64 = 358_391;
pub const BLOCK_TIME: u64 = 1_432_827_678;

/// Calendar that remembers submitted digests
///
/// Once `confirm()` is called, upgrade requests for a remembered digest
/// answer with `Sha256` followed by a Bitcoin attestation at [`BLOCK_HEIGHT`].
#[derive(Default)]
pub struct RecordingCalendar {
    submitted: Mutex<Vec<Vec<u8>>>,
    confirmed: AtomicBool,
    pub submit_count: AtomicUsize,
    pub upgrade_count: AtomicUsize,
}

impl RecordingCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm(&self) {
        self.confirmed.store(true, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl CalendarClient for RecordingCalendar {
    async fn submit(&self, calendar_url: &str, digest: &[u8]) -> Result<Timestamp, AnchorError> {
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(digest.to_vec());

        let mut fragment = Timestamp::new(digest.to_vec());
        fragment.add_attestation(Attestation::pending(calendar_url));
        Ok(fragment)
    }

    async fn get_timestamp(
        &self,
        _calendar_url: &str,
        commitment: &[u8],
    ) -> Result<Option<Timestamp>, AnchorError> {
        self.upgrade_count.fetch_add(1, Ordering::SeqCst);

        let known = self.submitted.lock().unwrap().iter().any(|d| d == commitment);
        if !known || !self.confirmed.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let mut fragment = Timestamp::new(commitment.to_vec());
        fragment
            .add_op(Op::Sha256)
            .add_attestation(Attestation::Bitcoin {
                height: BLOCK_HEIGHT,
            });
        Ok(Some(fragment))
    }
}

/// Explorer serving a fixed set of blocks
#[derive(Default)]
pub struct StaticExplorer {
    blocks: HashMap<u64, BlockInfo>,
    pub lookup_count: AtomicUsize,
}

impl StaticExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block(mut self, height: u64, merkle_root: Vec<u8>, time: u64) -> Self {
        self.blocks.insert(height, BlockInfo { merkle_root, time });
        self
    }
}

#[async_trait]
impl BlockExplorer for StaticExplorer {
    async fn block_hash_at(&self, height: u64) -> Result<String, AnchorError> {
        self.lookup_count.fetch_add(1, Ordering::SeqCst);
        if self.blocks.contains_key(&height) {
            Ok(format!("{height:064x}"))
        } else {
            Err(AnchorError::BlockNotFound(height))
        }
    }

    async fn block_info(&self, block_hash: &str) -> Result<BlockInfo, AnchorError> {
        let height = u64::from_str_radix(block_hash, 16)
            .map_err(|e| AnchorError::InvalidResponse(e.to_string()))?;
        self.blocks
            .get(&height)
            .cloned()
            .ok_or(AnchorError::BlockNotFound(height))
    }
}

/// Message a Bitcoin attestation commits to, if the tree has one
pub fn bitcoin_attested_msg(timestamp: &Timestamp) -> Option<Vec<u8>> {
    timestamp
        .all_attestations()
        .into_iter()
        .find(|(_, attestation)| attestation.bitcoin_height().is_some())
        .map(|(msg, _)| msg)
}

/// Merkle root as a block explorer reports it (byte-reversed)
pub fn explorer_root(msg: &[u8]) -> Vec<u8> {
    msg.iter().rev().copied().collect()
}

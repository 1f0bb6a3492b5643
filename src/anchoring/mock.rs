//! Mock collaborators for testing
//!
//! Configurable calendar and explorer implementations for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use super::calendar::CalendarClient;
use super::explorer::BlockExplorer;
use super::types::BlockInfo;
use crate::anchoring::error::AnchorError;
use crate::attestation::Attestation;
use crate::op::Op;
use crate::timestamp::Timestamp;

/// Mock calendar
///
/// `submit` answers with a pending attestation naming the calendar URL.
/// `get_timestamp` answers with a Bitcoin attestation for calendars set up
/// via [`MockCalendar::with_upgrade`], and "not found" otherwise.
#[derive(Default)]
pub struct MockCalendar {
    failing_urls: HashSet<String>,
    upgrades: HashMap<String, u64>,
    submit_call_count: AtomicUsize,
    upgrade_call_count: AtomicUsize,
}

impl MockCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calendar at `url` fails every request
    pub fn failing(mut self, url: &str) -> Self {
        self.failing_urls.insert(url.to_string());
        self
    }

    /// Calendar at `url` knows a Bitcoin attestation at `height`
    pub fn with_upgrade(mut self, url: &str, height: u64) -> Self {
        self.upgrades.insert(url.to_string(), height);
        self
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_call_count.load(Ordering::SeqCst)
    }

    pub fn upgrade_calls(&self) -> usize {
        self.upgrade_call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarClient for MockCalendar {
    async fn submit(&self, calendar_url: &str, digest: &[u8]) -> Result<Timestamp, AnchorError> {
        self.submit_call_count.fetch_add(1, Ordering::SeqCst);

        if self.failing_urls.contains(calendar_url) {
            return Err(AnchorError::Network("mock submit failure".into()));
        }

        let mut fragment = Timestamp::new(digest.to_vec());
        fragment.add_attestation(Attestation::pending(calendar_url));
        Ok(fragment)
    }

    async fn get_timestamp(
        &self,
        calendar_url: &str,
        commitment: &[u8],
    ) -> Result<Option<Timestamp>, AnchorError> {
        self.upgrade_call_count.fetch_add(1, Ordering::SeqCst);

        if self.failing_urls.contains(calendar_url) {
            return Err(AnchorError::Timeout(30));
        }

        Ok(self.upgrades.get(calendar_url).map(|&height| {
            let mut fragment = Timestamp::new(commitment.to_vec());
            fragment
                .add_op(Op::Sha256)
                .add_attestation(Attestation::Bitcoin { height });
            fragment
        }))
    }
}

/// Mock block explorer keyed by height
///
/// Block hashes are the height rendered as 64 hex digits.
#[derive(Default)]
pub struct MockExplorer {
    blocks: HashMap<u64, BlockInfo>,
    unavailable: AtomicBool,
    call_count: AtomicUsize,
}

impl MockExplorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block(mut self, height: u64, merkle_root: Vec<u8>, time: u64) -> Self {
        self.blocks.insert(height, BlockInfo { merkle_root, time });
        self
    }

    /// Explorer that fails every request
    pub fn unavailable() -> Self {
        Self {
            unavailable: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), AnchorError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AnchorError::Network("mock explorer unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlockExplorer for MockExplorer {
    async fn block_hash_at(&self, height: u64) -> Result<String, AnchorError> {
        self.check_available()?;
        if self.blocks.contains_key(&height) {
            Ok(format!("{height:064x}"))
        } else {
            Err(AnchorError::BlockNotFound(height))
        }
    }

    async fn block_info(&self, block_hash: &str) -> Result<BlockInfo, AnchorError> {
        self.check_available()?;
        u64::from_str_radix(block_hash, 16)
            .ok()
            .and_then(|height| self.blocks.get(&height).cloned())
            .ok_or_else(|| AnchorError::InvalidResponse(format!("unknown block {block_hash}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_calendar_submit() {
        let calendar = MockCalendar::new();
        let fragment = calendar.submit("https://mock.calendar", &[1; 32]).await.unwrap();

        assert_eq!(calendar.submit_calls(), 1);
        assert_eq!(fragment.msg(), &[1; 32]);
        assert!(fragment
            .attestations_here()
            .contains(&Attestation::pending("https://mock.calendar")));
    }

    #[tokio::test]
    async fn test_mock_calendar_failing() {
        let calendar = MockCalendar::new().failing("https://down");
        assert!(calendar.submit("https://down", &[0; 32]).await.is_err());
        assert!(calendar.get_timestamp("https://down", &[0; 32]).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_calendar_upgrade() {
        let calendar = MockCalendar::new().with_upgrade("https://up", 800_000);

        let none = calendar.get_timestamp("https://other", &[0; 32]).await.unwrap();
        assert!(none.is_none());

        let fragment = calendar
            .get_timestamp("https://up", &[0; 32])
            .await
            .unwrap()
            .unwrap();
        assert!(fragment.is_complete());
        assert_eq!(calendar.upgrade_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_explorer() {
        let explorer = MockExplorer::new().with_block(42, vec![9; 32], 1_700_000_000);

        let hash = explorer.block_hash_at(42).await.unwrap();
        let info = explorer.block_info(&hash).await.unwrap();
        assert_eq!(info.time, 1_700_000_000);
        assert_eq!(
            explorer.block_hash_at(43).await,
            Err(AnchorError::BlockNotFound(43))
        );
        assert_eq!(explorer.calls(), 3);

        let down = MockExplorer::unavailable();
        assert!(down.block_hash_at(42).await.is_err());
    }
}

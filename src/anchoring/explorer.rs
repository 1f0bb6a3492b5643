//! Bitcoin block lookup
//!
//! Verification needs two things per attested height: the block hash at that
//! height, and the Merkle root and time of that block.

use async_trait::async_trait;

use crate::anchoring::error::AnchorError;
use crate::anchoring::types::BlockInfo;

/// Source of Bitcoin block headers
#[async_trait]
pub trait BlockExplorer: Send + Sync {
    /// Hash (hex, display order) of the block at `height`
    async fn block_hash_at(&self, height: u64) -> Result<String, AnchorError>;

    async fn block_info(&self, block_hash: &str) -> Result<BlockInfo, AnchorError>;
}

#[cfg(feature = "http")]
pub use esplora::EsploraExplorer;

#[cfg(feature = "http")]
mod esplora {
    use std::collections::HashMap;
    use std::sync::RwLock;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::Deserialize;

    use super::BlockExplorer;
    use crate::anchoring::error::AnchorError;
    use crate::anchoring::types::BlockInfo;

    /// Subset of the Esplora `/block/{hash}` response
    #[derive(Debug, Deserialize)]
    struct EsploraBlock {
        merkle_root: String,
        timestamp: u64,
    }

    /// Esplora REST client (blockstream.info, mempool.space)
    ///
    /// Two-step lookup: `GET /block-height/{h}` returns the hash as text,
    /// `GET /block/{hash}` returns block JSON. Block info is cached per hash;
    /// a hash commits to its header, so entries never go stale.
    pub struct EsploraExplorer {
        client: reqwest::Client,
        base_url: String,
        timeout: Duration,
        cache: RwLock<HashMap<String, BlockInfo>>,
    }

    impl EsploraExplorer {
        pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, AnchorError> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .map_err(|e| AnchorError::Network(e.to_string()))?;

            Ok(Self {
                client,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                timeout: Duration::from_secs(timeout_secs),
                cache: RwLock::new(HashMap::new()),
            })
        }

        #[must_use]
        pub fn base_url(&self) -> &str {
            &self.base_url
        }

        fn map_send_error(&self, e: reqwest::Error) -> AnchorError {
            if e.is_timeout() {
                AnchorError::Timeout(self.timeout.as_secs())
            } else {
                AnchorError::Network(e.to_string())
            }
        }

        fn cached(&self, block_hash: &str) -> Option<BlockInfo> {
            self.cache
                .read()
                .ok()
                .and_then(|cache| cache.get(block_hash).cloned())
        }
    }

    #[async_trait]
    impl BlockExplorer for EsploraExplorer {
        async fn block_hash_at(&self, height: u64) -> Result<String, AnchorError> {
            let url = format!("{}/block-height/{height}", self.base_url);
            tracing::debug!(height = height, url = %url, "Fetching block hash");

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| self.map_send_error(e))?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(AnchorError::BlockNotFound(height));
            }
            if !response.status().is_success() {
                return Err(AnchorError::BlockFetchFailed {
                    height,
                    details: format!("Explorer returned status {}", response.status()),
                });
            }

            let text = response
                .text()
                .await
                .map_err(|e| AnchorError::Network(e.to_string()))?;
            let hash = text.trim();

            if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(AnchorError::InvalidResponse(format!(
                    "not a block hash: {hash:?}"
                )));
            }

            Ok(hash.to_ascii_lowercase())
        }

        async fn block_info(&self, block_hash: &str) -> Result<BlockInfo, AnchorError> {
            if let Some(info) = self.cached(block_hash) {
                return Ok(info);
            }

            let url = format!("{}/block/{block_hash}", self.base_url);
            tracing::debug!(block_hash = %block_hash, "Fetching block header");

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| self.map_send_error(e))?;

            if !response.status().is_success() {
                return Err(AnchorError::ServiceError(format!(
                    "Explorer returned status {}",
                    response.status()
                )));
            }

            let block = response
                .json::<EsploraBlock>()
                .await
                .map_err(|e| AnchorError::InvalidResponse(format!("JSON error: {e}")))?;

            let merkle_root = hex::decode(&block.merkle_root)
                .map_err(|e| AnchorError::InvalidResponse(format!("merkle_root: {e}")))?;
            if merkle_root.len() != 32 {
                return Err(AnchorError::InvalidResponse(format!(
                    "merkle_root is {} bytes",
                    merkle_root.len()
                )));
            }

            let info = BlockInfo {
                merkle_root,
                time: block.timestamp,
            };

            if let Ok(mut cache) = self.cache.write() {
                cache.insert(block_hash.to_string(), info.clone());
            }

            Ok(info)
        }
    }

}

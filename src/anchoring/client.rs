//! OpenTimestamps client
//!
//! Bundles configuration with a calendar and a block explorer so callers
//! deal in proof bytes only.

use std::io::Read;
use std::sync::Arc;

use crate::anchoring::calendar::CalendarClient;
use crate::anchoring::engine;
use crate::anchoring::explorer::BlockExplorer;
use crate::anchoring::types::VerifyOutcome;
use crate::config::OtsConfig;
use crate::detached::DetachedTimestampFile;
use crate::error::OtsResult;
use crate::op::Op;

pub struct OpenTimestampsClient {
    config: OtsConfig,
    calendar: Arc<dyn CalendarClient>,
    explorer: Arc<dyn BlockExplorer>,
}

impl OpenTimestampsClient {
    /// Create with HTTP collaborators built from `config`
    #[cfg(feature = "http")]
    pub fn with_config(config: OtsConfig) -> Result<Self, crate::anchoring::error::AnchorError> {
        use crate::anchoring::calendar::HttpCalendar;
        use crate::anchoring::explorer::EsploraExplorer;

        let calendar = HttpCalendar::new(config.timeout_secs)?;
        let explorer = EsploraExplorer::new(config.explorer_url.clone(), config.timeout_secs)?;

        Ok(Self::with_collaborators(
            config,
            Arc::new(calendar),
            Arc::new(explorer),
        ))
    }

    #[must_use]
    pub fn with_collaborators(
        config: OtsConfig,
        calendar: Arc<dyn CalendarClient>,
        explorer: Arc<dyn BlockExplorer>,
    ) -> Self {
        Self {
            config,
            calendar,
            explorer,
        }
    }

    #[must_use]
    pub fn config(&self) -> &OtsConfig {
        &self.config
    }

    /// Stamp a precomputed SHA-256 digest
    pub async fn stamp_digest(&self, digest: &[u8]) -> OtsResult<Vec<u8>> {
        engine::stamp_digest(&self.config, self.calendar.as_ref(), Op::Sha256, digest).await
    }

    /// Hash a stream with SHA-256 and stamp it
    pub async fn stamp_reader<R: Read + Send>(&self, reader: R) -> OtsResult<Vec<u8>> {
        engine::stamp_reader(&self.config, self.calendar.as_ref(), Op::Sha256, reader).await
    }

    /// Stamp several files with one calendar round-trip
    pub async fn stamp_files(&self, files: &mut [DetachedTimestampFile]) -> OtsResult<()> {
        engine::stamp_batch(&self.config, self.calendar.as_ref(), files).await
    }

    pub async fn upgrade_proof(&self, proof: &[u8]) -> OtsResult<(Vec<u8>, bool)> {
        engine::upgrade_proof(&self.config, self.calendar.as_ref(), proof).await
    }

    pub async fn verify_proof(&self, proof: &[u8], digest: &[u8]) -> OtsResult<VerifyOutcome> {
        engine::verify_proof(self.explorer.as_ref(), proof, digest).await
    }

    pub async fn verify_proof_reader<R: Read + Send>(
        &self,
        proof: &[u8],
        reader: R,
    ) -> OtsResult<VerifyOutcome> {
        engine::verify_proof_reader(self.explorer.as_ref(), proof, reader).await
    }

    pub fn info_proof(&self, proof: &[u8]) -> OtsResult<String> {
        engine::info_proof(proof)
    }
}

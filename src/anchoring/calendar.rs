//! Calendar server communication

use async_trait::async_trait;

use crate::anchoring::error::AnchorError;
use crate::timestamp::Timestamp;

/// A calendar that aggregates digests and later anchors them in Bitcoin
#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Submit a digest; the returned fragment is rooted at `digest`
    async fn submit(&self, calendar_url: &str, digest: &[u8]) -> Result<Timestamp, AnchorError>;

    /// Ask for a more complete timestamp for `commitment`
    ///
    /// `Ok(None)` means the calendar does not know the commitment yet.
    async fn get_timestamp(
        &self,
        calendar_url: &str,
        commitment: &[u8],
    ) -> Result<Option<Timestamp>, AnchorError>;
}

#[cfg(feature = "http")]
pub use http::HttpCalendar;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::CalendarClient;
    use crate::anchoring::error::AnchorError;
    use crate::timestamp::Timestamp;

    /// Largest calendar response accepted
    const MAX_RESPONSE_SIZE: usize = 10_000;

    /// Calendar client for HTTP communication with OTS servers
    pub struct HttpCalendar {
        client: reqwest::Client,
        timeout: Duration,
    }

    impl HttpCalendar {
        pub fn new(timeout_secs: u64) -> Result<Self, AnchorError> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .map_err(|e| AnchorError::Network(e.to_string()))?;

            Ok(Self {
                client,
                timeout: Duration::from_secs(timeout_secs),
            })
        }

        fn map_send_error(&self, e: reqwest::Error) -> AnchorError {
            if e.is_timeout() {
                AnchorError::Timeout(self.timeout.as_secs())
            } else {
                AnchorError::Network(e.to_string())
            }
        }

        async fn read_fragment(
            response: reqwest::Response,
            msg: &[u8],
        ) -> Result<Timestamp, AnchorError> {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| AnchorError::Network(e.to_string()))?;

            if bytes.len() > MAX_RESPONSE_SIZE {
                return Err(AnchorError::InvalidResponse(format!(
                    "response of {} bytes exceeds {MAX_RESPONSE_SIZE}",
                    bytes.len()
                )));
            }

            Timestamp::from_calendar_response(msg, &bytes)
                .map_err(|e| AnchorError::InvalidResponse(e.to_string()))
        }
    }

    #[async_trait]
    impl CalendarClient for HttpCalendar {
        async fn submit(
            &self,
            calendar_url: &str,
            digest: &[u8],
        ) -> Result<Timestamp, AnchorError> {
            tracing::debug!(calendar_url = %calendar_url, "Submitting to calendar");

            let url = format!("{}/digest", calendar_url.trim_end_matches('/'));

            let response = self
                .client
                .post(&url)
                .header("Content-Type", "application/x-opentimestamps")
                .body(digest.to_vec())
                .send()
                .await
                .map_err(|e| self.map_send_error(e))?;

            if !response.status().is_success() {
                return Err(AnchorError::ServiceError(format!(
                    "Calendar returned status {}",
                    response.status()
                )));
            }

            let fragment = Self::read_fragment(response, digest).await?;

            tracing::info!(calendar_url = %calendar_url, "Digest submitted successfully");

            Ok(fragment)
        }

        /// Sends GET request to `{calendar_url}/timestamp/{hex_commitment}`
        async fn get_timestamp(
            &self,
            calendar_url: &str,
            commitment: &[u8],
        ) -> Result<Option<Timestamp>, AnchorError> {
            let url = format!(
                "{}/timestamp/{}",
                calendar_url.trim_end_matches('/'),
                hex::encode(commitment)
            );

            tracing::debug!(url = %url, "Fetching timestamp from calendar");

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| self.map_send_error(e))?;

            // 404 = commitment not yet known
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                tracing::debug!(calendar_url = %calendar_url, "Timestamp not yet available at calendar");
                return Ok(None);
            }

            if !response.status().is_success() {
                return Err(AnchorError::ServiceError(format!(
                    "Calendar returned status {}",
                    response.status()
                )));
            }

            let fragment = Self::read_fragment(response, commitment).await?;

            tracing::info!(calendar_url = %calendar_url, "Timestamp fetched from calendar");

            Ok(Some(fragment))
        }
    }

}

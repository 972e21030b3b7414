use crate::config::{SourceConfig, SourceFormat};
use crate::domain::model::{parse_range_list, IpFamily, RangeSet};
use crate::utils::error::{Result, SyncError};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

/// Envelope of the provider's `/ips` API.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    success: bool,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    result: Option<ApiRanges>,
}

#[derive(Debug, Deserialize)]
struct ApiRanges {
    ipv4_cidrs: Vec<String>,
    ipv6_cidrs: Vec<String>,
}

/// Downloads the published ranges, retrying transient failures.
pub struct RangeFetcher {
    client: Client,
    source: SourceConfig,
}

impl RangeFetcher {
    pub fn new(source: SourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(source.timeout())
            .user_agent(concat!("edge-ip-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, source })
    }

    pub async fn fetch(&self) -> Result<RangeSet> {
        match self.source.format {
            SourceFormat::Text => {
                let v4 = self.fetch_text(&self.source.ipv4_url).await?;
                let v6 = self.fetch_text(&self.source.ipv6_url).await?;
                Ok(RangeSet {
                    ipv4: parse_range_list(v4.lines(), IpFamily::V4)?,
                    ipv6: parse_range_list(v6.lines(), IpFamily::V6)?,
                })
            }
            SourceFormat::Json => self.fetch_api().await,
        }
    }

    async fn fetch_api(&self) -> Result<RangeSet> {
        let body = self.fetch_text(&self.source.api_url).await?;
        let envelope: ApiEnvelope = serde_json::from_str(&body)?;

        let ranges = match (envelope.success, envelope.result) {
            (true, Some(ranges)) => ranges,
            (_, _) => {
                return Err(SyncError::FetchError {
                    url: self.source.api_url.clone(),
                    reason: format!("API reported failure: {:?}", envelope.errors),
                })
            }
        };

        Ok(RangeSet {
            ipv4: parse_range_list(ranges.ipv4_cidrs.iter().map(String::as_str), IpFamily::V4)?,
            ipv6: parse_range_list(ranges.ipv6_cidrs.iter().map(String::as_str), IpFamily::V6)?,
        })
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.try_fetch(url).await {
                Ok(body) => return Ok(body),
                Err((err, retryable)) => {
                    if !retryable || attempt >= self.source.retry_attempts {
                        return Err(err);
                    }
                    attempt += 1;
                    tracing::warn!(
                        "Fetching {} failed ({}), retry {}/{}",
                        url,
                        err,
                        attempt,
                        self.source.retry_attempts
                    );
                    tokio::time::sleep(self.source.retry_delay()).await;
                }
            }
        }
    }

    /// One GET. The flag says whether a retry could help.
    async fn try_fetch(&self, url: &str) -> std::result::Result<String, (SyncError, bool)> {
        tracing::debug!("Making request to: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| (SyncError::ApiError(e), true))?;

        let status = response.status();
        tracing::debug!("Response status: {}", status);
        if !status.is_success() {
            let retryable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
            return Err((
                SyncError::FetchError {
                    url: url.to_string(),
                    reason: format!("HTTP {}", status),
                },
                retryable,
            ));
        }

        response
            .text()
            .await
            .map_err(|e| (SyncError::ApiError(e), true))
    }
}

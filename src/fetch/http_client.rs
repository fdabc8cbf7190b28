use crate::config::FetcherConfig;
use anyhow::{Context, Result};
use rand::RngExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, REFERER};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Server-side statuses worth another attempt.
const RETRY_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

pub struct HttpClient {
    inner: reqwest::Client,
    config: FetcherConfig,
}

impl HttpClient {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !config.referer.is_empty() {
            headers.insert(REFERER, HeaderValue::from_str(&config.referer)?);
        }
        if !config.accept_language.is_empty() {
            headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_str(&config.accept_language)?);
        }

        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// Fetch a URL as raw bytes with rate-limiting and bounded retry.
    ///
    /// Bytes, not text: charset resolution belongs to the decoder, which
    /// needs the original stream.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.polite_delay().await;

        let mut last_err = anyhow::anyhow!("no attempts made");

        for attempt in 1..=(self.config.max_retries + 1) {
            debug!("GET {} (attempt {})", url, attempt);

            match self.inner.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let body = resp
                            .bytes()
                            .await
                            .context("Failed to read response body")?;
                        return Ok(body.to_vec());
                    } else if RETRY_STATUS.contains(&status.as_u16()) {
                        let backoff = Duration::from_millis(
                            self.config.request_delay_ms * 2u64.pow(attempt),
                        );
                        warn!(
                            "HTTP {} on attempt {}, sleeping {:?}",
                            status, attempt, backoff
                        );
                        sleep(backoff).await;
                        last_err = anyhow::anyhow!("HTTP {}", status);
                    } else {
                        // Don't retry other 4xx
                        return Err(anyhow::anyhow!("HTTP error {}", status));
                    }
                }
                Err(e) => {
                    let backoff =
                        Duration::from_millis(self.config.request_delay_ms * attempt as u64);
                    warn!("Request failed on attempt {}: {}", attempt, e);
                    last_err = anyhow::Error::from(e);
                    sleep(backoff).await;
                }
            }
        }

        Err(last_err).with_context(|| format!("All retries exhausted for {}", url))
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let jitter = if self.config.jitter_ms > 0 {
            rand::rng().random_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        let total = Duration::from_millis(self.config.request_delay_ms + jitter);
        sleep(total).await;
    }
}

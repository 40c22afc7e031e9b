//! Throttled HTTP page fetcher shared by all source adapters.
//!
//! One fetcher is created per job. Every request after the first is
//! preceded by the source's configured throttle delay, so probe-style
//! adapters (which issue hundreds of requests) stay polite.

use anyhow::{bail, Context, Result};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::models::RawContent;

pub struct PageFetcher {
    client: reqwest::Client,
    throttle: Duration,
    first_done: AtomicBool,
}

impl PageFetcher {
    pub fn new(user_agent: &str, timeout_secs: u64, throttle_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            throttle: Duration::from_millis(throttle_ms),
            first_done: AtomicBool::new(false),
        })
    }

    async fn throttle(&self) {
        if self.first_done.swap(true, Ordering::SeqCst) && !self.throttle.is_zero() {
            tokio::time::sleep(self.throttle).await;
        }
    }

    /// Fetch a page. Returns `Ok(None)` on 404 so probe-style discovery can
    /// skip missing record ids without treating them as failures.
    pub async fn get(&self, url: &str) -> Result<Option<RawContent>> {
        self.throttle().await;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Request failed: {}", url))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            bail!("HTTP {} fetching {}", response.status(), url);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read body: {}", url))?;

        Ok(Some(RawContent { body, content_type }))
    }

    /// Fetch a page that must exist; a 404 is an error here.
    pub async fn get_required(&self, url: &str) -> Result<RawContent> {
        match self.get(url).await? {
            Some(content) => Ok(content),
            None => bail!("HTTP 404 fetching {}", url),
        }
    }
}

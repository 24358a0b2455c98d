use crate::config::ScraperConfig;
use crate::error::FetchError;
use anyhow::{Context, Result};
use reqwest::Response;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Thin reqwest wrapper. One call is one round trip: no retry, no pagination.
pub struct HttpClient {
    inner: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { inner })
    }

    pub async fn get_text(&self, url: &Url) -> Result<String, FetchError> {
        debug!("GET {}", url);
        let resp = self.inner.get(url.clone()).send().await?;
        Self::body(url, resp).await
    }

    pub async fn post_text(&self, url: &Url, body: String) -> Result<String, FetchError> {
        debug!("POST {}", url);
        let resp = self.inner.post(url.clone()).body(body).send().await?;
        Self::body(url, resp).await
    }

    async fn body(url: &Url, resp: Response) -> Result<String, FetchError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }
}

//! HTTP feed fetching.
//!
//! The only suspension point in a sync run. Bounded by a client timeout so a
//! hung feed can never stall the batch, and validated to actually be
//! iCalendar data before the parser sees it.

use std::time::Duration;

use anyhow::{Context, Result};
use icalsync_core::{FeedFetcher, FetchError};
use url::Url;

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("icalsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

/// Subscription links often use the webcal:// scheme; it is plain HTTPS.
fn rewrite_webcal(url: &str) -> Result<String, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::Unreachable {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    match parsed.scheme() {
        "webcal" => Ok(url.replacen("webcal://", "https://", 1)),
        _ => Ok(url.to_string()),
    }
}

impl FeedFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let target = rewrite_webcal(url)?;

        let response = self
            .client
            .get(&target)
            .send()
            .map_err(|e| FetchError::Unreachable {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let body = response.text().map_err(|e| FetchError::Unreachable {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        // Some servers label feeds text/plain or octet-stream, so judge by
        // the body rather than the header alone.
        if !body.trim_start().starts_with("BEGIN:VCALENDAR") {
            return Err(FetchError::NotCalendar {
                url: url.to_string(),
                content_type,
            });
        }

        Ok(body)
    }
}

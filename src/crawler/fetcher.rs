//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client
//! - Rotating the User-Agent header across requests
//! - Bounded retry with a cooldown once every attempt has failed
//! - Error classification

use crate::config::FetchConfig;
use rand::seq::SliceRandom;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while fetching a page
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (connection, timeout, body read)
    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    /// The server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Every attempt failed; the identifier should be retried later
    #[error("Gave up on {oid} after {attempts} attempts: {last}")]
    Exhausted {
        oid: String,
        attempts: u32,
        last: String,
    },
}

impl FetchError {
    /// True when the caller should re-queue the identifier
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// True for client errors that no retry will fix
    ///
    /// 408 and 429 are the server asking for a later attempt.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            _ => false,
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// The User-Agent is not fixed on the client; [`Fetcher`] sets one per
/// request from its pool.
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(config.timeout())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages of the reference site by identifier
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    base_url: String,
    user_agents: Vec<String>,
    max_attempts: u32,
    retry_delay: Duration,
    cooldown: Duration,
}

impl Fetcher {
    /// Creates a fetcher from the fetch configuration
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config)?;
        Ok(Self::with_client(client, config))
    }

    /// Creates a fetcher around an existing client
    pub fn with_client(client: Client, config: &FetchConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agents: config.user_agents.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
            cooldown: config.cooldown(),
        }
    }

    /// Address of the page for `oid`
    pub fn url_for(&self, oid: &str) -> String {
        format!("{}{}", self.base_url, oid)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Fetches the page body for `oid`
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Transport error, 5xx, 408 or 429 | Retry, up to `max_attempts` in total |
    /// | Other 4xx | Return the `Status` error at once |
    /// | All attempts failed | Sleep `cooldown`, return `Exhausted` |
    ///
    /// The loop never runs more than `max_attempts` requests.
    pub async fn fetch(&self, oid: &str) -> Result<Vec<u8>, FetchError> {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.get_once(oid).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_permanent() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        "Fetch attempt {}/{} for {} failed: {}",
                        attempt,
                        self.max_attempts,
                        oid,
                        e
                    );
                    last_error = Some(e);
                }
            }

            if attempt < self.max_attempts && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        tracing::warn!(
            "Could not fetch {} after {} attempts, cooling down for {:?}",
            oid,
            self.max_attempts,
            self.cooldown
        );
        tokio::time::sleep(self.cooldown).await;

        Err(FetchError::Exhausted {
            oid: oid.to_string(),
            attempts: self.max_attempts,
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }

    /// Sends a single GET request
    async fn get_once(&self, oid: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.url_for(oid);

        let response = self
            .client
            .get(&url)
            .header(USER_AGENT, self.pick_user_agent())
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Http { url, source })?;
        Ok(body.to_vec())
    }
}

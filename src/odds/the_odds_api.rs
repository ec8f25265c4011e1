//! The Odds API client.
//!
//! API docs: https://the-odds-api.com/liveapi/guides/v4/
//! Auth: `apiKey` query parameter. Every call consumes request quota, so
//! nothing here retries; failures come back as [`FetchOutcome::Failed`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{FetchOutcome, OddsProvider, Payload, UpstreamError};
use crate::config::OddsConfig;

pub struct TheOddsApiClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    regions: String,
    odds_format: String,
}

impl TheOddsApiClient {
    pub fn new(cfg: &OddsConfig, api_key: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .user_agent(concat!("paperbook/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build odds HTTP client")?;
        if api_key.is_none() {
            warn!("No odds API key configured; odds requests will return no data");
        }
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            regions: cfg.regions.clone(),
            odds_format: cfg.odds_format.clone(),
        })
    }

    async fn get_list(&self, url: &str, query: &[(&str, &str)]) -> FetchOutcome<Payload> {
        let Some(key) = self.api_key.as_ref() else {
            return FetchOutcome::Failed(UpstreamError::NotConfigured);
        };

        let resp = match self
            .http
            .get(url)
            .query(&[("apiKey", key.expose_secret().as_str())])
            .query(query)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                // reqwest errors carry the full URL, `apiKey` included.
                let e = e.without_url();
                error!(url, error = %e, "Odds API request failed");
                return FetchOutcome::Failed(UpstreamError::Transport(e.to_string()));
            }
        };

        match resp.status() {
            StatusCode::OK => {}
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(url, "Rate limited by Odds API");
                return FetchOutcome::Failed(UpstreamError::RateLimited);
            }
            status => {
                error!(url, status = status.as_u16(), "Odds API error");
                return FetchOutcome::Failed(UpstreamError::Status(status.as_u16()));
            }
        }

        if let Some(remaining) = resp.headers().get("x-requests-remaining") {
            debug!(remaining = ?remaining, "Odds API quota");
        }

        match resp.json::<Payload>().await {
            Ok(data) => FetchOutcome::Fetched(data),
            Err(e) => {
                let e = e.without_url();
                error!(url, error = %e, "Failed to decode Odds API response");
                FetchOutcome::Failed(UpstreamError::Transport(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl OddsProvider for TheOddsApiClient {
    async fn fetch_odds(&self, sport_key: &str, markets: &str) -> FetchOutcome<Payload> {
        let url = format!(
            "{}/sports/{}/odds",
            self.base_url,
            urlencoding::encode(sport_key)
        );
        let query = [
            ("regions", self.regions.as_str()),
            ("markets", markets),
            ("oddsFormat", self.odds_format.as_str()),
        ];
        let outcome = self.get_list(&url, &query).await;
        if let FetchOutcome::Fetched(ref events) = outcome {
            debug!(sport_key, markets, events = events.len(), "Fetched odds");
        }
        outcome
    }

    async fn fetch_available_sports(&self) -> FetchOutcome<Payload> {
        let url = format!("{}/sports", self.base_url);
        self.get_list(&url, &[]).await
    }
}

//! Odds data: provider abstraction, supported sports catalogue, and the
//! TTL cache that sits in front of the provider.
//!
//! The provider is rate-limited and best-effort. Its results are tagged so
//! callers can tell "no games" apart from "provider failing".

pub mod cache;
pub mod the_odds_api;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use crate::types::{BetType, BookError};

/// Raw odds/sports objects, passed through untouched.
pub type Payload = Vec<serde_json::Value>;

/// Why a provider call produced no data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// HTTP 429 from the provider.
    RateLimited,
    /// Any other non-200 status.
    Status(u16),
    /// Connection, timeout or decoding failure.
    Transport(String),
    /// No API key configured.
    NotConfigured,
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::RateLimited => write!(f, "odds provider rate limit reached"),
            UpstreamError::Status(code) => write!(f, "odds provider returned HTTP {code}"),
            UpstreamError::Transport(msg) => write!(f, "odds provider unreachable: {msg}"),
            UpstreamError::NotConfigured => write!(f, "odds provider API key not configured"),
        }
    }
}

impl Serialize for UpstreamError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of a provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Fetched(T),
    Failed(UpstreamError),
}

impl FetchOutcome<Payload> {
    /// Payload, or an empty list on failure, plus the failure if any.
    pub fn into_parts(self) -> (Payload, Option<UpstreamError>) {
        match self {
            FetchOutcome::Fetched(data) => (data, None),
            FetchOutcome::Failed(err) => (Vec::new(), Some(err)),
        }
    }
}

/// Abstraction over the external odds source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OddsProvider: Send + Sync {
    /// Event odds for one sport and a comma-separated market list.
    async fn fetch_odds(&self, sport_key: &str, markets: &str) -> FetchOutcome<Payload>;

    /// Every sport the provider currently offers.
    async fn fetch_available_sports(&self) -> FetchOutcome<Payload>;
}

// ---------------------------------------------------------------------------
// Supported sports
// ---------------------------------------------------------------------------

/// A sport offered in the UI.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct SportInfo {
    pub key: &'static str,
    pub title: &'static str,
    pub group: &'static str,
}

pub const SUPPORTED_SPORTS: &[SportInfo] = &[
    SportInfo { key: "americanfootball_nfl", title: "NFL", group: "American Football" },
    SportInfo { key: "basketball_nba", title: "NBA", group: "Basketball" },
    SportInfo { key: "baseball_mlb", title: "MLB", group: "Baseball" },
    SportInfo { key: "americanfootball_ncaaf", title: "NCAA Football", group: "American Football" },
    SportInfo { key: "basketball_ncaab", title: "NCAA Basketball", group: "Basketball" },
    SportInfo { key: "icehockey_nhl", title: "NHL", group: "Ice Hockey" },
    SportInfo { key: "soccer_epl", title: "EPL", group: "Soccer" },
    SportInfo { key: "soccer_germany_bundesliga", title: "Bundesliga", group: "Soccer" },
    SportInfo { key: "soccer_usa_mls", title: "MLS", group: "Soccer" },
    SportInfo { key: "soccer_uefa_champs_league", title: "UEFA Champions League", group: "Soccer" },
];

pub fn find_sport(key: &str) -> Option<&'static SportInfo> {
    SUPPORTED_SPORTS.iter().find(|s| s.key == key)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Sport keys are lowercase ASCII identifiers, e.g. `basketball_nba`.
pub fn validate_sport_key(sport_key: &str) -> Result<(), BookError> {
    let valid = !sport_key.is_empty()
        && sport_key.len() <= 64
        && sport_key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BookError::InvalidInput(format!("invalid sport key: {sport_key:?}")))
    }
}

/// Markets must be a comma-separated list of known bet types.
pub fn validate_markets(markets: &str) -> Result<(), BookError> {
    if markets.is_empty() {
        return Err(BookError::InvalidInput("markets must not be empty".into()));
    }
    for market in markets.split(',') {
        market.parse::<BetType>()?;
    }
    Ok(())
}

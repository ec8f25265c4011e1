//! API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ServiceState>`.
//! Domain errors map to status codes in the `IntoResponse` impl below.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::extract::{ApiJson, ApiQuery};
use crate::engine::{BetBook, Cancellation, Settlement};
use crate::odds::cache::{CacheEntryStatus, OddsCache};
use crate::odds::{OddsProvider, Payload, SportInfo, UpstreamError, SUPPORTED_SPORTS};
use crate::types::{Bet, BetStatus, BettingStats, BookError, NewBet, Outcome, Wallet};

/// Header carrying the admin token for privileged routes.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Sports shown by the preview endpoint, and games per sport.
const PREVIEW_SPORTS: usize = 4;
const PREVIEW_GAMES: usize = 3;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ServiceState {
    pub book: BetBook,
    pub odds: OddsCache,
    pub provider: Arc<dyn OddsProvider>,
    /// Markets used when the client does not pass `?markets=`.
    pub default_markets: String,
    /// `None` disables privileged routes.
    pub admin_token: Option<SecretString>,
}

pub type AppState = Arc<ServiceState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
    code: &'static str,
}

impl IntoResponse for BookError {
    fn into_response(self) -> Response {
        let status = match &self {
            BookError::InsufficientFunds { .. }
            | BookError::InvalidState(_)
            | BookError::InvalidAction(_)
            | BookError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            BookError::NotFound(_) => StatusCode::NOT_FOUND,
            BookError::Forbidden => StatusCode::FORBIDDEN,
            BookError::Storage(_) | BookError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let detail = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorBody { detail, code: self.code() })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, BookError>;

fn require_admin(state: &ServiceState, headers: &HeaderMap) -> Result<(), BookError> {
    let Some(expected) = state.admin_token.as_ref() else {
        warn!("Privileged route called but no admin token is configured");
        return Err(BookError::Forbidden);
    };
    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    match provided {
        Some(token) if token == expected.expose_secret().as_str() => Ok(()),
        _ => {
            warn!("Rejected privileged request: bad admin token");
            Err(BookError::Forbidden)
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SportsResponse {
    pub sports: Vec<SportInfo>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct AvailableSportsResponse {
    pub sports: Payload,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UpstreamError>,
}

#[derive(Debug, Deserialize)]
pub struct OddsQuery {
    pub markets: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OddsResponse {
    pub odds: Payload,
    pub cached: bool,
    pub sport_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UpstreamError>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub odds: Payload,
    pub refreshed: bool,
    pub sport_key: String,
    pub games_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UpstreamError>,
}

#[derive(Debug, Serialize)]
pub struct PreviewSport {
    pub title: &'static str,
    pub games: Payload,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub preview: BTreeMap<&'static str, PreviewSport>,
}

#[derive(Debug, Serialize)]
pub struct CacheStatusResponse {
    pub cache_entries: Vec<CacheEntryStatus>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct WalletUpdate {
    pub amount: Decimal,
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct WalletUpdateResponse {
    pub balance: Decimal,
    pub action: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PlaceBetResponse {
    pub bet: Bet,
    pub new_balance: Decimal,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct BetsQuery {
    pub status: Option<BetStatus>,
}

#[derive(Debug, Serialize)]
pub struct BetsResponse {
    pub bets: Vec<Bet>,
    pub count: usize,
}

impl From<Vec<Bet>> for BetsResponse {
    fn from(bets: Vec<Bet>) -> Self {
        Self { count: bets.len(), bets }
    }
}

#[derive(Debug, Deserialize)]
pub struct SettleQuery {
    pub result: Outcome,
}

#[derive(Debug, Serialize)]
pub struct SettleResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub settlement: Settlement,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub cancellation: Cancellation,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/
pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Paperbook API", "status": "CONNECTED" }))
}

/// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "timestamp": Utc::now().to_rfc3339() }))
}

/// GET /api/sports
pub async fn get_sports() -> Json<SportsResponse> {
    Json(SportsResponse {
        sports: SUPPORTED_SPORTS.to_vec(),
        count: SUPPORTED_SPORTS.len(),
    })
}

/// GET /api/sports/available
pub async fn get_available_sports(State(state): State<AppState>) -> Json<AvailableSportsResponse> {
    let (sports, error) = state.provider.fetch_available_sports().await.into_parts();
    Json(AvailableSportsResponse { count: sports.len(), sports, error })
}

/// GET /api/odds/:sport_key
pub async fn get_odds(
    State(state): State<AppState>,
    Path(sport_key): Path<String>,
    ApiQuery(query): ApiQuery<OddsQuery>,
) -> ApiResult<OddsResponse> {
    let markets = query.markets.unwrap_or_else(|| state.default_markets.clone());
    let lookup = state.odds.get(&sport_key, &markets).await?;
    Ok(Json(OddsResponse {
        odds: lookup.odds,
        cached: lookup.cached,
        sport_key,
        error: lookup.upstream_error,
    }))
}

/// GET /api/odds/all/preview
pub async fn get_odds_preview(State(state): State<AppState>) -> ApiResult<PreviewResponse> {
    let sports = &SUPPORTED_SPORTS[..PREVIEW_SPORTS];
    let lookups = futures::future::join_all(
        sports.iter().map(|sport| preview_sport(&state.odds, sport)),
    )
    .await;

    let mut preview = BTreeMap::new();
    for (sport, games) in sports.iter().zip(lookups) {
        preview.insert(sport.key, PreviewSport { title: sport.title, games: games? });
    }
    Ok(Json(PreviewResponse { preview }))
}

async fn preview_sport(odds: &OddsCache, sport: &SportInfo) -> Result<Payload, BookError> {
    let mut games = odds.get(sport.key, "h2h").await?.odds;
    games.truncate(PREVIEW_GAMES);
    Ok(games)
}

/// POST /api/odds/refresh/:sport_key (requires `x-admin-token`)
pub async fn refresh_odds(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sport_key): Path<String>,
) -> ApiResult<RefreshResponse> {
    require_admin(&state, &headers)?;
    let lookup = state.odds.force_refresh(&sport_key, &state.default_markets).await?;
    info!(sport_key = %sport_key, games = lookup.odds.len(), "Odds refreshed on request");
    Ok(Json(RefreshResponse {
        games_count: lookup.odds.len(),
        odds: lookup.odds,
        refreshed: true,
        sport_key,
        error: lookup.upstream_error,
    }))
}

/// GET /api/cache/status
pub async fn get_cache_status(State(state): State<AppState>) -> ApiResult<CacheStatusResponse> {
    let cache_entries = state.odds.entries().await?;
    Ok(Json(CacheStatusResponse { count: cache_entries.len(), cache_entries }))
}

/// GET /api/wallet
pub async fn get_wallet(State(state): State<AppState>) -> ApiResult<Wallet> {
    Ok(Json(state.book.ledger().wallet().await?))
}

/// POST /api/wallet/update
pub async fn update_wallet(
    State(state): State<AppState>,
    ApiJson(update): ApiJson<WalletUpdate>,
) -> ApiResult<WalletUpdateResponse> {
    let balance = state.book.ledger().apply(&update.action, update.amount).await?;
    Ok(Json(WalletUpdateResponse {
        balance,
        action: update.action,
        amount: update.amount,
    }))
}

/// POST /api/bets
pub async fn place_bet(
    State(state): State<AppState>,
    ApiJson(new_bet): ApiJson<NewBet>,
) -> ApiResult<PlaceBetResponse> {
    let placed = state.book.place(new_bet).await?;
    Ok(Json(PlaceBetResponse {
        bet: placed.bet,
        new_balance: placed.new_balance,
        message: "Bet placed successfully",
    }))
}

/// GET /api/bets?status=
pub async fn list_bets(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<BetsQuery>,
) -> ApiResult<BetsResponse> {
    Ok(Json(state.book.list(query.status).await?.into()))
}

/// GET /api/bets/active
pub async fn get_active_bets(State(state): State<AppState>) -> ApiResult<BetsResponse> {
    Ok(Json(state.book.active().await?.into()))
}

/// GET /api/bets/history
pub async fn get_bet_history(State(state): State<AppState>) -> ApiResult<BetsResponse> {
    Ok(Json(state.book.history().await?.into()))
}

/// PATCH /api/bets/:bet_id/settle?result=won|lost
pub async fn settle_bet(
    State(state): State<AppState>,
    Path(bet_id): Path<String>,
    ApiQuery(query): ApiQuery<SettleQuery>,
) -> ApiResult<SettleResponse> {
    let settlement = state.book.settle(&bet_id, query.result).await?;
    let message = match query.result {
        Outcome::Won => "Bet won!",
        Outcome::Lost => "Bet lost",
    };
    Ok(Json(SettleResponse { message, settlement }))
}

/// DELETE /api/bets/:bet_id
pub async fn cancel_bet(
    State(state): State<AppState>,
    Path(bet_id): Path<String>,
) -> ApiResult<CancelResponse> {
    let cancellation = state.book.cancel(&bet_id).await?;
    Ok(Json(CancelResponse {
        message: "Bet cancelled and refunded",
        cancellation,
    }))
}

/// GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<BettingStats> {
    Ok(Json(state.book.stats().await?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

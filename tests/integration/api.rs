//! HTTP-level scenarios driven through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use paperbook::engine::{BetBook, WalletLedger};
use paperbook::odds::cache::OddsCache;
use paperbook::odds::{FetchOutcome, OddsProvider, UpstreamError};
use paperbook::server::{build_router, ServiceState, ADMIN_TOKEN_HEADER};
use paperbook::storage::{connect_in_memory, ensure_wallet};

use crate::mock_provider::{sample_games, MockProvider};

const ADMIN_TOKEN: &str = "let-me-in";

struct Harness {
    app: Router,
    provider: Arc<MockProvider>,
}

async fn harness(provider: MockProvider) -> Harness {
    let pool = connect_in_memory().await.unwrap();
    ensure_wallet(&pool, "main_wallet", dec!(1000)).await.unwrap();

    let provider = Arc::new(provider);
    let dyn_provider: Arc<dyn OddsProvider> = provider.clone();
    let ledger = WalletLedger::new(pool.clone(), "main_wallet");
    let state = Arc::new(ServiceState {
        book: BetBook::new(pool.clone(), ledger),
        odds: OddsCache::new(pool, dyn_provider.clone(), chrono::Duration::hours(24), false),
        provider: dyn_provider,
        default_markets: "h2h,spreads,totals".into(),
        admin_token: Some(SecretString::new(ADMIN_TOKEN.to_string())),
    });

    Harness {
        app: build_router(state, &["*".to_string()]),
        provider,
    }
}

impl Harness {
    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call_with(method, uri, body, None).await
    }

    async fn call_with(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        admin_token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = admin_token {
            req = req.header(ADMIN_TOKEN_HEADER, token);
        }
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn balance(&self) -> f64 {
        let (_, wallet) = self.call("GET", "/api/wallet", None).await;
        wallet["balance"].as_f64().unwrap()
    }

    async fn place(&self, amount: f64, payout: f64) -> (StatusCode, Value) {
        self.call("POST", "/api/bets", Some(bet_body(amount, payout))).await
    }
}

fn bet_body(amount: f64, payout: f64) -> Value {
    json!({
        "event_id": "evt-1",
        "sport_key": "basketball_nba",
        "sport_title": "NBA",
        "home_team": "Los Angeles Lakers",
        "away_team": "Boston Celtics",
        "selected_team": "Los Angeles Lakers",
        "bet_type": "h2h",
        "odds": 150,
        "amount": amount,
        "potential_payout": payout,
        "commence_time": "2030-01-01T00:00:00Z"
    })
}

// ---------------------------------------------------------------------------
// Bets and wallet
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_place_and_win_scenario() {
    let h = harness(MockProvider::with_games(0)).await;

    let (status, placed) = h.place(100.0, 180.0).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(placed["new_balance"].as_f64(), Some(900.0));
    assert_eq!(placed["bet"]["status"], "pending");
    let bet_id = placed["bet"]["id"].as_str().unwrap().to_string();

    let (_, wallet) = h.call("GET", "/api/wallet", None).await;
    assert_eq!(wallet["total_wagered"].as_f64(), Some(100.0));

    let (status, settled) = h
        .call("PATCH", &format!("/api/bets/{bet_id}/settle?result=won"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settled["message"], "Bet won!");
    assert_eq!(settled["payout"].as_f64(), Some(180.0));
    assert_eq!(settled["new_balance"].as_f64(), Some(1080.0));

    let (_, stats) = h.call("GET", "/api/stats", None).await;
    assert_eq!(stats["won_bets"], 1);
    assert_eq!(stats["pending_bets"], 0);
    assert_eq!(stats["win_rate"].as_f64(), Some(100.0));
    assert_eq!(stats["wallet"]["total_won"].as_f64(), Some(180.0));
}

#[tokio::test]
async fn test_place_and_cancel_scenario() {
    let h = harness(MockProvider::with_games(0)).await;

    let (_, placed) = h.place(50.0, 95.45).await;
    let bet_id = placed["bet"]["id"].as_str().unwrap().to_string();
    assert_eq!(h.balance().await, 950.0);

    let (status, cancelled) = h.call("DELETE", &format!("/api/bets/{bet_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["refund"].as_f64(), Some(50.0));
    assert_eq!(cancelled["new_balance"].as_f64(), Some(1000.0));

    let (_, wallet) = h.call("GET", "/api/wallet", None).await;
    assert_eq!(wallet["total_wagered"].as_f64(), Some(0.0));

    let (_, bets) = h.call("GET", "/api/bets", None).await;
    assert_eq!(bets["count"], 0);
    let (_, history) = h.call("GET", "/api/bets/history", None).await;
    assert_eq!(history["count"], 0);
}

#[tokio::test]
async fn test_lost_bet_keeps_balance_and_counts_loss() {
    let h = harness(MockProvider::with_games(0)).await;
    let (_, placed) = h.place(40.0, 76.0).await;
    let bet_id = placed["bet"]["id"].as_str().unwrap().to_string();

    let (status, settled) = h
        .call("PATCH", &format!("/api/bets/{bet_id}/settle?result=lost"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settled["message"], "Bet lost");
    assert_eq!(settled["new_balance"].as_f64(), Some(960.0));

    let (_, stats) = h.call("GET", "/api/stats", None).await;
    assert_eq!(stats["lost_bets"], 1);
    assert_eq!(stats["win_rate"].as_f64(), Some(0.0));
    assert_eq!(stats["wallet"]["total_lost"].as_f64(), Some(40.0));
}

#[tokio::test]
async fn test_overdraft_rejected_without_side_effects() {
    let h = harness(MockProvider::with_games(0)).await;

    let (status, err) = h.place(1000.01, 2000.0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "insufficient_funds");
    assert_eq!(h.balance().await, 1000.0);

    let (_, bets) = h.call("GET", "/api/bets", None).await;
    assert_eq!(bets["count"], 0);
}

#[tokio::test]
async fn test_invalid_amounts_rejected() {
    let h = harness(MockProvider::with_games(0)).await;
    for amount in [0.0, -5.0, 1.234] {
        let (status, err) = h.place(amount, 10.0).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "amount {amount}");
        assert_eq!(err["code"], "invalid_input");
    }
    assert_eq!(h.balance().await, 1000.0);
}

#[tokio::test]
async fn test_settled_bet_is_final() {
    let h = harness(MockProvider::with_games(0)).await;
    let (_, placed) = h.place(100.0, 180.0).await;
    let bet_id = placed["bet"]["id"].as_str().unwrap().to_string();
    let settle = format!("/api/bets/{bet_id}/settle?result=won");

    let (status, _) = h.call("PATCH", &settle, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, err) = h.call("PATCH", &settle, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "invalid_state");

    let (status, _) = h.call("DELETE", &format!("/api/bets/{bet_id}"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Paid exactly once.
    assert_eq!(h.balance().await, 1080.0);
}

#[tokio::test]
async fn test_unknown_bet_is_404() {
    let h = harness(MockProvider::with_games(0)).await;

    let (status, err) = h
        .call("PATCH", "/api/bets/does-not-exist/settle?result=won", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["code"], "not_found");

    let (status, _) = h.call("DELETE", "/api/bets/does-not-exist", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_active_and_history_split() {
    let h = harness(MockProvider::with_games(0)).await;
    let (_, first) = h.place(10.0, 20.0).await;
    let (_, _second) = h.place(20.0, 40.0).await;
    let first_id = first["bet"]["id"].as_str().unwrap().to_string();
    h.call("PATCH", &format!("/api/bets/{first_id}/settle?result=lost"), None)
        .await;

    let (_, active) = h.call("GET", "/api/bets/active", None).await;
    assert_eq!(active["count"], 1);
    assert_eq!(active["bets"][0]["status"], "pending");

    let (_, history) = h.call("GET", "/api/bets/history", None).await;
    assert_eq!(history["count"], 1);
    assert_eq!(history["bets"][0]["id"], first_id.as_str());

    let (_, pending) = h.call("GET", "/api/bets?status=pending", None).await;
    assert_eq!(pending["count"], 1);
    let (_, all) = h.call("GET", "/api/bets", None).await;
    assert_eq!(all["count"], 2);
}

#[tokio::test]
async fn test_wallet_update_actions() {
    let h = harness(MockProvider::with_games(0)).await;

    let (status, resp) = h
        .call("POST", "/api/wallet/update", Some(json!({ "amount": 250.5, "action": "deposit" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["balance"].as_f64(), Some(1250.5));

    let (status, resp) = h
        .call("POST", "/api/wallet/update", Some(json!({ "amount": 50.5, "action": "withdraw" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["balance"].as_f64(), Some(1200.0));

    let (status, err) = h
        .call("POST", "/api/wallet/update", Some(json!({ "amount": 5000, "action": "withdraw" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "insufficient_funds");

    let (status, err) = h
        .call("POST", "/api/wallet/update", Some(json!({ "amount": 10, "action": "steal" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "invalid_action");

    assert_eq!(h.balance().await, 1200.0);
}

#[tokio::test]
async fn test_oversized_amounts_rejected() {
    let h = harness(MockProvider::with_games(0)).await;

    let (status, err) = h
        .call("POST", "/api/wallet/update", Some(json!({ "amount": 5e28, "action": "deposit" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "invalid_input");

    let (status, err) = h
        .call(
            "POST",
            "/api/wallet/update",
            Some(json!({ "amount": 92233720368547758u64, "action": "deposit" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "invalid_input");

    let (status, _) = h.place(10.0, 1e27).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The wallet still reads and moves normally.
    assert_eq!(h.balance().await, 1000.0);
    let (status, _) = h
        .call("POST", "/api/wallet/update", Some(json!({ "amount": 1, "action": "withdraw" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.balance().await, 999.0);
}

#[tokio::test]
async fn test_malformed_requests_use_error_body() {
    let h = harness(MockProvider::with_games(0)).await;
    let (_, placed) = h.place(10.0, 20.0).await;
    let bet_id = placed["bet"]["id"].as_str().unwrap().to_string();

    let (status, err) = h
        .call("PATCH", &format!("/api/bets/{bet_id}/settle?result=maybe"), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "invalid_input");
    assert!(err["detail"].as_str().unwrap().contains("maybe"));

    let (status, err) = h.call("GET", "/api/bets?status=void", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "invalid_input");

    let (status, err) = h
        .call("POST", "/api/wallet/update", Some(json!({ "amount": "abc", "action": "deposit" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "invalid_input");

    let (status, err) = h
        .call("POST", "/api/bets", Some(json!({ "amount": 10 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "invalid_input");

    // Nothing moved and the bet is still pending.
    assert_eq!(h.balance().await, 990.0);
    let (_, active) = h.call("GET", "/api/bets/active", None).await;
    assert_eq!(active["count"], 1);
}

// ---------------------------------------------------------------------------
// Odds and cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_odds_served_from_cache_on_second_request() {
    let h = harness(MockProvider::with_games(5)).await;

    let (status, first) = h.call("GET", "/api/odds/basketball_nba", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["cached"], false);
    assert_eq!(first["odds"].as_array().unwrap().len(), 5);

    let (_, second) = h.call("GET", "/api/odds/basketball_nba", None).await;
    assert_eq!(second["cached"], true);
    assert_eq!(second["odds"], first["odds"]);
    assert_eq!(h.provider.odds_calls(), 1);

    // A different market set is a different cache entry.
    let (_, h2h) = h.call("GET", "/api/odds/basketball_nba?markets=h2h", None).await;
    assert_eq!(h2h["cached"], false);
    assert_eq!(h.provider.odds_calls(), 2);
}

#[tokio::test]
async fn test_provider_failure_is_reported_not_cached() {
    let h = harness(MockProvider::failing(UpstreamError::RateLimited)).await;

    let (status, resp) = h.call("GET", "/api/odds/icehockey_nhl", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["odds"], json!([]));
    assert_eq!(resp["error"], "odds provider rate limit reached");

    h.provider.set_odds(FetchOutcome::Fetched(sample_games(2)));
    let (_, resp) = h.call("GET", "/api/odds/icehockey_nhl", None).await;
    assert_eq!(resp["cached"], false);
    assert_eq!(resp["odds"].as_array().unwrap().len(), 2);
    assert!(resp.get("error").is_none());
    assert_eq!(h.provider.odds_calls(), 2);
}

#[tokio::test]
async fn test_invalid_sport_key_rejected() {
    let h = harness(MockProvider::with_games(1)).await;
    let (status, err) = h.call("GET", "/api/odds/NBA%20games", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "invalid_input");
    assert_eq!(h.provider.odds_calls(), 0);
}

#[tokio::test]
async fn test_forced_refresh_requires_admin_token() {
    let h = harness(MockProvider::with_games(3)).await;
    h.call("GET", "/api/odds/basketball_nba", None).await;

    let (status, _) = h
        .call_with("POST", "/api/odds/refresh/basketball_nba", None, Some("wrong"))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = h.call("POST", "/api/odds/refresh/basketball_nba", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(h.provider.odds_calls(), 1);

    let (status, resp) = h
        .call_with("POST", "/api/odds/refresh/basketball_nba", None, Some(ADMIN_TOKEN))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["refreshed"], true);
    assert_eq!(resp["games_count"], 3);
    assert_eq!(h.provider.odds_calls(), 2);

    // The refreshed entry now serves plain reads.
    let (_, resp) = h.call("GET", "/api/odds/basketball_nba", None).await;
    assert_eq!(resp["cached"], true);
    assert_eq!(h.provider.odds_calls(), 2);
}

#[tokio::test]
async fn test_cache_status_lists_entries() {
    let h = harness(MockProvider::with_games(1)).await;
    h.call("GET", "/api/odds/basketball_nba", None).await;
    h.call("GET", "/api/odds/soccer_epl?markets=h2h", None).await;

    let (status, resp) = h.call("GET", "/api/cache/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["count"], 2);
    let entries = resp["cache_entries"].as_array().unwrap();
    assert!(entries.iter().all(|e| e["fresh"] == true));
    assert!(entries
        .iter()
        .any(|e| e["sport_key"] == "soccer_epl" && e["markets"] == "h2h"));
}

#[tokio::test]
async fn test_preview_truncates_games() {
    let h = harness(MockProvider::with_games(7)).await;
    let (status, resp) = h.call("GET", "/api/odds/all/preview", None).await;
    assert_eq!(status, StatusCode::OK);

    let preview = resp["preview"].as_object().unwrap();
    assert_eq!(preview.len(), 4);
    for sport in preview.values() {
        assert_eq!(sport["games"].as_array().unwrap().len(), 3);
    }
}

#[tokio::test]
async fn test_sports_catalogue_and_available() {
    let h = harness(MockProvider::with_games(0)).await;

    let (_, sports) = h.call("GET", "/api/sports", None).await;
    assert_eq!(sports["count"], 10);
    assert_eq!(sports["sports"][0]["key"], "americanfootball_nfl");

    let (status, available) = h.call("GET", "/api/sports/available", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(available["count"], 2);
}

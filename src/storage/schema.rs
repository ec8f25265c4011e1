//! Database schema creation.

use sqlx::SqlitePool;

/// Create all tables and indexes if they do not exist.
pub async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // One running balance per wallet; money columns are integer cents
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS wallets (
            id TEXT PRIMARY KEY,
            balance_cents INTEGER NOT NULL DEFAULT 0,
            total_wagered_cents INTEGER NOT NULL DEFAULT 0,
            total_won_cents INTEGER NOT NULL DEFAULT 0,
            total_lost_cents INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS bets (
            id TEXT PRIMARY KEY,
            wallet_id TEXT NOT NULL,
            event_id TEXT NOT NULL,
            sport_key TEXT NOT NULL,
            sport_title TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            selected_team TEXT NOT NULL,
            bet_type TEXT NOT NULL,
            odds TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            potential_payout_cents INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            commence_time TEXT,
            settled_at TEXT,
            FOREIGN KEY (wallet_id) REFERENCES wallets(id)
        )",
    )
    .execute(pool)
    .await?;

    // Odds payloads keyed by sport + markets
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS odds_cache (
            cache_key TEXT PRIMARY KEY,
            sport_key TEXT NOT NULL,
            markets TEXT NOT NULL,
            data TEXT NOT NULL,
            cached_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bets_wallet_time ON bets(wallet_id, created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_bets_status ON bets(status)")
        .execute(pool)
        .await?;

    Ok(())
}

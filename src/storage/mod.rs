//! Persistence layer.
//!
//! A SQLite pool (via `sqlx`) holding three tables: `wallets`, `bets` and
//! `odds_cache`. Money is stored as integer cents; rows are read into the
//! `*Row` records below and converted into domain types here, at the
//! storage boundary.

pub mod schema;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::config::StorageConfig;
use crate::types::{amount_to_cents, cents_to_decimal, Bet, BookError, Wallet};

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) the configured database and apply the schema.
pub async fn connect(cfg: &StorageConfig) -> Result<SqlitePool, BookError> {
    let options = SqliteConnectOptions::from_str(&cfg.database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect_with(options)
        .await?;

    schema::create_tables(&pool).await?;
    info!(url = %cfg.database_url, "Database initialised");
    Ok(pool)
}

/// Single-connection in-memory database with the schema applied.
///
/// The connection is never recycled, since dropping it discards the data.
pub async fn connect_in_memory() -> Result<SqlitePool, BookError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    schema::create_tables(&pool).await?;
    Ok(pool)
}

/// Create the wallet row with its opening balance unless it already exists.
pub async fn ensure_wallet(
    pool: &SqlitePool,
    wallet_id: &str,
    initial_balance: Decimal,
) -> Result<(), BookError> {
    let initial_cents = if initial_balance.is_zero() {
        0
    } else {
        amount_to_cents(initial_balance)?
    };

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO wallets
            (id, balance_cents, total_wagered_cents, total_won_cents, total_lost_cents, updated_at)
         VALUES (?1, ?2, 0, 0, 0, ?3)",
    )
    .bind(wallet_id)
    .bind(initial_cents)
    .bind(Utc::now())
    .execute(pool)
    .await?
    .rows_affected();

    if inserted > 0 {
        info!(wallet_id, balance = %initial_balance, "Wallet created");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow)]
pub struct WalletRow {
    pub id: String,
    pub balance_cents: i64,
    pub total_wagered_cents: i64,
    pub total_won_cents: i64,
    pub total_lost_cents: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Wallet {
            id: row.id,
            balance: cents_to_decimal(row.balance_cents),
            total_wagered: cents_to_decimal(row.total_wagered_cents),
            total_won: cents_to_decimal(row.total_won_cents),
            total_lost: cents_to_decimal(row.total_lost_cents),
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BetRow {
    pub id: String,
    pub wallet_id: String,
    pub event_id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub home_team: String,
    pub away_team: String,
    pub selected_team: String,
    pub bet_type: String,
    pub odds: String,
    pub amount_cents: i64,
    pub potential_payout_cents: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub commence_time: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl TryFrom<BetRow> for Bet {
    type Error = BookError;

    fn try_from(row: BetRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str| BookError::Corrupt(format!("bet {}: bad {field}", row.id));
        Ok(Bet {
            bet_type: row.bet_type.parse().map_err(|_| corrupt("bet_type"))?,
            status: row.status.parse().map_err(|_| corrupt("status"))?,
            odds: Decimal::from_str(&row.odds).map_err(|_| corrupt("odds"))?,
            amount: cents_to_decimal(row.amount_cents),
            potential_payout: cents_to_decimal(row.potential_payout_cents),
            id: row.id,
            wallet_id: row.wallet_id,
            event_id: row.event_id,
            sport_key: row.sport_key,
            sport_title: row.sport_title,
            home_team: row.home_team,
            away_team: row.away_team,
            selected_team: row.selected_team,
            created_at: row.created_at,
            commence_time: row.commence_time,
            settled_at: row.settled_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OddsCacheRow {
    pub cache_key: String,
    pub sport_key: String,
    pub markets: String,
    pub data: String,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

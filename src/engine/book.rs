//! Bet book: placement, settlement and cancellation of bets.
//!
//! Every transition touches the `bets` row and the wallet in one SQLite
//! transaction. The first statement of each transaction is a write, so the
//! transaction holds the write lock from the start and cannot deadlock on a
//! lock upgrade.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use super::ledger::WalletLedger;
use crate::storage::BetRow;
use crate::types::{
    amount_to_cents, cents_to_decimal, payout_to_cents, win_rate, Bet, BetStatus, BettingStats,
    BookError, NewBet, Outcome,
};

/// Listings return at most this many bets, newest first.
pub const LIST_LIMIT: i64 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct PlacedBet {
    pub bet: Bet,
    pub new_balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Settlement {
    pub bet_id: String,
    pub outcome: Outcome,
    /// Credited amount; zero for a loss.
    pub payout: Decimal,
    /// Stake counted as lost; zero for a win.
    pub lost_amount: Decimal,
    pub new_balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Cancellation {
    pub bet_id: String,
    pub refund: Decimal,
    pub new_balance: Decimal,
}

#[derive(Clone)]
pub struct BetBook {
    pool: SqlitePool,
    ledger: WalletLedger,
}

impl BetBook {
    pub fn new(pool: SqlitePool, ledger: WalletLedger) -> Self {
        Self { pool, ledger }
    }

    pub fn ledger(&self) -> &WalletLedger {
        &self.ledger
    }

    /// Debit the stake and record a pending bet, all or nothing.
    pub async fn place(&self, new: NewBet) -> Result<PlacedBet, BookError> {
        let amount_cents = amount_to_cents(new.amount)?;
        let payout_cents = payout_to_cents(new.potential_payout)?;
        if new.selected_team.trim().is_empty() {
            return Err(BookError::InvalidInput("selected_team must not be empty".into()));
        }

        let bet = Bet {
            id: Uuid::new_v4().to_string(),
            wallet_id: self.ledger.wallet_id().to_string(),
            event_id: new.event_id,
            sport_key: new.sport_key,
            sport_title: new.sport_title,
            home_team: new.home_team,
            away_team: new.away_team,
            selected_team: new.selected_team,
            bet_type: new.bet_type,
            odds: new.odds,
            amount: cents_to_decimal(amount_cents),
            potential_payout: cents_to_decimal(payout_cents),
            status: BetStatus::Pending,
            created_at: Utc::now(),
            commence_time: new.commence_time,
            settled_at: None,
        };

        let mut tx = self.pool.begin().await?;
        let new_balance = self.ledger.debit_for_bet(&mut tx, amount_cents).await?;
        sqlx::query(
            "INSERT INTO bets
                (id, wallet_id, event_id, sport_key, sport_title, home_team, away_team,
                 selected_team, bet_type, odds, amount_cents, potential_payout_cents,
                 status, created_at, commence_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )
        .bind(&bet.id)
        .bind(&bet.wallet_id)
        .bind(&bet.event_id)
        .bind(&bet.sport_key)
        .bind(&bet.sport_title)
        .bind(&bet.home_team)
        .bind(&bet.away_team)
        .bind(&bet.selected_team)
        .bind(bet.bet_type.as_str())
        .bind(bet.odds.to_string())
        .bind(amount_cents)
        .bind(payout_cents)
        .bind(bet.status.as_str())
        .bind(bet.created_at)
        .bind(&bet.commence_time)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(bet_id = %bet.id, bet = %bet, balance = new_balance, "Bet placed");
        Ok(PlacedBet { bet, new_balance: cents_to_decimal(new_balance) })
    }

    /// Settle a pending bet. Wins credit the stored payout; losses only
    /// count the stake as lost.
    pub async fn settle(&self, bet_id: &str, outcome: Outcome) -> Result<Settlement, BookError> {
        let status = BetStatus::from(outcome);
        let mut tx = self.pool.begin().await?;

        let settled: Option<(i64, i64)> = sqlx::query_as(
            "UPDATE bets SET status = ?1, settled_at = ?2
             WHERE id = ?3 AND wallet_id = ?4 AND status = 'pending'
             RETURNING amount_cents, potential_payout_cents",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(bet_id)
        .bind(self.ledger.wallet_id())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((amount_cents, payout_cents)) = settled else {
            return Err(self.not_pending(&mut tx, bet_id, "settled").await);
        };

        let settlement = match outcome {
            Outcome::Won => {
                let balance = self.ledger.credit_for_win(&mut tx, payout_cents).await?;
                Settlement {
                    bet_id: bet_id.to_string(),
                    outcome,
                    payout: cents_to_decimal(payout_cents),
                    lost_amount: Decimal::ZERO,
                    new_balance: cents_to_decimal(balance),
                }
            }
            Outcome::Lost => {
                let balance = self.ledger.record_loss(&mut tx, amount_cents).await?;
                Settlement {
                    bet_id: bet_id.to_string(),
                    outcome,
                    payout: Decimal::ZERO,
                    lost_amount: cents_to_decimal(amount_cents),
                    new_balance: cents_to_decimal(balance),
                }
            }
        };
        tx.commit().await?;

        info!(
            bet_id,
            outcome = ?outcome,
            payout = %settlement.payout,
            balance = %settlement.new_balance,
            "Bet settled"
        );
        Ok(settlement)
    }

    /// Remove a pending bet and refund its stake.
    pub async fn cancel(&self, bet_id: &str) -> Result<Cancellation, BookError> {
        let mut tx = self.pool.begin().await?;

        let removed: Option<i64> = sqlx::query_scalar(
            "DELETE FROM bets
             WHERE id = ?1 AND wallet_id = ?2 AND status = 'pending'
             RETURNING amount_cents",
        )
        .bind(bet_id)
        .bind(self.ledger.wallet_id())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(amount_cents) = removed else {
            return Err(self.not_pending(&mut tx, bet_id, "cancelled").await);
        };

        let balance = self.ledger.refund_for_cancellation(&mut tx, amount_cents).await?;
        tx.commit().await?;

        info!(bet_id, refund = amount_cents, balance, "Bet cancelled");
        Ok(Cancellation {
            bet_id: bet_id.to_string(),
            refund: cents_to_decimal(amount_cents),
            new_balance: cents_to_decimal(balance),
        })
    }

    /// Explain why a pending-only transition matched no row.
    async fn not_pending(&self, conn: &mut SqliteConnection, bet_id: &str, verb: &str) -> BookError {
        let status: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM bets WHERE id = ?1 AND wallet_id = ?2")
                .bind(bet_id)
                .bind(self.ledger.wallet_id())
                .fetch_optional(&mut *conn)
                .await;
        match status {
            Ok(None) => BookError::NotFound(format!("bet {bet_id}")),
            Ok(Some(status)) => {
                warn!(bet_id, status = %status, verb, "Rejected transition on settled bet");
                BookError::InvalidState(format!(
                    "bet {bet_id} is {status}; only pending bets can be {verb}"
                ))
            }
            Err(e) => e.into(),
        }
    }

    pub async fn get(&self, bet_id: &str) -> Result<Bet, BookError> {
        let row: Option<BetRow> =
            sqlx::query_as("SELECT * FROM bets WHERE id = ?1 AND wallet_id = ?2")
                .bind(bet_id)
                .bind(self.ledger.wallet_id())
                .fetch_optional(&self.pool)
                .await?;
        row.ok_or_else(|| BookError::NotFound(format!("bet {bet_id}")))?
            .try_into()
    }

    /// Newest bets first, optionally filtered by status.
    pub async fn list(&self, status: Option<BetStatus>) -> Result<Vec<Bet>, BookError> {
        let rows: Vec<BetRow> = match status {
            Some(status) => {
                sqlx::query_as(
                    "SELECT * FROM bets WHERE wallet_id = ?1 AND status = ?2
                     ORDER BY created_at DESC, rowid DESC LIMIT ?3",
                )
                .bind(self.ledger.wallet_id())
                .bind(status.as_str())
                .bind(LIST_LIMIT)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM bets WHERE wallet_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                )
                .bind(self.ledger.wallet_id())
                .bind(LIST_LIMIT)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(Bet::try_from).collect()
    }

    pub async fn active(&self) -> Result<Vec<Bet>, BookError> {
        self.list(Some(BetStatus::Pending)).await
    }

    /// Settled bets (won or lost), newest first.
    pub async fn history(&self) -> Result<Vec<Bet>, BookError> {
        let rows: Vec<BetRow> = sqlx::query_as(
            "SELECT * FROM bets WHERE wallet_id = ?1 AND status IN ('won', 'lost')
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )
        .bind(self.ledger.wallet_id())
        .bind(LIST_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Bet::try_from).collect()
    }

    pub async fn stats(&self) -> Result<BettingStats, BookError> {
        let wallet = self.ledger.wallet().await?;
        let (total_bets, pending_bets, won_bets, lost_bets): (i64, i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*),
                    COALESCE(SUM(status = 'pending'), 0),
                    COALESCE(SUM(status = 'won'), 0),
                    COALESCE(SUM(status = 'lost'), 0)
             FROM bets WHERE wallet_id = ?1",
        )
        .bind(self.ledger.wallet_id())
        .fetch_one(&self.pool)
        .await?;

        Ok(BettingStats {
            wallet,
            total_bets,
            pending_bets,
            won_bets,
            lost_bets,
            win_rate: win_rate(won_bets, lost_bets),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

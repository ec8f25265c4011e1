//! Wallet ledger: balance and aggregate counters for one wallet row.
//!
//! Each mutation is a single `UPDATE ... RETURNING` statement, so the
//! read-validate-write of a withdrawal or stake debit cannot interleave with
//! another writer. The bet-side mutations take a caller-provided connection
//! so the bet book can run them inside its own transaction.
//!
//! SQLite turns an overflowing integer sum into REAL, so every increment is
//! guarded with `column <= 9223372036854775807 - amount` (`i64::MAX`). A
//! guarded update that matches no row is rejected with `InvalidInput`.

use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use crate::storage::WalletRow;
use crate::types::{amount_to_cents, cents_to_decimal, BookError, Wallet, WalletAction};

#[derive(Clone)]
pub struct WalletLedger {
    pool: SqlitePool,
    wallet_id: String,
}

impl WalletLedger {
    pub fn new(pool: SqlitePool, wallet_id: impl Into<String>) -> Self {
        Self { pool, wallet_id: wallet_id.into() }
    }

    pub fn wallet_id(&self) -> &str {
        &self.wallet_id
    }

    /// Current wallet row.
    pub async fn wallet(&self) -> Result<Wallet, BookError> {
        let row: Option<WalletRow> = sqlx::query_as("SELECT * FROM wallets WHERE id = ?1")
            .bind(&self.wallet_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Wallet::from)
            .ok_or_else(|| BookError::NotFound(format!("wallet {}", self.wallet_id)))
    }

    /// Add funds. Returns the new balance.
    pub async fn deposit(&self, amount: Decimal) -> Result<Decimal, BookError> {
        let cents = amount_to_cents(amount)?;
        let mut conn = self.pool.acquire().await?;
        let balance = self
            .update_returning_balance(
                &mut conn,
                "UPDATE wallets
                 SET balance_cents = balance_cents + ?1, updated_at = ?2
                 WHERE id = ?3 AND balance_cents <= 9223372036854775807 - ?1
                 RETURNING balance_cents",
                cents,
            )
            .await?;

        info!(wallet_id = %self.wallet_id, amount = %amount, balance = balance, "Deposit");
        Ok(cents_to_decimal(balance))
    }

    /// Remove funds. Fails with `InsufficientFunds` when `amount > balance`.
    pub async fn withdraw(&self, amount: Decimal) -> Result<Decimal, BookError> {
        let cents = amount_to_cents(amount)?;
        let mut conn = self.pool.acquire().await?;
        let balance = self.debit(&mut conn, cents, false).await?;
        info!(wallet_id = %self.wallet_id, amount = %amount, balance = balance, "Withdrawal");
        Ok(cents_to_decimal(balance))
    }

    /// `POST /wallet/update` entry point.
    pub async fn apply(&self, action: &str, amount: Decimal) -> Result<Decimal, BookError> {
        match action.parse::<WalletAction>()? {
            WalletAction::Deposit => self.deposit(amount).await,
            WalletAction::Withdraw => self.withdraw(amount).await,
        }
    }

    // -----------------------------------------------------------------------
    // Bet-side mutations (amounts in cents, run on the caller's connection)
    // -----------------------------------------------------------------------

    /// Debit a stake and count it as wagered. Returns the new balance.
    pub async fn debit_for_bet(
        &self,
        conn: &mut SqliteConnection,
        amount_cents: i64,
    ) -> Result<i64, BookError> {
        self.debit(conn, amount_cents, true).await
    }

    /// Pay out a winning bet. Returns the new balance.
    pub async fn credit_for_win(
        &self,
        conn: &mut SqliteConnection,
        payout_cents: i64,
    ) -> Result<i64, BookError> {
        self.update_returning_balance(
            conn,
            "UPDATE wallets
             SET balance_cents = balance_cents + ?1,
                 total_won_cents = total_won_cents + ?1,
                 updated_at = ?2
             WHERE id = ?3
               AND balance_cents <= 9223372036854775807 - ?1
               AND total_won_cents <= 9223372036854775807 - ?1
             RETURNING balance_cents",
            payout_cents,
        )
        .await
    }

    /// Count a lost stake. The stake left the balance at placement, so only
    /// `total_lost` moves. Returns the (unchanged) balance.
    pub async fn record_loss(
        &self,
        conn: &mut SqliteConnection,
        amount_cents: i64,
    ) -> Result<i64, BookError> {
        self.update_returning_balance(
            conn,
            "UPDATE wallets
             SET total_lost_cents = total_lost_cents + ?1, updated_at = ?2
             WHERE id = ?3 AND total_lost_cents <= 9223372036854775807 - ?1
             RETURNING balance_cents",
            amount_cents,
        )
        .await
    }

    /// Return a cancelled stake. `total_wagered` is floored at zero.
    pub async fn refund_for_cancellation(
        &self,
        conn: &mut SqliteConnection,
        amount_cents: i64,
    ) -> Result<i64, BookError> {
        self.update_returning_balance(
            conn,
            "UPDATE wallets
             SET balance_cents = balance_cents + ?1,
                 total_wagered_cents = MAX(total_wagered_cents - ?1, 0),
                 updated_at = ?2
             WHERE id = ?3 AND balance_cents <= 9223372036854775807 - ?1
             RETURNING balance_cents",
            amount_cents,
        )
        .await
    }

    async fn debit(
        &self,
        conn: &mut SqliteConnection,
        amount_cents: i64,
        wager: bool,
    ) -> Result<i64, BookError> {
        if amount_cents <= 0 {
            return Err(BookError::InvalidInput(format!(
                "debit must be positive, got {amount_cents} cents"
            )));
        }
        let updated = sqlx::query_scalar::<_, i64>(
            "UPDATE wallets
             SET balance_cents = balance_cents - ?1,
                 total_wagered_cents = total_wagered_cents + ?2,
                 updated_at = ?3
             WHERE id = ?4
               AND balance_cents >= ?1
               AND total_wagered_cents <= 9223372036854775807 - ?2
             RETURNING balance_cents",
        )
        .bind(amount_cents)
        .bind(if wager { amount_cents } else { 0 })
        .bind(chrono::Utc::now())
        .bind(&self.wallet_id)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(balance) = updated {
            return Ok(balance);
        }

        let available = sqlx::query_scalar::<_, i64>("SELECT balance_cents FROM wallets WHERE id = ?1")
            .bind(&self.wallet_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| BookError::NotFound(format!("wallet {}", self.wallet_id)))?;

        if available >= amount_cents {
            return Err(self.overflow(amount_cents));
        }
        warn!(
            wallet_id = %self.wallet_id,
            needed = amount_cents,
            available,
            "Rejected debit: insufficient balance"
        );
        Err(BookError::InsufficientFunds {
            needed: cents_to_decimal(amount_cents),
            available: cents_to_decimal(available),
        })
    }

    async fn update_returning_balance(
        &self,
        conn: &mut SqliteConnection,
        sql: &'static str,
        amount_cents: i64,
    ) -> Result<i64, BookError> {
        if amount_cents < 0 {
            return Err(BookError::InvalidInput(format!(
                "ledger amount must not be negative, got {amount_cents} cents"
            )));
        }
        let updated = sqlx::query_scalar::<_, i64>(sql)
            .bind(amount_cents)
            .bind(chrono::Utc::now())
            .bind(&self.wallet_id)
            .fetch_optional(&mut *conn)
            .await?;
        if let Some(balance) = updated {
            return Ok(balance);
        }

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM wallets WHERE id = ?1")
            .bind(&self.wallet_id)
            .fetch_optional(&mut *conn)
            .await?;
        match exists {
            Some(_) => Err(self.overflow(amount_cents)),
            None => Err(BookError::NotFound(format!("wallet {}", self.wallet_id))),
        }
    }

    fn overflow(&self, amount_cents: i64) -> BookError {
        warn!(
            wallet_id = %self.wallet_id,
            amount = amount_cents,
            "Rejected ledger update: counter would overflow"
        );
        BookError::InvalidInput(format!(
            "amount {} would overflow wallet {}",
            cents_to_decimal(amount_cents),
            self.wallet_id
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

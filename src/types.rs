//! Shared types for the paper sportsbook.
//!
//! These types form the data model used across all modules: the wallet,
//! bets and their lifecycle enums, money conversion helpers, and the
//! domain error.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Largest single deposit, withdrawal, stake or payout, in cents ($10bn).
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000;

/// Convert a user-supplied money amount into integer cents.
///
/// The amount must be strictly positive, carry at most two decimal places
/// and not exceed [`MAX_AMOUNT_CENTS`].
pub fn amount_to_cents(amount: Decimal) -> Result<i64, BookError> {
    if amount <= Decimal::ZERO {
        return Err(BookError::InvalidInput(format!(
            "amount must be positive, got {amount}"
        )));
    }
    if amount.normalize().scale() > 2 {
        return Err(BookError::InvalidInput(format!(
            "amount {amount} has more than two decimal places"
        )));
    }
    to_bounded_cents(amount, "amount")
}

/// Convert a payout into cents, rounding to the nearest cent.
pub fn payout_to_cents(payout: Decimal) -> Result<i64, BookError> {
    if payout < Decimal::ZERO {
        return Err(BookError::InvalidInput(format!(
            "potential_payout must not be negative, got {payout}"
        )));
    }
    let rounded = payout.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    to_bounded_cents(rounded, "potential_payout")
}

fn to_bounded_cents(value: Decimal, field: &str) -> Result<i64, BookError> {
    value
        .checked_mul(dec!(100))
        .and_then(|cents| cents.to_i64())
        .filter(|cents| *cents <= MAX_AMOUNT_CENTS)
        .ok_or_else(|| {
            BookError::InvalidInput(format!(
                "{field} {value} exceeds the maximum of {}",
                cents_to_decimal(MAX_AMOUNT_CENTS)
            ))
        })
}

/// Integer cents back into a two-place decimal.
pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// Running balance and aggregate counters of one wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub id: String,
    pub balance: Decimal,
    pub total_wagered: Decimal,
    pub total_won: Decimal,
    pub total_lost: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Actions accepted by `POST /wallet/update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletAction {
    Deposit,
    Withdraw,
}

impl std::str::FromStr for WalletAction {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(WalletAction::Deposit),
            "withdraw" => Ok(WalletAction::Withdraw),
            other => Err(BookError::InvalidAction(other.to_string())),
        }
    }
}

impl fmt::Display for WalletAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletAction::Deposit => write!(f, "deposit"),
            WalletAction::Withdraw => write!(f, "withdraw"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

/// Market a bet was placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetType {
    H2h,
    Spreads,
    Totals,
}

impl BetType {
    pub const ALL: &'static [BetType] = &[BetType::H2h, BetType::Spreads, BetType::Totals];

    pub fn as_str(&self) -> &'static str {
        match self {
            BetType::H2h => "h2h",
            BetType::Spreads => "spreads",
            BetType::Totals => "totals",
        }
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BetType {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BetType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| BookError::InvalidInput(format!("unknown market: {s}")))
    }
}

/// Stored bet status. Cancellation deletes the row instead of using a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Pending => "pending",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
        }
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BetStatus {
    type Err = BookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BetStatus::Pending),
            "won" => Ok(BetStatus::Won),
            "lost" => Ok(BetStatus::Lost),
            other => Err(BookError::InvalidInput(format!("unknown bet status: {other}"))),
        }
    }
}

/// Settlement result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Won,
    Lost,
}

impl From<Outcome> for BetStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Won => BetStatus::Won,
            Outcome::Lost => BetStatus::Lost,
        }
    }
}

/// A bet as requested by the client. `potential_payout` is computed by the
/// caller and trusted as-is at settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBet {
    pub event_id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub home_team: String,
    pub away_team: String,
    pub selected_team: String,
    pub bet_type: BetType,
    /// American odds, e.g. `-110` or `+150`.
    pub odds: Decimal,
    pub amount: Decimal,
    pub potential_payout: Decimal,
    #[serde(default)]
    pub commence_time: Option<String>,
}

/// A stored bet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bet {
    pub id: String,
    pub wallet_id: String,
    pub event_id: String,
    pub sport_key: String,
    pub sport_title: String,
    pub home_team: String,
    pub away_team: String,
    pub selected_team: String,
    pub bet_type: BetType,
    pub odds: Decimal,
    pub amount: Decimal,
    pub potential_payout: Decimal,
    pub status: BetStatus,
    pub created_at: DateTime<Utc>,
    pub commence_time: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} @ {} ({} {} vs {}) stake ${:.2} -> ${:.2} [{}]",
            self.sport_key,
            self.selected_team,
            self.odds,
            self.bet_type,
            self.home_team,
            self.away_team,
            self.amount,
            self.potential_payout,
            self.status,
        )
    }
}

/// Aggregate view served by `GET /stats`.
#[derive(Debug, Clone, Serialize)]
pub struct BettingStats {
    pub wallet: Wallet,
    pub total_bets: i64,
    pub pending_bets: i64,
    pub won_bets: i64,
    pub lost_bets: i64,
    /// Percentage of settled bets that won, rounded to one decimal place.
    pub win_rate: Decimal,
}

/// Win rate in percent, one decimal place. Zero when nothing is settled.
pub fn win_rate(won: i64, lost: i64) -> Decimal {
    let settled = won + lost;
    if settled <= 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(won) * dec!(100) / Decimal::from(settled))
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain errors surfaced to API callers.
#[derive(Debug, thiserror::Error)]
pub enum BookError {
    #[error("Insufficient balance: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl BookError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            BookError::InsufficientFunds { .. } => "insufficient_funds",
            BookError::NotFound(_) => "not_found",
            BookError::InvalidState(_) => "invalid_state",
            BookError::InvalidAction(_) => "invalid_action",
            BookError::InvalidInput(_) => "invalid_input",
            BookError::Forbidden => "forbidden",
            BookError::Storage(_) | BookError::Corrupt(_) => "internal",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Core bookkeeping: the wallet ledger and the bet book built on top of it.

pub mod book;
pub mod ledger;

pub use book::{BetBook, Cancellation, PlacedBet, Settlement};
pub use ledger::WalletLedger;

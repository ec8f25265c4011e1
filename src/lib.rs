//! PAPERBOOK: paper-trading sportsbook backend.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.
//!
//! ```text
//! HTTP (axum) → BetBook → WalletLedger ─┐
//!             → OddsCache → OddsProvider ├→ SQLite (sqlx)
//! ```

pub mod config;
pub mod types;
pub mod odds;
pub mod engine;
pub mod storage;
pub mod server;

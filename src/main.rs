//! PAPERBOOK: paper-trading sportsbook backend.
//!
//! Entry point. Loads configuration, initialises structured logging, opens
//! the database (creating the wallet on first run) and serves the HTTP API
//! until Ctrl+C.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use paperbook::config::AppConfig;
use paperbook::engine::{BetBook, WalletLedger};
use paperbook::odds::cache::OddsCache;
use paperbook::odds::the_odds_api::TheOddsApiClient;
use paperbook::odds::OddsProvider;
use paperbook::server::{self, ServiceState};
use paperbook::storage;

const BANNER: &str = r#"
 ___  _   ___ ___ ___ ___  ___   ___  _  __
| _ \/_\ | _ \ __| _ \ _ )/ _ \ / _ \| |/ /
|  _/ _ \|  _/ _||   / _ \ (_) | (_) | ' <
|_|/_/ \_\_| |___|_|_\___/\___/ \___/|_|\_\

  Paper-trading sportsbook, play money only
"#;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "paperbook=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load_default()?;
    init_logging();

    println!("{BANNER}");
    info!(
        wallet_id = %cfg.wallet.id,
        initial_balance = %cfg.wallet.initial_balance,
        database = %cfg.storage.database_url,
        cache_ttl_hours = cfg.odds.cache_ttl_hours,
        "PAPERBOOK starting up"
    );

    let secrets = cfg.resolve_secrets();
    if secrets.admin_token.is_none() {
        warn!("No admin token configured; forced odds refresh is disabled");
    }

    // -- Storage -----------------------------------------------------------

    let pool = storage::connect(&cfg.storage).await?;
    storage::ensure_wallet(&pool, &cfg.wallet.id, cfg.wallet.initial_balance).await?;

    // -- Components --------------------------------------------------------

    let provider: Arc<dyn OddsProvider> =
        Arc::new(TheOddsApiClient::new(&cfg.odds, secrets.odds_api_key.clone())?);
    let ledger = WalletLedger::new(pool.clone(), cfg.wallet.id.clone());
    let book = BetBook::new(pool.clone(), ledger);
    let odds = OddsCache::new(
        pool,
        provider.clone(),
        cfg.odds.cache_ttl(),
        cfg.odds.cache_failures,
    );

    let state = Arc::new(ServiceState {
        book,
        odds,
        provider,
        default_markets: cfg.odds.default_markets.clone(),
        admin_token: secrets.admin_token,
    });

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cfg.server.host, cfg.server.port))?;

    let router = server::build_router(state, &cfg.server.cors_origins);
    server::serve(router, addr).await?;

    info!("PAPERBOOK shut down cleanly.");
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json_logging = std::env::var("PAPERBOOK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

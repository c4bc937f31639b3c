//! SENTINEL: funding-gated strike engine
//!
//! Entry point. Loads `.env` and `config.toml`, initialises structured
//! logging, refuses to start on fatal configuration errors, then wires the
//! trust ledger, network pool, signal producers and liveness server
//! together and runs the orchestration loop until Ctrl-C.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use sentinel::config::{AppConfig, RuntimeConfig};
use sentinel::engine::{FundingGate, NetworkPool, Orchestrator, StrikeDispatcher};
use sentinel::health::{self, EngineInfo, HealthState};
use sentinel::ingest::{self, EventRouter, ReqwestFetcher, TelegramFeed, WebPoller};
use sentinel::trust::{JsonFileStore, TrustLedger};
use sentinel::types::format_ether;

const BANNER: &str = r#"
 ____  _____ _   _ _____ ___ _   _ _____ _
/ ___|| ____| \ | |_   _|_ _| \ | | ____| |
\___ \|  _| |  \| | | |  | ||  \| |  _| | |
 ___) | |___| |\  | | |  | || |\  | |___| |___
|____/|_____|_| \_| |_| |___|_| \_|_____|_____|

  Funding-gated strike engine
  v0.1.0 | mode: capital exhaustion
"#;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();
    println!("{BANNER}");

    let cfg = load_config()?;
    let rt = match cfg.resolve() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Fatal configuration error, refusing to start");
            std::process::exit(1);
        }
    };

    info!(
        name = %rt.name,
        executor = %rt.executor,
        networks = rt.networks.len(),
        safety_reserve = %format_ether(rt.safety_reserve),
        loop_interval_secs = rt.loop_interval.as_secs(),
        trust_policy = ?rt.trust_policy,
        "SENTINEL starting up"
    );

    // -- Core components -------------------------------------------------

    let trust = Arc::new(TrustLedger::open(
        Box::new(JsonFileStore::new(&rt.trust_path)),
        &rt.trust_seeds,
    ));
    let pool = Arc::new(NetworkPool::connect(&rt).context("No usable network")?);
    let dispatcher = Arc::new(StrikeDispatcher::new(
        FundingGate::new(rt.safety_reserve),
        trust.clone(),
        rt.trust_policy,
        rt.confirmations,
    ));

    // -- Producers -------------------------------------------------------

    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let (signal_tx, signal_rx) = ingest::channel(cfg.ingestion.channel_capacity);

    let telegram_active = spawn_event_feed(&cfg, &rt, &signal_tx, &shutdown_tx)?;

    if cfg.ingestion.endpoints.is_empty() {
        warn!("No web endpoints configured, poller disabled");
    } else {
        let poller = WebPoller::new(Arc::new(ReqwestFetcher::new()?), &cfg.ingestion);
        tokio::spawn(poller.run(signal_tx.clone(), shutdown_tx.subscribe()));
    }
    drop(signal_tx);

    // -- Liveness --------------------------------------------------------

    let health_state = Arc::new(
        HealthState::new(EngineInfo {
            engine: rt.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: "CAPITAL_EXHAUSTION".to_string(),
            keys_detected: true,
            telegram_active,
            networks: pool.names(),
        })
        .with_trust(trust.clone()),
    );
    if cfg.health.enabled {
        health::spawn_health_server(health_state.clone(), rt.health_port).await?;
    }

    // -- Main loop -------------------------------------------------------

    let orchestrator = Orchestrator::new(pool, dispatcher, signal_rx, rt.loop_interval)
        .with_health(health_state);
    let loop_handle = tokio::spawn(orchestrator.run(shutdown_tx.subscribe()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Ctrl-C received, finishing current iteration");
    let _ = shutdown_tx.send(());

    if let Err(e) = loop_handle.await {
        error!(error = %e, "Orchestrator task ended abnormally");
    }

    let scores = trust.snapshot().await;
    info!(sources = scores.len(), "SENTINEL stopped");
    Ok(())
}

/// Read `SENTINEL_CONFIG` (or `config.toml`); a missing file means defaults.
fn load_config() -> Result<AppConfig> {
    let path = std::env::var("SENTINEL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    if Path::new(&path).exists() {
        let cfg = AppConfig::load(&path)?;
        info!(path = %path, "Configuration loaded");
        Ok(cfg)
    } else {
        warn!(path = %path, "Config file not found, using built-in defaults");
        Ok(AppConfig::default())
    }
}

/// Start the messaging producer if a bot token is present. Returns whether it runs.
fn spawn_event_feed(
    cfg: &AppConfig,
    rt: &RuntimeConfig,
    signal_tx: &ingest::SignalSender,
    shutdown_tx: &broadcast::Sender<()>,
) -> Result<bool> {
    let Some(token) = rt.bot_token.clone() else {
        warn!(
            env = %cfg.messaging.bot_token_env,
            "Messaging token not set, event feed disabled"
        );
        return Ok(false);
    };
    if cfg.messaging.sources.is_empty() {
        warn!("No messaging sources allow-listed, event feed disabled");
        return Ok(false);
    }

    let feed = TelegramFeed::new(token, Duration::from_secs(cfg.messaging.long_poll_secs))?;
    let router = EventRouter::from_config(&cfg.messaging);
    tokio::spawn(router.run(Box::new(feed), signal_tx.clone(), shutdown_tx.subscribe()));
    info!(sources = cfg.messaging.sources.len(), "Event feed online");
    Ok(true)
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sentinel=info"));

    let json_logging = std::env::var("SENTINEL_LOG_JSON").is_ok();

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

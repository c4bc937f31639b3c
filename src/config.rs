//! Configuration loading from TOML with environment variable resolution.
//!
//! `config.toml` carries everything that is not secret. The signing key,
//! executor address, RPC overrides and messaging token are referenced by
//! env-var name and resolved once at startup into a [`RuntimeConfig`].
//! Every section has serde defaults, so an empty file yields the stock
//! four-network deployment.

use alloy::primitives::Address;
use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;
use thiserror::Error;

use crate::chain::rpc::parse_signer;
use crate::engine::gate::{NetworkParams, DEFAULT_OVERHEAD_GAS_UNITS};
use crate::trust::{TrustPolicy, DEFAULT_GATE_THRESHOLD};
use crate::types::{parse_ether, parse_gwei, Wei};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Configuration problems that must stop the process before any network I/O.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required secret {0} is not set")]
    MissingSecret(String),

    #[error("{field} is not a valid address: {value}")]
    InvalidAddress { field: String, value: String },

    #[error("{field} is not a valid amount: {value}")]
    InvalidAmount { field: String, value: String },

    #[error("{0}")]
    Invalid(String),

    #[error("no networks configured")]
    NoNetworks,
}

// ---------------------------------------------------------------------------
// File layout
// ---------------------------------------------------------------------------

/// Top-level application configuration, as read from TOML.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub gate: GateConfig,
    pub trust: TrustConfig,
    pub ingestion: IngestionConfig,
    pub messaging: MessagingConfig,
    pub health: HealthConfig,
    pub networks: Vec<NetworkConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            gate: GateConfig::default(),
            trust: TrustConfig::default(),
            ingestion: IngestionConfig::default(),
            messaging: MessagingConfig::default(),
            health: HealthConfig::default(),
            networks: default_networks(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    /// Delay between orchestration iterations.
    pub loop_interval_secs: u64,
    /// Blocks required on top of a strike before it counts as confirmed.
    pub confirmations: u64,
    pub confirmation_timeout_secs: u64,
    pub private_key_env: String,
    pub executor_address_env: String,
    /// Token used when a signal carries no resolvable token.
    pub discovery_token: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "SENTINEL-001".to_string(),
            loop_interval_secs: 2,
            confirmations: 1,
            confirmation_timeout_secs: 180,
            private_key_env: "PRIVATE_KEY".to_string(),
            executor_address_env: "EXECUTOR_ADDRESS".to_string(),
            discovery_token: "0x25d887Ce7a35172C62FeBFD67a1856F20FaEbb00".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum balance kept after overhead, in ether.
    pub safety_reserve_eth: String,
    pub overhead_gas_units: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            safety_reserve_eth: "0.005".to_string(),
            overhead_gas_units: DEFAULT_OVERHEAD_GAS_UNITS as u64,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrustConfig {
    pub path: String,
    pub gate: TrustGateConfig,
    /// Starting scores for sources absent from the trust file.
    pub seeds: HashMap<String, f64>,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            path: crate::trust::store::DEFAULT_TRUST_FILE.to_string(),
            gate: TrustGateConfig::default(),
            seeds: HashMap::from([
                ("WEB_AI".to_string(), 0.85),
                ("DISCOVERY".to_string(), 0.70),
            ]),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrustGateConfig {
    pub enabled: bool,
    pub min_score: f64,
}

impl Default for TrustGateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_score: DEFAULT_GATE_THRESHOLD,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestionConfig {
    pub endpoints: Vec<String>,
    pub poll_interval_secs: u64,
    pub timeout_ms: u64,
    /// Source id attached to web-polled signals.
    pub web_source_id: String,
    pub min_sentiment: Option<f64>,
    /// Capacity of the candidate signal channel.
    pub channel_capacity: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "https://api.crypto-ai-signals.com/v1/latest".to_string(),
                "https://top-trading-ai-blog.com/alerts".to_string(),
            ],
            poll_interval_secs: 2,
            timeout_ms: 5000,
            web_source_id: "WEB_AI".to_string(),
            min_sentiment: None,
            channel_capacity: 256,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MessagingConfig {
    pub bot_token_env: String,
    pub long_poll_secs: u64,
    pub min_sentiment: Option<f64>,
    pub sources: Vec<MessageSourceConfig>,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            bot_token_env: "TG_BOT_TOKEN".to_string(),
            long_poll_secs: 30,
            min_sentiment: None,
            sources: vec![
                MessageSourceConfig {
                    name: "FAT_PIG".to_string(),
                    chat_id: "10012345678".to_string(),
                    trust: Some(0.95),
                },
                MessageSourceConfig {
                    name: "BINANCE_KILLERS".to_string(),
                    chat_id: "10087654321".to_string(),
                    trust: Some(0.90),
                },
            ],
        }
    }
}

/// One allow-listed messaging origin.
#[derive(Debug, Deserialize, Clone)]
pub struct MessageSourceConfig {
    pub name: String,
    pub chat_id: String,
    /// Seed score for this source.
    #[serde(default)]
    pub trust: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HealthConfig {
    pub enabled: bool,
    pub port: u16,
    /// Overrides `port` when set.
    pub port_env: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
            port_env: "PORT".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    /// Env var that overrides `rpc_url`.
    #[serde(default)]
    pub rpc_env: Option<String>,
    /// Fixed per-network margin, in ether.
    pub moat_eth: String,
    /// Floor on the priority fee, in gwei.
    pub priority_fee_gwei: String,
    pub router: String,
    #[serde(default = "default_quote_token")]
    pub quote_token: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Ticker to token address, for signals that name a ticker.
    #[serde(default)]
    pub tokens: HashMap<String, String>,
}

fn default_quote_token() -> String {
    "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string()
}

fn default_gas_limit() -> u64 {
    600_000
}

fn network(
    name: &str,
    chain_id: u64,
    rpc_url: &str,
    rpc_env: &str,
    moat: &str,
    priority: &str,
    router: &str,
) -> NetworkConfig {
    NetworkConfig {
        name: name.to_string(),
        chain_id,
        rpc_url: rpc_url.to_string(),
        rpc_env: Some(rpc_env.to_string()),
        moat_eth: moat.to_string(),
        priority_fee_gwei: priority.to_string(),
        router: router.to_string(),
        quote_token: default_quote_token(),
        gas_limit: default_gas_limit(),
        tokens: HashMap::new(),
    }
}

fn default_networks() -> Vec<NetworkConfig> {
    vec![
        network(
            "ETHEREUM",
            1,
            "https://eth.llamarpc.com",
            "ETH_RPC",
            "0.01",
            "500.0",
            "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D",
        ),
        network(
            "BASE",
            8453,
            "https://mainnet.base.org",
            "BASE_RPC",
            "0.005",
            "1.6",
            "0x4752ba5DBc23f44D87826276BF6Fd6b1C372aD24",
        ),
        network(
            "ARBITRUM",
            42161,
            "https://arb1.arbitrum.io/rpc",
            "ARB_RPC",
            "0.003",
            "1.0",
            "0x1b02dA8Cb0d097eB8D57A175b88c7D8b47997506",
        ),
        network(
            "POLYGON",
            137,
            "https://polygon-rpc.com",
            "POLY_RPC",
            "0.002",
            "200.0",
            "0xa5E0829CaCEd8fFDD4De3c43696c57F7D7A678ff",
        ),
    ]
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> Result<RuntimeConfig, ConfigError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve secrets and amounts into the immutable runtime view.
    ///
    /// `lookup` maps an env-var name to its value; empty values count as unset.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<RuntimeConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let private_key = get(&self.engine.private_key_env)
            .map(SecretString::new)
            .ok_or_else(|| ConfigError::MissingSecret(self.engine.private_key_env.clone()))?;
        parse_signer(&private_key)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", self.engine.private_key_env)))?;
        let executor_raw = get(&self.engine.executor_address_env)
            .ok_or_else(|| ConfigError::MissingSecret(self.engine.executor_address_env.clone()))?;
        let executor = parse_address(&self.engine.executor_address_env, &executor_raw)?;
        let discovery_token = parse_address("engine.discovery_token", &self.engine.discovery_token)?;

        let safety_reserve = parse_ether(&self.gate.safety_reserve_eth).map_err(|_| {
            ConfigError::InvalidAmount {
                field: "gate.safety_reserve_eth".to_string(),
                value: self.gate.safety_reserve_eth.clone(),
            }
        })?;

        if self.networks.is_empty() {
            return Err(ConfigError::NoNetworks);
        }
        if self.engine.confirmations == 0 {
            return Err(ConfigError::Invalid(
                "engine.confirmations must be at least 1".to_string(),
            ));
        }
        let networks = self
            .networks
            .iter()
            .map(|n| self.resolve_network(n, &get))
            .collect::<Result<Vec<_>, _>>()?;

        let trust_policy = if self.trust.gate.enabled {
            TrustPolicy::MinScore(self.trust.gate.min_score)
        } else {
            TrustPolicy::Disabled
        };

        let mut trust_seeds = self.trust.seeds.clone();
        for source in &self.messaging.sources {
            if let Some(score) = source.trust {
                trust_seeds.entry(source.name.clone()).or_insert(score);
            }
        }

        let health_port = get(&self.health.port_env)
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(self.health.port);

        Ok(RuntimeConfig {
            name: self.engine.name.clone(),
            private_key,
            executor,
            discovery_token,
            safety_reserve,
            loop_interval: Duration::from_secs(self.engine.loop_interval_secs),
            confirmations: self.engine.confirmations,
            confirmation_timeout: Duration::from_secs(self.engine.confirmation_timeout_secs),
            networks,
            trust_path: self.trust.path.clone(),
            trust_policy,
            trust_seeds,
            bot_token: get(&self.messaging.bot_token_env).map(SecretString::new),
            health_port,
        })
    }

    fn resolve_network<F>(&self, n: &NetworkConfig, get: &F) -> Result<NetworkSettings, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let field = |f: &str| format!("networks.{}.{f}", n.name);
        let amount = |f: &str, raw: &str, parse: fn(&str) -> Result<Wei>| {
            parse(raw).map_err(|_| ConfigError::InvalidAmount {
                field: field(f),
                value: raw.to_string(),
            })
        };

        let rpc_url = n
            .rpc_env
            .as_deref()
            .and_then(get)
            .unwrap_or_else(|| n.rpc_url.clone());

        let tokens = n
            .tokens
            .iter()
            .map(|(ticker, addr)| {
                parse_address(&field(&format!("tokens.{ticker}")), addr)
                    .map(|a| (ticker.to_uppercase(), a))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(NetworkSettings {
            name: n.name.clone(),
            chain_id: n.chain_id,
            rpc_url,
            params: NetworkParams {
                moat: amount("moat_eth", &n.moat_eth, parse_ether)?,
                priority_fee_floor: amount("priority_fee_gwei", &n.priority_fee_gwei, parse_gwei)?,
                overhead_gas_units: self.gate.overhead_gas_units as Wei,
            },
            router: parse_address(&field("router"), &n.router)?,
            quote_token: parse_address(&field("quote_token"), &n.quote_token)?,
            gas_limit: n.gas_limit,
            tokens,
        })
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address, ConfigError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|_| ConfigError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Resolved view
// ---------------------------------------------------------------------------

/// Immutable configuration after secret and amount resolution.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub name: String,
    pub private_key: SecretString,
    pub executor: Address,
    pub discovery_token: Address,
    pub safety_reserve: Wei,
    pub loop_interval: Duration,
    pub confirmations: u64,
    pub confirmation_timeout: Duration,
    pub networks: Vec<NetworkSettings>,
    pub trust_path: String,
    pub trust_policy: TrustPolicy,
    pub trust_seeds: HashMap<String, f64>,
    /// Messaging is disabled when absent.
    pub bot_token: Option<SecretString>,
    pub health_port: u16,
}

/// Per-network settings with amounts already in wei.
#[derive(Debug, Clone)]
pub struct NetworkSettings {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub params: NetworkParams,
    pub router: Address,
    pub quote_token: Address,
    pub gas_limit: u64,
    pub tokens: HashMap<String, Address>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

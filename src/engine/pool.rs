//! Network contexts: one RPC connection and signing account per network.
//!
//! Built once at startup and shared read-only by every dispatch. The only
//! mutable piece is the per-network sequence lock, which serializes
//! nonce acquisition and broadcast so concurrent strikes on the same
//! account never reuse a sequence number.

use alloy::primitives::Address;
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::chain::rpc::RpcChainClient;
use crate::chain::{ChainClient, ChainError, StrikeCall, TxHandle};
use crate::config::{NetworkSettings, RuntimeConfig};
use crate::engine::gate::NetworkParams;
use crate::types::SizedAction;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

pub struct NetworkContext {
    pub name: String,
    pub chain_id: u64,
    pub params: NetworkParams,
    pub executor: Address,
    pub router: Address,
    pub quote_token: Address,
    pub discovery_token: Address,
    pub gas_limit: u64,
    /// Upper-cased ticker to token address.
    pub tokens: HashMap<String, Address>,
    client: Arc<dyn ChainClient>,
    sequence_lock: Mutex<()>,
}

impl NetworkContext {
    pub fn new(
        settings: &NetworkSettings,
        executor: Address,
        discovery_token: Address,
        client: Arc<dyn ChainClient>,
    ) -> Self {
        Self {
            name: settings.name.clone(),
            chain_id: settings.chain_id,
            params: settings.params,
            executor,
            router: settings.router,
            quote_token: settings.quote_token,
            discovery_token,
            gas_limit: settings.gas_limit,
            tokens: settings
                .tokens
                .iter()
                .map(|(k, v)| (k.to_uppercase(), *v))
                .collect(),
            client,
            sequence_lock: Mutex::new(()),
        }
    }

    pub fn client(&self) -> &dyn ChainClient {
        self.client.as_ref()
    }

    /// Map a signal's token to the address fed in as `tokenA`.
    ///
    /// An address is used as-is, a known ticker maps through the network's
    /// table, and anything else (including discovery) falls back to the
    /// discovery token.
    pub fn resolve_token(&self, token: Option<&str>) -> Address {
        let Some(raw) = token.map(str::trim) else {
            return self.discovery_token;
        };
        if let Ok(addr) = raw.parse::<Address>() {
            return addr;
        }
        let ticker = raw.trim_start_matches('$').to_uppercase();
        match self.tokens.get(&ticker) {
            Some(addr) => *addr,
            None => {
                debug!(network = %self.name, ticker = %ticker, "Unknown ticker, using discovery token");
                self.discovery_token
            }
        }
    }

    /// Build the strike call for a sized action.
    pub fn strike_call(&self, token_in: Address, action: &SizedAction) -> StrikeCall {
        StrikeCall {
            executor: self.executor,
            router: self.router,
            token_in,
            token_out: self.quote_token,
            amount: action.trade_amount,
            gas_limit: self.gas_limit,
            max_fee_per_gas: action.fee_per_unit,
            max_priority_fee_per_gas: action.priority_fee_per_unit,
        }
    }

    /// Fetch a fresh pending nonce and broadcast, holding the network's
    /// sequence lock across both steps.
    pub async fn broadcast(&self, call: &StrikeCall) -> Result<TxHandle, ChainError> {
        let _guard = self.sequence_lock.lock().await;
        let nonce = self.client.next_sequence_number().await?;
        debug!(network = %self.name, nonce, "Sequence number acquired");
        self.client.broadcast(call, nonce).await
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// All live network contexts.
pub struct NetworkPool {
    contexts: Vec<Arc<NetworkContext>>,
}

impl NetworkPool {
    /// Connect every configured network. A network whose client cannot be
    /// built is logged and left out; an empty pool is an error.
    pub fn connect(cfg: &RuntimeConfig) -> Result<Self> {
        let mut contexts = Vec::new();
        for settings in &cfg.networks {
            match RpcChainClient::new(
                &settings.rpc_url,
                settings.chain_id,
                &cfg.private_key,
                cfg.confirmation_timeout,
            ) {
                Ok(client) => {
                    info!(
                        network = %settings.name,
                        chain_id = settings.chain_id,
                        account = %client.address(),
                        rpc = %settings.rpc_url,
                        "Network connected"
                    );
                    contexts.push(Arc::new(NetworkContext::new(
                        settings,
                        cfg.executor,
                        cfg.discovery_token,
                        Arc::new(client),
                    )));
                }
                Err(e) => {
                    error!(network = %settings.name, error = %e, "Network init failed, skipping");
                }
            }
        }
        Self::from_contexts(contexts)
    }

    pub fn from_contexts(contexts: Vec<Arc<NetworkContext>>) -> Result<Self> {
        if contexts.is_empty() {
            bail!("No network could be initialised");
        }
        Ok(Self { contexts })
    }

    pub fn contexts(&self) -> &[Arc<NetworkContext>] {
        &self.contexts
    }

    pub fn names(&self) -> Vec<String> {
        self.contexts.iter().map(|c| c.name.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

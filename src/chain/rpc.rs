//! EVM adapter on an `alloy` provider.
//!
//! One `RootProvider` per network over HTTP, with transactions signed
//! locally by an `EthereumWallet`. Node error payloads are classified
//! here into `ChainError` so nothing upstream parses text.

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{Ethereum, EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::eth::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::{reqwest, Http};
use alloy::transports::{RpcError, TransportError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::{ChainClient, ChainError, ConfirmationStatus, StrikeCall, TxHandle};
use crate::types::{FeeSnapshot, Wei};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Gas price assumed when a node reports zero (0.01 gwei).
const FALLBACK_GAS_PRICE: Wei = 10_000_000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Geth/erigon style "have X want Y" suffix on insufficient-funds errors.
static HAVE_WANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"have (\d+) want (\d+)").expect("static regex"));

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Map a JSON-RPC error payload onto the engine's error taxonomy.
/// `data` is the raw JSON of the payload's `data` member.
fn classify_rpc_error(code: i64, message: &str, data: Option<&str>) -> ChainError {
    let lower = message.to_lowercase();

    if lower.contains("insufficient funds") {
        return ChainError::InsufficientFunds {
            deficit: parse_deficit(&lower),
        };
    }

    if code == 3 || lower.contains("revert") {
        let detail = match data {
            Some(d) => format!("{message} ({})", d.trim_matches('"')),
            None => message.to_string(),
        };
        return ChainError::Reverted(detail);
    }

    // Parse errors, invalid request, unknown method, internal error, rate limits.
    let transport_class = matches!(code, -32700 | -32603..=-32600 | -32005);
    if transport_class || lower.contains("rate limit") || lower.contains("too many requests") {
        return ChainError::Unavailable(format!("rpc error {code}: {message}"));
    }

    // Anything else is the node refusing the transaction on its merits
    // (nonce too low, underpriced replacement, ...).
    ChainError::Reverted(format!("rpc error {code}: {message}"))
}

fn parse_deficit(message: &str) -> Option<Wei> {
    let caps = HAVE_WANT.captures(message)?;
    let have: Wei = caps.get(1)?.as_str().parse().ok()?;
    let want: Wei = caps.get(2)?.as_str().parse().ok()?;
    want.checked_sub(have)
}

/// Classify a provider error. Only node error responses carry meaning;
/// everything else is the transport failing.
fn classify(method: &str, err: TransportError) -> ChainError {
    match err {
        RpcError::ErrorResp(payload) => classify_rpc_error(
            payload.code,
            &payload.message,
            payload.data.as_deref().map(|raw| raw.get()),
        ),
        other => ChainError::Unavailable(format!("{method}: {other}")),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Provider bound to one network and one signing account.
pub struct RpcChainClient {
    provider: RootProvider<Ethereum>,
    wallet: EthereumWallet,
    address: Address,
    chain_id: u64,
    confirmation_timeout: Duration,
}

impl RpcChainClient {
    pub fn new(
        url: &str,
        chain_id: u64,
        private_key: &SecretString,
        confirmation_timeout: Duration,
    ) -> Result<Self> {
        let url: reqwest::Url = url
            .parse()
            .with_context(|| format!("Invalid RPC URL: {url}"))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("SENTINEL/0.1.0")
            .build()
            .context("Failed to build RPC HTTP client")?;
        let provider = RootProvider::new(RpcClient::new(Http::with_client(http, url), false));

        let signer = parse_signer(private_key)?;
        let address = signer.address();
        Ok(Self {
            provider,
            wallet: EthereumWallet::from(signer),
            address,
            chain_id,
            confirmation_timeout,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Call fields shared by simulation and the signed transaction.
    fn request(&self, call: &StrikeCall) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.address)
            .with_to(call.executor)
            .with_input(call.calldata())
            .with_value(call.value())
            .with_gas_limit(call.gas_limit)
    }

    /// Sign the strike as an EIP-1559 transaction. Returns raw bytes and hash.
    async fn sign(&self, call: &StrikeCall, nonce: u64) -> Result<(Vec<u8>, B256), ChainError> {
        let tx = self
            .request(call)
            .with_nonce(nonce)
            .with_chain_id(self.chain_id)
            .with_max_fee_per_gas(call.max_fee_per_gas)
            .with_max_priority_fee_per_gas(call.max_priority_fee_per_gas);

        let envelope = <TransactionRequest as TransactionBuilder<Ethereum>>::build(tx, &self.wallet)
            .await
            .map_err(|e| ChainError::Reverted(format!("signing failed: {e}")))?;
        Ok((envelope.encoded_2718(), *envelope.tx_hash()))
    }

    /// Whether a receipt mined in `block` has the required depth. A failed
    /// head lookup counts as "not yet" so the caller keeps polling.
    async fn settled(&self, block: u64, confirmations: u64) -> bool {
        if confirmations <= 1 {
            return true;
        }
        match self.provider.get_block_number().await {
            Ok(head) => head.saturating_sub(block) + 1 >= confirmations,
            Err(e) => {
                debug!(error = %classify("eth_blockNumber", e), "Head poll failed");
                false
            }
        }
    }
}

/// Parse a hex private key (with or without 0x) into a signer.
pub fn parse_signer(private_key: &SecretString) -> Result<PrivateKeySigner> {
    let raw = private_key.expose_secret().trim();
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    raw.parse::<PrivateKeySigner>()
        .map_err(|_| anyhow::anyhow!("Private key is not a valid secp256k1 hex key"))
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn balance(&self) -> Result<Wei, ChainError> {
        let balance = self
            .provider
            .get_balance(self.address)
            .await
            .map_err(|e| classify("eth_getBalance", e))?;
        Ok(balance.saturating_to::<u128>())
    }

    async fn fee_snapshot(&self) -> Result<FeeSnapshot, ChainError> {
        let (gas_price, tip) = tokio::join!(
            self.provider.get_gas_price(),
            self.provider.get_max_priority_fee_per_gas(),
        );
        let gas_price = match gas_price.map_err(|e| classify("eth_gasPrice", e))? {
            0 => FALLBACK_GAS_PRICE,
            p => p,
        };
        // Not every chain implements the tip oracle; the per-network floor covers it.
        let priority_fee = tip.unwrap_or_else(|e| {
            debug!(error = %e, "No priority fee suggestion");
            0
        });
        Ok(FeeSnapshot {
            gas_price,
            priority_fee,
        })
    }

    async fn simulate(&self, call: &StrikeCall) -> Result<(), ChainError> {
        self.provider
            .call(self.request(call))
            .await
            .map_err(|e| classify("eth_call", e))?;
        Ok(())
    }

    async fn next_sequence_number(&self) -> Result<u64, ChainError> {
        self.provider
            .get_transaction_count(self.address)
            .pending()
            .await
            .map_err(|e| classify("eth_getTransactionCount", e))
    }

    async fn broadcast(&self, call: &StrikeCall, nonce: u64) -> Result<TxHandle, ChainError> {
        let (raw, local_hash) = self.sign(call, nonce).await?;
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| classify("eth_sendRawTransaction", e))?;
        let hash = *pending.tx_hash();
        if hash != local_hash {
            debug!(node = %hash, local = %local_hash, "Node returned a different tx hash");
        }
        Ok(TxHandle {
            hash: hash.to_string(),
            nonce,
        })
    }

    async fn await_confirmation(
        &self,
        tx: &TxHandle,
        confirmations: u64,
    ) -> Result<ConfirmationStatus, ChainError> {
        let hash: B256 = tx
            .hash
            .parse()
            .map_err(|e| ChainError::Unavailable(format!("malformed tx hash {}: {e}", tx.hash)))?;
        let deadline = Instant::now() + self.confirmation_timeout;

        loop {
            match self.provider.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    if let Some(block) = ReceiptResponse::block_number(&receipt) {
                        if self.settled(block, confirmations).await {
                            return Ok(if ReceiptResponse::status(&receipt) {
                                ConfirmationStatus::Success { block }
                            } else {
                                ConfirmationStatus::Reverted { block }
                            });
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(tx = %tx.hash, error = %classify("eth_getTransactionReceipt", e), "Receipt poll failed")
                }
            }

            if Instant::now() + RECEIPT_POLL_INTERVAL > deadline {
                return Err(ChainError::Unavailable(format!(
                    "no confirmation for {} within {}s",
                    tx.hash,
                    self.confirmation_timeout.as_secs()
                )));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

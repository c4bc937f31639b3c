//! Blockchain collaborator.
//!
//! Defines the `ChainClient` trait the engine talks to, the structured
//! `ChainError` every adapter must produce, and the strike call payload.
//! The engine never inspects error text: adapters classify node responses
//! into `InsufficientFunds`, `Reverted` or `Unavailable` at this boundary.

pub mod call;
pub mod rpc;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use crate::types::{FeeSnapshot, Wei};

pub use call::StrikeCall;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by a chain adapter, already classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The node refused because the account cannot cover gas plus value.
    #[error("insufficient funds (deficit: {deficit:?} wei)")]
    InsufficientFunds { deficit: Option<Wei> },

    /// State or logic rejection: the call would revert, or the node refused the tx.
    #[error("rejected: {0}")]
    Reverted(String),

    /// Transport failure, timeout, rate limiting or malformed response.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Handle to a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHandle {
    /// 0x-prefixed transaction hash.
    pub hash: String,
    pub nonce: u64,
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (nonce {})", self.hash, self.nonce)
    }
}

/// Final status of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Success { block: u64 },
    Reverted { block: u64 },
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// One authenticated connection bound to one signing account.
///
/// Every call may suspend and may fail; no retry happens at this layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Native balance of the bound account.
    async fn balance(&self) -> Result<Wei, ChainError>;

    /// Fresh fee-market reading.
    async fn fee_snapshot(&self) -> Result<FeeSnapshot, ChainError>;

    /// Dry-run the call against current state without committing.
    async fn simulate(&self, call: &StrikeCall) -> Result<(), ChainError>;

    /// Pending transaction count for the bound account.
    async fn next_sequence_number(&self) -> Result<u64, ChainError>;

    /// Sign and submit the call with the given sequence number.
    async fn broadcast(&self, call: &StrikeCall, nonce: u64) -> Result<TxHandle, ChainError>;

    /// Wait until the transaction has `confirmations` blocks on top of it.
    async fn await_confirmation(
        &self,
        tx: &TxHandle,
        confirmations: u64,
    ) -> Result<ConfirmationStatus, ChainError>;
}

//! Scripted chain for integration testing.
//!
//! Deterministic `ChainClient` whose balance, fees and per-stage results
//! are set from test code. It keeps a pending-nonce counter like a real
//! node and records every broadcast so tests can assert on them.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use sentinel::chain::{ChainClient, ChainError, ConfirmationStatus, StrikeCall, TxHandle};
use sentinel::types::{FeeSnapshot, Wei};

pub struct StubChain {
    pub balance: Mutex<Result<Wei, ChainError>>,
    pub fees: FeeSnapshot,
    pub simulate_result: Mutex<Result<(), ChainError>>,
    pub confirmation: Mutex<Result<ConfirmationStatus, ChainError>>,
    /// Delay inside `broadcast`, to widen race windows.
    pub broadcast_delay: Duration,
    pending_nonce: AtomicU64,
    pub simulations: AtomicUsize,
    pub broadcasts: Mutex<Vec<(u64, Wei)>>,
}

impl StubChain {
    pub fn new(balance: Wei, fees: FeeSnapshot) -> Self {
        Self {
            balance: Mutex::new(Ok(balance)),
            fees,
            simulate_result: Mutex::new(Ok(())),
            confirmation: Mutex::new(Ok(ConfirmationStatus::Success { block: 1 })),
            broadcast_delay: Duration::ZERO,
            pending_nonce: AtomicU64::new(0),
            simulations: AtomicUsize::new(0),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        let stub = Self::new(0, FeeSnapshot { gas_price: 0, priority_fee: 0 });
        *stub.balance.lock().unwrap() = Err(ChainError::Unavailable("connection refused".into()));
        stub
    }

    pub fn simulate_with(self, result: Result<(), ChainError>) -> Self {
        *self.simulate_result.lock().unwrap() = result;
        self
    }

    pub fn confirm_with(self, result: Result<ConfirmationStatus, ChainError>) -> Self {
        *self.confirmation.lock().unwrap() = result;
        self
    }

    pub fn with_broadcast_delay(mut self, delay: Duration) -> Self {
        self.broadcast_delay = delay;
        self
    }

    pub fn broadcast_nonces(&self) -> Vec<u64> {
        self.broadcasts.lock().unwrap().iter().map(|(n, _)| *n).collect()
    }

    pub fn broadcast_amounts(&self) -> Vec<Wei> {
        self.broadcasts.lock().unwrap().iter().map(|(_, a)| *a).collect()
    }
}

#[async_trait]
impl ChainClient for StubChain {
    async fn balance(&self) -> Result<Wei, ChainError> {
        self.balance.lock().unwrap().clone()
    }

    async fn fee_snapshot(&self) -> Result<FeeSnapshot, ChainError> {
        Ok(self.fees)
    }

    async fn simulate(&self, _call: &StrikeCall) -> Result<(), ChainError> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        self.simulate_result.lock().unwrap().clone()
    }

    async fn next_sequence_number(&self) -> Result<u64, ChainError> {
        Ok(self.pending_nonce.load(Ordering::SeqCst))
    }

    async fn broadcast(&self, call: &StrikeCall, nonce: u64) -> Result<TxHandle, ChainError> {
        if !self.broadcast_delay.is_zero() {
            tokio::time::sleep(self.broadcast_delay).await;
        }
        let expected = self.pending_nonce.load(Ordering::SeqCst);
        if nonce != expected {
            return Err(ChainError::Reverted(format!(
                "nonce too low: next nonce {expected}, tx nonce {nonce}"
            )));
        }
        self.pending_nonce.fetch_add(1, Ordering::SeqCst);
        self.broadcasts.lock().unwrap().push((nonce, call.amount));
        Ok(TxHandle {
            hash: format!("0x{nonce:064x}"),
            nonce,
        })
    }

    async fn await_confirmation(
        &self,
        _tx: &TxHandle,
        _confirmations: u64,
    ) -> Result<ConfirmationStatus, ChainError> {
        self.confirmation.lock().unwrap().clone()
    }
}

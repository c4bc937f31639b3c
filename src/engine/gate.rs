//! Deterministic funding gate.
//!
//! Decides whether a network account can afford a strike and sizes it as
//! "everything left after overhead". The core (`evaluate`) is a pure
//! function of its three inputs; `FundingGate::check` is the thin async
//! wrapper that reads the balance and fee snapshot it needs.
//!
//! Overhead model:
//!
//! ```text
//! fee_per_unit   = gas_price * 120 / 100 + max(tip, priority_fee_floor)
//! overhead       = overhead_gas_units * fee_per_unit + moat
//! required_floor = overhead + safety_reserve
//! trade_amount   = balance - overhead          (when balance >= required_floor)
//! ```

use tracing::debug;

use crate::chain::{ChainClient, ChainError};
use crate::types::{format_ether, FeeSnapshot, SizedAction, Wei, WEI_PER_ETHER};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Buffer applied over the observed gas price, in percent.
pub const GAS_PRICE_BUFFER_PCT: Wei = 120;

/// Gas units reserved for a three-hop direct strike when a network sets no override.
pub const DEFAULT_OVERHEAD_GAS_UNITS: Wei = 1_000_000;

/// Global minimum reserve kept on top of overhead: 0.005 native units.
pub const DEFAULT_SAFETY_RESERVE: Wei = WEI_PER_ETHER / 200;

/// Per-network economic parameters. Immutable after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    /// Fixed reserve held back from trading, independent of fees.
    pub moat: Wei,
    /// Lowest priority fee this network will bid (wei per gas).
    pub priority_fee_floor: Wei,
    /// Gas units budgeted per strike when computing overhead.
    pub overhead_gas_units: Wei,
}

impl NetworkParams {
    /// Fee per gas unit for a given snapshot: 20% over gas price plus tip.
    pub fn execution_fee_per_unit(&self, fees: &FeeSnapshot) -> Wei {
        let tip = self.priority_fee(fees);
        (fees.gas_price.saturating_mul(GAS_PRICE_BUFFER_PCT) / 100).saturating_add(tip)
    }

    /// Priority fee actually bid: the node's `eth_maxPriorityFeePerGas`
    /// suggestion, never below the configured floor. With a quiet or
    /// tip-oracle-less node this is exactly the floor; a busy node raises it.
    pub fn priority_fee(&self, fees: &FeeSnapshot) -> Wei {
        fees.priority_fee.max(self.priority_fee_floor)
    }

    /// Gas budget plus moat.
    pub fn overhead(&self, fees: &FeeSnapshot) -> Wei {
        self.overhead_gas_units
            .saturating_mul(self.execution_fee_per_unit(fees))
            .saturating_add(self.moat)
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Approved(SizedAction),
    /// Balance is below `required_floor` by exactly `deficit`.
    Rejected { deficit: Wei, required_floor: Wei },
}

/// Evaluate affordability and size the strike.
///
/// Pure and idempotent: identical inputs always give identical output.
/// Arithmetic saturates, so an absurd fee market rejects instead of wrapping.
pub fn evaluate(
    params: &NetworkParams,
    safety_reserve: Wei,
    balance: Wei,
    fees: &FeeSnapshot,
) -> GateDecision {
    let fee_per_unit = params.execution_fee_per_unit(fees);
    let overhead = params.overhead(fees);
    let required_floor = overhead.saturating_add(safety_reserve);

    if balance < required_floor {
        return GateDecision::Rejected {
            deficit: required_floor - balance,
            required_floor,
        };
    }

    GateDecision::Approved(SizedAction {
        trade_amount: balance - overhead,
        fee_per_unit,
        priority_fee_per_unit: params.priority_fee(fees),
        overhead,
    })
}

// ---------------------------------------------------------------------------
// Gate (I/O wrapper)
// ---------------------------------------------------------------------------

/// Binds the pure gate to a network's read-only queries.
#[derive(Debug, Clone, Copy)]
pub struct FundingGate {
    safety_reserve: Wei,
}

impl Default for FundingGate {
    fn default() -> Self {
        Self::new(DEFAULT_SAFETY_RESERVE)
    }
}

impl FundingGate {
    pub fn new(safety_reserve: Wei) -> Self {
        Self { safety_reserve }
    }

    /// Read balance and fees concurrently, then evaluate.
    /// Issues only read queries; never mutates anything.
    pub async fn check(
        &self,
        params: &NetworkParams,
        client: &dyn ChainClient,
    ) -> Result<GateDecision, ChainError> {
        let (balance, fees) = tokio::try_join!(client.balance(), client.fee_snapshot())?;
        let decision = evaluate(params, self.safety_reserve, balance, &fees);
        debug!(
            balance = %format_ether(balance),
            fees = %fees,
            overhead = %format_ether(params.overhead(&fees)),
            reserve = %format_ether(self.safety_reserve),
            approved = matches!(decision, GateDecision::Approved(_)),
            "Gate evaluated"
        );
        Ok(decision)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

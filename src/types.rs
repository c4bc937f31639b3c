//! Shared types for the SENTINEL engine.
//!
//! These types form the data model used across all modules: integer wei
//! amounts, fee snapshots, sized actions, candidate signals and strike
//! outcomes. Monetary values never pass through floating point; the
//! human-facing ether/gwei strings from config are converted exactly via
//! `rust_decimal`.

use anyhow::{anyhow, Context, Result};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Native-asset amounts
// ---------------------------------------------------------------------------

/// Amount of the native asset in its smallest unit.
pub type Wei = u128;

pub const WEI_PER_GWEI: Wei = 1_000_000_000;
pub const WEI_PER_ETHER: Wei = 1_000_000_000_000_000_000;

/// Parse a decimal ether string ("0.005") into wei. Sub-wei digits are truncated.
pub fn parse_ether(s: &str) -> Result<Wei> {
    scale_decimal(s, dec!(1000000000000000000))
        .with_context(|| format!("Invalid ether amount: {s}"))
}

/// Parse a decimal gwei string ("1.6") into wei.
pub fn parse_gwei(s: &str) -> Result<Wei> {
    scale_decimal(s, dec!(1000000000)).with_context(|| format!("Invalid gwei amount: {s}"))
}

fn scale_decimal(s: &str, factor: Decimal) -> Result<Wei> {
    let value = Decimal::from_str(s.trim())?;
    if value.is_sign_negative() {
        return Err(anyhow!("amount must not be negative"));
    }
    let scaled = value
        .checked_mul(factor)
        .ok_or_else(|| anyhow!("amount out of range"))?;
    scaled
        .trunc()
        .to_u128()
        .ok_or_else(|| anyhow!("amount out of range"))
}

/// Render wei as ether, e.g. `1500000000000000000` → `"1.5"`.
pub fn format_ether(wei: Wei) -> String {
    format_scaled(wei, 18)
}

/// Render wei as gwei.
pub fn format_gwei(wei: Wei) -> String {
    format_scaled(wei, 9)
}

fn format_scaled(wei: Wei, scale: u32) -> String {
    i128::try_from(wei)
        .ok()
        .and_then(|v| Decimal::try_from_i128_with_scale(v, scale).ok())
        .map(|d| d.normalize().to_string())
        .unwrap_or_else(|| format!("{wei} wei"))
}

// ---------------------------------------------------------------------------
// Fee market
// ---------------------------------------------------------------------------

/// Fee-market reading taken immediately before a gate evaluation.
/// Never cached: a stale snapshot would misprice the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSnapshot {
    /// Current gas price (wei per gas unit).
    pub gas_price: Wei,
    /// Suggested priority fee (wei per gas unit). Zero when the node has no opinion.
    pub priority_fee: Wei,
}

impl fmt::Display for FeeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gas={} gwei tip={} gwei",
            format_gwei(self.gas_price),
            format_gwei(self.priority_fee)
        )
    }
}

/// Result of a successful gate evaluation. Consumed by the dispatch that
/// produced it; never shared between strikes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizedAction {
    /// Amount committed to the strike: balance minus overhead.
    pub trade_amount: Wei,
    /// `maxFeePerGas` for the broadcast.
    pub fee_per_unit: Wei,
    /// `maxPriorityFeePerGas` for the broadcast.
    pub priority_fee_per_unit: Wei,
    /// Reserved gas budget plus moat.
    pub overhead: Wei,
}

impl fmt::Display for SizedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size={} ETH overhead={} ETH fee={} gwei tip={} gwei",
            format_ether(self.trade_amount),
            format_ether(self.overhead),
            format_gwei(self.fee_per_unit),
            format_gwei(self.priority_fee_per_unit),
        )
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Source id used for the synthesized opportunistic signal.
pub const DISCOVERY_SOURCE: &str = "DISCOVERY";

/// A (source, token) pair proposed for execution, not yet funding-checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateSignal {
    pub source_id: String,
    /// Ticker (e.g. "PEPE") or token address. `None` for discovery signals.
    pub token: Option<String>,
}

impl CandidateSignal {
    pub fn new(source_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            token: Some(token.into()),
        }
    }

    /// The signal synthesized when a loop iteration has nothing to act on.
    pub fn discovery() -> Self {
        Self {
            source_id: DISCOVERY_SOURCE.to_string(),
            token: None,
        }
    }
}

impl fmt::Display for CandidateSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.token {
            Some(token) => write!(f, "{}:{}", self.source_id, token),
            None => write!(f, "{}:<discovery>", self.source_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Strike lifecycle
// ---------------------------------------------------------------------------

/// Non-terminal states of a strike, in the order they are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrikeStage {
    Gating,
    Simulating,
    Broadcasting,
    Confirming,
}

impl fmt::Display for StrikeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrikeStage::Gating => write!(f, "GATING"),
            StrikeStage::Simulating => write!(f, "SIMULATING"),
            StrikeStage::Broadcasting => write!(f, "BROADCASTING"),
            StrikeStage::Confirming => write!(f, "CONFIRMING"),
        }
    }
}

/// Terminal state of one strike.
#[derive(Debug, Clone, PartialEq)]
pub enum StrikeOutcome {
    /// Confirmed on-chain with a success status.
    Succeeded { tx_hash: String },
    /// Simulation or submission rejected for non-funding reasons. No funds left the account.
    Reverted { stage: StrikeStage, reason: String },
    /// Balance below the required floor. `deficit` is exact when the gate
    /// caught it, and best-effort when the node reported it.
    Underfunded {
        stage: StrikeStage,
        deficit: Option<Wei>,
    },
    /// Collaborator fault before broadcast, or a failed confirmation.
    Failed { stage: StrikeStage, reason: String },
    /// Excluded by the trust policy before any network I/O.
    Distrusted { score: f64 },
}

impl StrikeOutcome {
    /// Short label for counters and logs.
    pub fn label(&self) -> &'static str {
        match self {
            StrikeOutcome::Succeeded { .. } => "SUCCEEDED",
            StrikeOutcome::Reverted { .. } => "REVERTED",
            StrikeOutcome::Underfunded { .. } => "UNDERFUNDED",
            StrikeOutcome::Failed { .. } => "FAILED",
            StrikeOutcome::Distrusted { .. } => "DISTRUSTED",
        }
    }

    /// Whether the strike got as far as waiting on a confirmation.
    /// Only these outcomes adjust a source's trust score.
    pub fn reached_confirmation(&self) -> bool {
        matches!(
            self,
            StrikeOutcome::Succeeded { .. }
                | StrikeOutcome::Failed {
                    stage: StrikeStage::Confirming,
                    ..
                }
        )
    }
}

impl fmt::Display for StrikeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrikeOutcome::Succeeded { tx_hash } => write!(f, "SUCCEEDED {tx_hash}"),
            StrikeOutcome::Reverted { stage, reason } => {
                write!(f, "REVERTED at {stage}: {reason}")
            }
            StrikeOutcome::Underfunded {
                stage,
                deficit: Some(d),
            } => write!(f, "UNDERFUNDED at {stage}: need +{} ETH", format_ether(*d)),
            StrikeOutcome::Underfunded {
                stage,
                deficit: None,
            } => write!(f, "UNDERFUNDED at {stage}"),
            StrikeOutcome::Failed { stage, reason } => write!(f, "FAILED at {stage}: {reason}"),
            StrikeOutcome::Distrusted { score } => write!(f, "DISTRUSTED (score {score:.3})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ether() {
        assert_eq!(parse_ether("0.005").unwrap(), 5_000_000_000_000_000);
        assert_eq!(parse_ether("1").unwrap(), WEI_PER_ETHER);
        assert_eq!(parse_ether(" 0.01 ").unwrap(), 10_000_000_000_000_000);
    }

    #[test]
    fn test_parse_gwei() {
        assert_eq!(parse_gwei("1.6").unwrap(), 1_600_000_000);
        assert_eq!(parse_gwei("500.0").unwrap(), 500 * WEI_PER_GWEI);
    }

    #[test]
    fn test_parse_rejects_garbage_and_negatives() {
        assert!(parse_ether("abc").is_err());
        assert!(parse_ether("-1").is_err());
        assert!(parse_gwei("").is_err());
    }

    #[test]
    fn test_format_ether() {
        assert_eq!(format_ether(WEI_PER_ETHER * 3 / 2), "1.5");
        assert_eq!(format_ether(0), "0");
        assert_eq!(format_ether(1), "0.000000000000000001");
        assert_eq!(format_gwei(1_600_000_000), "1.6");
    }

    #[test]
    fn test_discovery_signal() {
        let s = CandidateSignal::discovery();
        assert!(s.token.is_none());
        assert_eq!(s.source_id, DISCOVERY_SOURCE);
        assert_eq!(s.to_string(), "DISCOVERY:<discovery>");
        assert_eq!(CandidateSignal::new("WEB_AI", "PEPE").to_string(), "WEB_AI:PEPE");
    }

    #[test]
    fn test_reached_confirmation() {
        assert!(StrikeOutcome::Succeeded { tx_hash: "0x1".into() }.reached_confirmation());
        assert!(StrikeOutcome::Failed {
            stage: StrikeStage::Confirming,
            reason: "status 0".into()
        }
        .reached_confirmation());
        assert!(!StrikeOutcome::Failed {
            stage: StrikeStage::Simulating,
            reason: "rpc down".into()
        }
        .reached_confirmation());
        assert!(!StrikeOutcome::Underfunded {
            stage: StrikeStage::Gating,
            deficit: Some(1)
        }
        .reached_confirmation());
    }

    #[test]
    fn test_outcome_display_includes_deficit() {
        let o = StrikeOutcome::Underfunded {
            stage: StrikeStage::Gating,
            deficit: Some(WEI_PER_ETHER / 100),
        };
        assert_eq!(o.to_string(), "UNDERFUNDED at GATING: need +0.01 ETH");
        assert_eq!(o.label(), "UNDERFUNDED");
    }
}

//! Strike dispatcher: per-(network, signal) state machine.
//!
//! ```text
//! [trust policy] -> GATING -> SIMULATING -> BROADCASTING -> CONFIRMING
//!                      |           |              |              |
//!                 UNDERFUNDED  REVERTED /     REVERTED /    SUCCEEDED /
//!                 / FAILED     UNDERFUNDED /  UNDERFUNDED /  FAILED
//!                              FAILED         FAILED
//! ```
//!
//! Only dispatches that reach CONFIRMING touch the trust ledger, exactly
//! once each. Nothing leaves the account before a simulation passes.

use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::chain::{ChainError, ConfirmationStatus};
use crate::engine::gate::{FundingGate, GateDecision};
use crate::engine::pool::NetworkContext;
use crate::trust::{TrustLedger, TrustPolicy};
use crate::types::{format_ether, CandidateSignal, StrikeOutcome, StrikeStage};

pub struct StrikeDispatcher {
    gate: FundingGate,
    trust: Arc<TrustLedger>,
    policy: TrustPolicy,
    confirmations: u64,
}

impl StrikeDispatcher {
    pub fn new(
        gate: FundingGate,
        trust: Arc<TrustLedger>,
        policy: TrustPolicy,
        confirmations: u64,
    ) -> Self {
        Self {
            gate,
            trust,
            policy,
            confirmations: confirmations.max(1),
        }
    }

    pub fn trust(&self) -> &Arc<TrustLedger> {
        &self.trust
    }

    /// Run one strike to a terminal outcome. Never panics on collaborator
    /// failure; every failure becomes an outcome.
    pub async fn dispatch(&self, ctx: &NetworkContext, signal: &CandidateSignal) -> StrikeOutcome {
        let span = info_span!(
            "strike",
            id = %Uuid::new_v4(),
            network = %ctx.name,
            chain_id = ctx.chain_id,
            signal = %signal,
        );
        async {
            let outcome = self.execute(ctx, signal).await;
            log_outcome(&outcome);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, ctx: &NetworkContext, signal: &CandidateSignal) -> StrikeOutcome {
        if self.policy != TrustPolicy::Disabled {
            let score = self.trust.get(&signal.source_id).await;
            if self.policy.rejects(score) {
                return StrikeOutcome::Distrusted { score };
            }
        }

        // GATING
        let action = match self.gate.check(&ctx.params, ctx.client()).await {
            Ok(GateDecision::Approved(action)) => action,
            Ok(GateDecision::Rejected { deficit, .. }) => {
                return StrikeOutcome::Underfunded {
                    stage: StrikeStage::Gating,
                    deficit: Some(deficit),
                }
            }
            Err(e) => {
                return StrikeOutcome::Failed {
                    stage: StrikeStage::Gating,
                    reason: e.to_string(),
                }
            }
        };

        let token_in = ctx.resolve_token(signal.token.as_deref());
        let call = ctx.strike_call(token_in, &action);
        info!(call = %call, sizing = %action, "Striking");

        // SIMULATING
        if let Err(e) = ctx.client().simulate(&call).await {
            return classify(StrikeStage::Simulating, e);
        }

        // BROADCASTING
        let tx = match ctx.broadcast(&call).await {
            Ok(tx) => tx,
            Err(e) => return classify(StrikeStage::Broadcasting, e),
        };
        info!(tx = %tx, "Broadcast accepted, awaiting confirmation");

        // CONFIRMING
        let outcome = match ctx.client().await_confirmation(&tx, self.confirmations).await {
            Ok(ConfirmationStatus::Success { block }) => {
                info!(block, "Confirmed");
                StrikeOutcome::Succeeded { tx_hash: tx.hash }
            }
            Ok(ConfirmationStatus::Reverted { block }) => StrikeOutcome::Failed {
                stage: StrikeStage::Confirming,
                reason: format!("reverted on-chain in block {block}"),
            },
            Err(e) => StrikeOutcome::Failed {
                stage: StrikeStage::Confirming,
                reason: e.to_string(),
            },
        };

        self.learn(&signal.source_id, &outcome).await;
        outcome
    }

    async fn learn(&self, source_id: &str, outcome: &StrikeOutcome) {
        if !outcome.reached_confirmation() {
            return;
        }
        let success = matches!(outcome, StrikeOutcome::Succeeded { .. });
        if let Err(e) = self.trust.update(source_id, success).await {
            error!(source = source_id, error = %e, "Trust update not persisted");
        }
    }
}

/// Map a classified chain error at a pre-confirmation stage to an outcome.
pub fn classify(stage: StrikeStage, err: ChainError) -> StrikeOutcome {
    match err {
        ChainError::InsufficientFunds { deficit } => StrikeOutcome::Underfunded { stage, deficit },
        ChainError::Reverted(reason) => StrikeOutcome::Reverted { stage, reason },
        ChainError::Unavailable(reason) => StrikeOutcome::Failed { stage, reason },
    }
}

fn log_outcome(outcome: &StrikeOutcome) {
    match outcome {
        StrikeOutcome::Succeeded { tx_hash } => {
            info!(outcome = outcome.label(), tx = %tx_hash, "Strike succeeded");
        }
        StrikeOutcome::Underfunded {
            stage,
            deficit: Some(deficit),
        } => {
            warn!(
                outcome = outcome.label(),
                stage = %stage,
                deficit = %format_ether(*deficit),
                "Insufficient funds, strike halted. Need +{} ETH",
                format_ether(*deficit)
            );
        }
        StrikeOutcome::Underfunded { stage, deficit: None } => {
            warn!(outcome = outcome.label(), stage = %stage, "Node reported insufficient funds for gas/value");
        }
        StrikeOutcome::Reverted { stage, reason } => {
            info!(outcome = outcome.label(), stage = %stage, reason = %reason, "Revert detected, capital protected");
        }
        StrikeOutcome::Failed { stage, reason } => {
            warn!(outcome = outcome.label(), stage = %stage, reason = %reason, "Strike failed");
        }
        StrikeOutcome::Distrusted { score } => {
            info!(outcome = outcome.label(), score, "Source below trust threshold, skipped");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

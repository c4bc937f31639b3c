//! End-to-end strike scenarios against a scripted chain.

mod stub_chain;

use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sentinel::chain::{ChainClient, ChainError, ConfirmationStatus};
use sentinel::config::NetworkSettings;
use sentinel::engine::gate::{self, GateDecision, NetworkParams};
use sentinel::engine::{FundingGate, NetworkContext, NetworkPool, Orchestrator, StrikeDispatcher};
use sentinel::trust::{JsonFileStore, MemoryStore, TrustLedger, TrustPolicy, MIN_SCORE};
use sentinel::types::{CandidateSignal, FeeSnapshot, StrikeOutcome, StrikeStage, Wei, WEI_PER_GWEI};

use stub_chain::StubChain;

const RESERVE: Wei = 5_000_000_000_000_000; // 0.005 ETH

fn params() -> NetworkParams {
    NetworkParams {
        moat: 3_000_000_000_000_000, // 0.003 ETH
        priority_fee_floor: WEI_PER_GWEI,
        overhead_gas_units: 1_000_000,
    }
}

fn fees() -> FeeSnapshot {
    FeeSnapshot {
        gas_price: 10 * WEI_PER_GWEI,
        priority_fee: 0,
    }
}

/// 1e6 * (10 gwei * 1.2 + 1 gwei) + 0.003 ETH = 0.016 ETH
fn overhead() -> Wei {
    params().overhead(&fees())
}

fn settings(name: &str) -> NetworkSettings {
    NetworkSettings {
        name: name.to_string(),
        chain_id: 42161,
        rpc_url: "http://stub".to_string(),
        params: params(),
        router: Address::repeat_byte(0x22),
        quote_token: Address::repeat_byte(0x44),
        gas_limit: 600_000,
        tokens: HashMap::new(),
    }
}

fn context(name: &str, chain: Arc<StubChain>) -> Arc<NetworkContext> {
    Arc::new(NetworkContext::new(
        &settings(name),
        Address::repeat_byte(0x11),
        Address::repeat_byte(0x99),
        chain,
    ))
}

struct Engine {
    dispatcher: Arc<StrikeDispatcher>,
    store: Arc<MemoryStore>,
}

fn engine(seeds: &[(&str, f64)]) -> Engine {
    let store = Arc::new(MemoryStore::default());
    let seeds = seeds.iter().map(|(k, v)| (k.to_string(), *v)).collect();
    let trust = Arc::new(TrustLedger::open(Box::new(store.clone()), &seeds));
    Engine {
        dispatcher: Arc::new(StrikeDispatcher::new(
            FundingGate::new(RESERVE),
            trust,
            TrustPolicy::Disabled,
            1,
        )),
        store,
    }
}

// ---------------------------------------------------------------------------
// Funding gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_one_wei_short_is_rejected_with_exact_deficit() {
    assert_eq!(overhead(), 16_000_000_000_000_000);
    let balance = overhead() + RESERVE - 1;
    let chain = Arc::new(StubChain::new(balance, fees()));
    let e = engine(&[]);

    let decision = FundingGate::new(RESERVE)
        .check(&params(), chain.as_ref() as &dyn ChainClient)
        .await
        .unwrap();
    assert_eq!(
        decision,
        GateDecision::Rejected {
            deficit: 1,
            required_floor: overhead() + RESERVE,
        }
    );

    let outcome = e
        .dispatcher
        .dispatch(&context("ARBITRUM", chain.clone()), &CandidateSignal::new("WEB_AI", "PEPE"))
        .await;
    assert_eq!(
        outcome,
        StrikeOutcome::Underfunded {
            stage: StrikeStage::Gating,
            deficit: Some(1),
        }
    );
    assert_eq!(chain.simulations.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(e.store.writes(), 0);
}

#[tokio::test]
async fn test_surplus_is_sized_as_balance_minus_overhead() {
    let balance = overhead() + RESERVE + 10;
    let chain = Arc::new(StubChain::new(balance, fees()));
    let e = engine(&[]);

    match gate::evaluate(&params(), RESERVE, balance, &fees()) {
        GateDecision::Approved(action) => {
            assert_eq!(action.trade_amount, RESERVE + 10);
            assert_eq!(action.fee_per_unit, 13 * WEI_PER_GWEI);
            assert_eq!(action.priority_fee_per_unit, WEI_PER_GWEI);
        }
        other => panic!("expected approval, got {other:?}"),
    }

    let outcome = e
        .dispatcher
        .dispatch(&context("ARBITRUM", chain.clone()), &CandidateSignal::new("WEB_AI", "PEPE"))
        .await;
    assert!(matches!(outcome, StrikeOutcome::Succeeded { .. }));
    assert_eq!(chain.broadcast_amounts(), vec![RESERVE + 10]);
}

// ---------------------------------------------------------------------------
// Dispatch outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_simulation_revert_never_broadcasts() {
    let chain = Arc::new(
        StubChain::new(1_000_000_000_000_000_000, fees())
            .simulate_with(Err(ChainError::Reverted("execution reverted: K".into()))),
    );
    let e = engine(&[("WEB_AI", 0.85)]);

    let outcome = e
        .dispatcher
        .dispatch(&context("BASE", chain.clone()), &CandidateSignal::new("WEB_AI", "PEPE"))
        .await;
    assert!(matches!(
        outcome,
        StrikeOutcome::Reverted {
            stage: StrikeStage::Simulating,
            ..
        }
    ));
    assert!(chain.broadcast_nonces().is_empty());
    assert_eq!(e.store.writes(), 0);
    assert_eq!(e.dispatcher.trust().get("WEB_AI").await, 0.85);
}

#[tokio::test]
async fn test_failed_confirmation_decays_trust_to_floor() {
    let chain = Arc::new(
        StubChain::new(1_000_000_000_000_000_000, fees())
            .confirm_with(Ok(ConfirmationStatus::Reverted { block: 9 })),
    );
    let e = engine(&[("FAT_PIG", 0.95), ("LOW", 0.105)]);
    let ctx = context("BASE", chain.clone());

    let outcome = e
        .dispatcher
        .dispatch(&ctx, &CandidateSignal::new("FAT_PIG", "PEPE"))
        .await;
    assert!(matches!(
        outcome,
        StrikeOutcome::Failed {
            stage: StrikeStage::Confirming,
            ..
        }
    ));
    assert!((e.dispatcher.trust().get("FAT_PIG").await - 0.855).abs() < 1e-12);

    e.dispatcher.dispatch(&ctx, &CandidateSignal::new("LOW", "PEPE")).await;
    assert_eq!(e.dispatcher.trust().get("LOW").await, MIN_SCORE);
    assert_eq!(e.store.writes(), 2);
}

#[tokio::test]
async fn test_concurrent_dispatches_use_distinct_nonces() {
    let chain = Arc::new(
        StubChain::new(1_000_000_000_000_000_000, fees())
            .with_broadcast_delay(Duration::from_millis(10)),
    );
    let e = engine(&[]);
    let ctx = context("ETHEREUM", chain.clone());

    let mut handles = Vec::new();
    for i in 0..5 {
        let dispatcher = e.dispatcher.clone();
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            dispatcher
                .dispatch(&ctx, &CandidateSignal::new(format!("S{i}"), "PEPE"))
                .await
        }));
    }
    for h in handles {
        assert!(matches!(h.await.unwrap(), StrikeOutcome::Succeeded { .. }));
    }

    let mut nonces = chain.broadcast_nonces();
    assert_eq!(nonces.len(), 5);
    nonces.dedup();
    assert_eq!(nonces, vec![0, 1, 2, 3, 4]);
    assert_eq!(e.store.writes(), 5);
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unreachable_network_is_isolated() {
    let down = Arc::new(StubChain::unreachable());
    let up = Arc::new(StubChain::new(1_000_000_000_000_000_000, fees()));
    let pool = Arc::new(
        NetworkPool::from_contexts(vec![context("DOWN", down), context("UP", up.clone())]).unwrap(),
    );
    let e = engine(&[]);

    let (tx, rx) = sentinel::ingest::channel(8);
    tx.send(CandidateSignal::new("WEB_AI", "PEPE")).await.unwrap();
    let mut orch = Orchestrator::new(pool, e.dispatcher.clone(), rx, Duration::from_millis(1));

    let report = orch.run_iteration().await;
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(up.broadcast_nonces(), vec![0]);
}

#[tokio::test]
async fn test_backlog_of_one_signal_strikes_once() {
    let balance = 1_000_000_000_000_000_000;
    let chain = Arc::new(StubChain::new(balance, fees()));
    let pool = Arc::new(NetworkPool::from_contexts(vec![context("BASE", chain.clone())]).unwrap());
    let e = engine(&[]);

    let (tx, rx) = sentinel::ingest::channel(8);
    for _ in 0..3 {
        tx.send(CandidateSignal::new("WEB_AI", "PEPE")).await.unwrap();
    }
    let mut orch = Orchestrator::new(pool, e.dispatcher.clone(), rx, Duration::from_millis(1));

    let report = orch.run_iteration().await;
    assert_eq!(report.signals, 1);
    assert_eq!(report.dispatched, 1);
    assert_eq!(chain.broadcast_amounts(), vec![balance - overhead()]);
}

#[tokio::test]
async fn test_trust_survives_restart() {
    let path = std::env::temp_dir().join(format!("sentinel_it_{}.json", uuid::Uuid::new_v4()));
    let chain = Arc::new(StubChain::new(1_000_000_000_000_000_000, fees()));
    {
        let trust = Arc::new(TrustLedger::open(
            Box::new(JsonFileStore::new(&path)),
            &HashMap::new(),
        ));
        let dispatcher = StrikeDispatcher::new(FundingGate::new(RESERVE), trust, TrustPolicy::Disabled, 1);
        dispatcher
            .dispatch(&context("BASE", chain), &CandidateSignal::new("WEB_AI", "PEPE"))
            .await;
    }

    let seeds = HashMap::from([("WEB_AI".to_string(), 0.85)]);
    let reopened = TrustLedger::open(Box::new(JsonFileStore::new(&path)), &seeds);
    assert!((reopened.get("WEB_AI").await - 0.525).abs() < 1e-12);
    std::fs::remove_file(&path).unwrap();
}

//! Orchestration loop.
//!
//! Each iteration drains whatever the producers have queued, falls back to
//! a discovery signal when the queue is empty, and fans every signal out
//! to every network. One task per (network, signal), so a panic or stall
//! in one never blocks the others. The loop waits for the whole batch to
//! settle, then sleeps for the configured interval.

use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use crate::engine::dispatcher::StrikeDispatcher;
use crate::engine::pool::NetworkPool;
use crate::health::HealthState;
use crate::types::{CandidateSignal, StrikeOutcome};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome counts for one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IterationReport {
    pub iteration: u64,
    pub signals: usize,
    pub dispatched: usize,
    pub succeeded: usize,
    pub reverted: usize,
    pub underfunded: usize,
    pub failed: usize,
    pub distrusted: usize,
    /// Dispatch tasks that panicked or were cancelled.
    pub aborted: usize,
}

impl IterationReport {
    pub fn record(&mut self, outcome: &StrikeOutcome) {
        match outcome {
            StrikeOutcome::Succeeded { .. } => self.succeeded += 1,
            StrikeOutcome::Reverted { .. } => self.reverted += 1,
            StrikeOutcome::Underfunded { .. } => self.underfunded += 1,
            StrikeOutcome::Failed { .. } => self.failed += 1,
            StrikeOutcome::Distrusted { .. } => self.distrusted += 1,
        }
    }

    /// Terminal outcomes recorded, excluding aborted tasks.
    pub fn settled(&self) -> usize {
        self.succeeded + self.reverted + self.underfunded + self.failed + self.distrusted
    }
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    pool: Arc<NetworkPool>,
    dispatcher: Arc<StrikeDispatcher>,
    signals: mpsc::Receiver<CandidateSignal>,
    interval: Duration,
    health: Option<Arc<HealthState>>,
    iteration: u64,
}

impl Orchestrator {
    pub fn new(
        pool: Arc<NetworkPool>,
        dispatcher: Arc<StrikeDispatcher>,
        signals: mpsc::Receiver<CandidateSignal>,
        interval: Duration,
    ) -> Self {
        Self {
            pool,
            dispatcher,
            signals,
            interval,
            health: None,
            iteration: 0,
        }
    }

    /// Publish iteration counters to the liveness endpoint.
    pub fn with_health(mut self, health: Arc<HealthState>) -> Self {
        self.health = Some(health);
        self
    }

    /// Everything currently queued, once per distinct signal, or a single
    /// discovery signal. Producers keep emitting while an iteration waits
    /// on confirmations, so repeats of the same (source, token) collapse.
    fn drain(&mut self) -> Vec<CandidateSignal> {
        let mut seen = HashSet::new();
        let mut batch = Vec::new();
        let mut dropped = 0usize;
        while let Ok(signal) = self.signals.try_recv() {
            if seen.insert(signal.clone()) {
                batch.push(signal);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(dropped, "Duplicate signals collapsed");
        }
        if batch.is_empty() {
            batch.push(CandidateSignal::discovery());
        }
        batch
    }

    /// Run one drain-and-dispatch pass and wait for every strike to settle.
    pub async fn run_iteration(&mut self) -> IterationReport {
        self.iteration += 1;
        let batch = self.drain();
        debug!(iteration = self.iteration, signals = batch.len(), "Iteration started");

        let mut handles = Vec::with_capacity(batch.len() * self.pool.contexts().len());
        for ctx in self.pool.contexts() {
            for signal in &batch {
                let ctx = ctx.clone();
                let signal = signal.clone();
                let dispatcher = self.dispatcher.clone();
                handles.push(tokio::spawn(async move {
                    dispatcher.dispatch(&ctx, &signal).await
                }));
            }
        }

        let mut report = IterationReport {
            iteration: self.iteration,
            signals: batch.len(),
            dispatched: handles.len(),
            ..Default::default()
        };
        for result in join_all(handles).await {
            match result {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    error!(iteration = self.iteration, error = %e, "Strike task aborted");
                    report.aborted += 1;
                }
            }
        }

        info!(
            iteration = report.iteration,
            signals = report.signals,
            dispatched = report.dispatched,
            succeeded = report.succeeded,
            reverted = report.reverted,
            underfunded = report.underfunded,
            failed = report.failed,
            distrusted = report.distrusted,
            aborted = report.aborted,
            "Iteration complete"
        );

        if let Some(health) = &self.health {
            health.record(&report).await;
        }
        report
    }

    /// Loop until the shutdown broadcast fires. An in-flight iteration is
    /// always allowed to finish.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            networks = ?self.pool.names(),
            interval_secs = self.interval.as_secs_f64(),
            "Orchestrator started"
        );
        loop {
            self.run_iteration().await;
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, orchestrator stopping");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Core engine: funding gate, strike dispatch, network pool and the
//! orchestration loop that ties them to ingestion.

pub mod dispatcher;
pub mod gate;
pub mod orchestrator;
pub mod pool;

pub use dispatcher::StrikeDispatcher;
pub use gate::{FundingGate, GateDecision, NetworkParams};
pub use orchestrator::{IterationReport, Orchestrator};
pub use pool::{NetworkContext, NetworkPool};

//! SENTINEL: funding-gated strike engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod chain;
pub mod config;
pub mod engine;
pub mod health;
pub mod ingest;
pub mod trust;
pub mod types;

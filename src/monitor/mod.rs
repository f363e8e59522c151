//! Aggregate monitoring
//!
//! Periodic fan-out over all tenants and the snapshot it maintains.

pub mod orchestrator;

pub use orchestrator::RefreshOrchestrator;

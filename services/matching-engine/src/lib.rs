//! Matching Engine Service
//!
//! The trade-execution core of the exchange, driven by a scheduler over
//! persisted order state rather than by an inbound order stream:
//!
//! - `matcher`: per-market matching rounds with price-time priority and
//!   an atomic commit per trade
//! - `partition`: deterministic assignment of markets to workers
//! - `scheduler`: the long-lived round loop over a blocking worker pool
//! - `wallet` / `fees`: collaborator traits for settlement and fee rates
//! - `rounds`: round metrics, latency tracking, alert thresholds
//! - `alerts`: admin-notification sink
//! - `config`: environment-driven service configuration
//!
//! # Architecture
//!
//! ```text
//!        Scheduler (round loop)
//!             │
//!        Partitioner
//!        ┌────┼─────────┐
//!        │    │         │
//!   partition 0    partitions 1..N   (blocking worker pool)
//!        │    │         │
//!        └────┼─────────┘
//!           Matcher (per market, sequential within a partition)
//!             │
//!      Store unit of work  ──  WalletGateway (inside the transaction)
//! ```

pub mod alerts;
pub mod config;
pub mod fees;
pub mod matcher;
pub mod partition;
pub mod rounds;
pub mod scheduler;
pub mod wallet;

// Service version
pub const SERVICE_VERSION: &str = "0.1.0";

/// Current time as Unix nanos from the service clock.
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

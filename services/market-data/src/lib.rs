//! Order Book Service
//!
//! Derives public order-book views from persisted order state and
//! publishes best-bid/ask changes downstream:
//!
//! - `book`: aggregated, price-sorted one-side book builder
//! - `overlap`: skip-match resolution of bid/ask overlap
//! - `cache`: TTL-bounded per-market-per-side book cache
//! - `publisher`: change-gated ticker publication channel
//! - `generator`: the per-round loop over all active markets
//! - `metrics`: service counters
//! - `config`: environment-driven service configuration
//!
//! # Architecture
//!
//! ```text
//!   Order store (persisted state)
//!        │
//!   OrderBook::build  ×2 (buy, sell)
//!        │
//!   skip-match overlap resolution
//!        │
//!   ┌────┴─────┐
//!   │          │
//! BookCache  ChangeGate ── BookPublisher (on change only)
//! ```

pub mod book;
pub mod cache;
pub mod config;
pub mod generator;
pub mod metrics;
pub mod overlap;
pub mod publisher;

// Service version
pub const SERVICE_VERSION: &str = "0.1.0";

/// Current time as Unix nanos from the service clock.
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

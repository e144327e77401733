//! Storage abstraction for the exchange matching core
//!
//! The matcher and the order-book services never touch a database
//! directly; they speak to the repository traits defined here. The
//! reference implementation is the in-memory `MemoryStore`, which is
//! also what every test suite runs against. A SQL-backed store plugs in
//! at the same seam.
//!
//! - `traits`: repository interfaces and the scoped unit of work
//! - `memory`: in-memory reference implementation
//! - `dirty`: shared dirty-market tracker (store writes, scheduler drains)

pub mod dirty;
pub mod memory;
pub mod traits;

pub use dirty::DirtyMarkets;
pub use memory::MemoryStore;
pub use traits::{MarketStore, MatchStore, MatchTxn, OrderStore, TradeStore, UnitOfWork};

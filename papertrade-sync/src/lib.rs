//! Real-time state synchronization layer for the Papertrade client
//!
//! Owns the single streaming connection, multiplexes per-symbol
//! subscriptions, merges asynchronously-arriving price/order/portfolio
//! events into a locally held snapshot, and reconciles that snapshot
//! against authoritative REST reads and optimistic local mutations.

pub mod event;
pub mod session;
pub mod store;
pub mod subscription;
pub mod transport;

pub use event::{normalize, DomainEvent};
pub use session::{SessionConfig, SyncSession};
pub use store::{CancelEligibility, StateStore, StoreSnapshot};
pub use subscription::InterestSet;
pub use transport::{StreamConfig, StreamConnection, StreamEvent, StreamHandle};

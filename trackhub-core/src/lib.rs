//! Core types and service wiring for the trackhub carrier tracking aggregator.

/// Time-bounded cache for adapter results, with per-key call coalescing.
pub mod cache;
/// Operator-entered tracking events.
pub mod manual;
/// Domain models and identifiers shared by all carriers.
pub mod model;
/// Registry for plugging carrier adapters into the service.
pub mod plugin;
/// Traits describing the carrier, record store and mirror interfaces.
pub mod ports;
/// Background job re-resolving recent shipments.
pub mod refresh;
/// High-level service facade used by clients.
pub mod service;
/// In-memory record store backed by a JSON snapshot.
pub mod store;
/// Deduplicating writer for the downstream mirror.
pub mod sync;
/// HTTP and JSON helpers for carrier adapters.
pub mod transport;

#[cfg(test)]
mod testing;

pub use model::*;
pub use plugin::*;
pub use ports::*;
pub use service::*;

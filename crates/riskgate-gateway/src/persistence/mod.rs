//! Durable recording of evaluations.

pub mod coordinator;
pub mod store;

pub use coordinator::{PersistenceConfig, PersistenceCoordinator, PersistenceMode, Recorded};
pub use store::{DecisionRecord, InMemoryStore, TransactionRecord, TransactionStore, DEFAULT_MERCHANT};

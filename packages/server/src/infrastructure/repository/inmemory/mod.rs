//! InMemory storage engine.
//!
//! A single `tokio::sync::Mutex` guards every table. A transaction holds that
//! lock for its whole lifetime, so transactions are serialized and commit in
//! the order they were opened. Writes are staged inside the transaction and
//! applied to the tables only on commit.

mod store;
mod transaction;

pub use store::InMemoryStore;
pub use transaction::InMemoryTransaction;

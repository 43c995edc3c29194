//! # storage-adapters
//!
//! Content store implementations of the `domains` ports.
//!
//! - [`memory::MemoryStore`]: always compiled, collections behind one lock.
//! - [`postgres`]: feature `db-postgres`, sqlx against the bundled schema.

pub mod memory;

#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use memory::MemoryStore;

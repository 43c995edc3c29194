//! # domains
//!
//! Models, ranking rules and port traits for the community feed engine.
//! Nothing in this crate performs I/O; adapters implement the ports.

pub mod error;
pub mod feed;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use error::*;
pub use feed::*;
pub use models::*;
pub use ports::*;

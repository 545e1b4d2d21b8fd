//! Timing model of a small blocking cache.
//!
//! [`cache::SimpleCache`] sits between any number of requestors and one
//! memory. It serves one access at a time: hits return after a fixed latency,
//! misses fetch the whole block from memory, and fills into a full cache evict
//! a random block and write it back. Every link uses the same accept, refuse
//! and retry protocol ([`port`]).
//!
//! The [`sim`] module wires a cache to a backing memory and trace-driven
//! requestors on a discrete-event queue.

pub mod access;
pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod eviction;
pub mod memobj;
pub mod memory_access;
pub mod packet;
pub mod port;
pub mod sim;
pub mod stats;
pub mod store;
pub mod types;

pub use cache::{CacheEvent, SimpleCache};
pub use config::{CacheConfig, Clock};
pub use error::{CacheError, Result};
pub use packet::{MemCmd, Packet};

//! Event-driven harness around one cache: a backing memory, one requestor per
//! CPU-side port, and the queue that drives them.

mod memory;
mod requestor;
mod system;

pub use memory::SimpleMemory;
pub use requestor::TraceRequestor;
pub use system::System;

use crate::cache::CacheEvent;
use crate::types::PortId;

/// Every event the harness can schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    Cache(CacheEvent),
    /// The oldest in-flight memory response is due.
    MemRespond,
    /// Memory can take the request it refused.
    MemRetry,
    /// Requestor on the port sends its next request.
    Issue(PortId),
    /// Requestor on the port can take the response it refused.
    RespRetry(PortId),
}

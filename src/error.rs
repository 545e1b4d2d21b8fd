//! Error type for the cache model.
//!
//! Only conditions that stop a simulation are errors. A cache miss or a busy
//! peer is ordinary control flow and never surfaces here. Protocol misuse by a
//! peer (sending while blocked, retrying with nothing to retry) is a bug in the
//! caller and panics instead.

use thiserror::Error;

use crate::memory_access::ParseError;
use crate::packet::MemCmd;
use crate::types::Addr;

#[derive(Debug, Error)]
pub enum CacheError {
    /// An access whose footprint crosses a block boundary.
    #[error("access to 0x{addr:x} of {size} bytes spans multiple {block_size}-byte cache lines")]
    SpansBlocks {
        addr: Addr,
        size: usize,
        block_size: usize,
    },

    #[error("unsupported packet command {0:?}")]
    UnsupportedCommand(MemCmd),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no port named {name}{}", idx.map(|i| format!("[{i}]")).unwrap_or_default())]
    UnknownPort { name: String, idx: Option<usize> },

    #[error("trace: {0}")]
    Parse(#[from] ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

use std::fmt;

use crate::types::Addr;

/// Command carried by a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemCmd {
    ReadReq,
    ReadResp,
    WriteReq,
    WriteResp,
    /// Dirty block evicted from a cache. Never answered.
    WritebackDirty,
    /// Drop any cached copy of a block. Caches without coherence reject it.
    InvalidateReq,
    InvalidateResp,
}

impl MemCmd {
    pub fn is_read(self) -> bool {
        matches!(self, MemCmd::ReadReq | MemCmd::ReadResp)
    }

    pub fn is_write(self) -> bool {
        matches!(
            self,
            MemCmd::WriteReq | MemCmd::WriteResp | MemCmd::WritebackDirty
        )
    }

    pub fn is_request(self) -> bool {
        matches!(
            self,
            MemCmd::ReadReq | MemCmd::WriteReq | MemCmd::WritebackDirty | MemCmd::InvalidateReq
        )
    }

    pub fn is_response(self) -> bool {
        matches!(
            self,
            MemCmd::ReadResp | MemCmd::WriteResp | MemCmd::InvalidateResp
        )
    }

    pub fn needs_response(self) -> bool {
        matches!(
            self,
            MemCmd::ReadReq | MemCmd::WriteReq | MemCmd::InvalidateReq
        )
    }

    fn response(self) -> Option<MemCmd> {
        match self {
            MemCmd::ReadReq => Some(MemCmd::ReadResp),
            MemCmd::WriteReq => Some(MemCmd::WriteResp),
            MemCmd::InvalidateReq => Some(MemCmd::InvalidateResp),
            _ => None,
        }
    }
}

/// A memory request or response in flight between components.
///
/// Packets are moved, never shared: whoever holds the value owns it. A refused
/// send hands the packet back to the sender.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Identifies the originating request. A block-sized request built to
    /// satisfy a partial access keeps the id of the access it serves.
    pub req_id: u64,
    pub addr: Addr,
    pub size: usize,
    pub cmd: MemCmd,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(req_id: u64, addr: Addr, size: usize, cmd: MemCmd) -> Self {
        Packet {
            req_id,
            addr,
            size,
            cmd,
            data: vec![0; size],
        }
    }

    pub fn read(req_id: u64, addr: Addr, size: usize) -> Self {
        Self::new(req_id, addr, size, MemCmd::ReadReq)
    }

    pub fn write(req_id: u64, addr: Addr, data: Vec<u8>) -> Self {
        Packet {
            req_id,
            addr,
            size: data.len(),
            cmd: MemCmd::WriteReq,
            data,
        }
    }

    pub fn writeback(addr: Addr, data: Vec<u8>) -> Self {
        Packet {
            req_id: 0,
            addr,
            size: data.len(),
            cmd: MemCmd::WritebackDirty,
            data,
        }
    }

    pub fn is_read(&self) -> bool {
        self.cmd.is_read()
    }

    pub fn is_write(&self) -> bool {
        self.cmd.is_write()
    }

    pub fn is_response(&self) -> bool {
        self.cmd.is_response()
    }

    pub fn needs_response(&self) -> bool {
        self.cmd.needs_response()
    }

    /// Address of the block containing the first byte. `block_size` must be a
    /// power of two.
    pub fn block_addr(&self, block_size: usize) -> Addr {
        self.addr & !(block_size as u64 - 1)
    }

    /// Byte offset of the packet inside its block.
    pub fn block_offset(&self, block_size: usize) -> usize {
        (self.addr - self.block_addr(block_size)) as usize
    }

    /// True if the access stays within one block.
    pub fn fits_in_block(&self, block_size: usize) -> bool {
        self.block_offset(block_size) + self.size <= block_size
    }

    /// True if the packet covers exactly one whole block.
    pub fn is_whole_block(&self, block_size: usize) -> bool {
        self.addr == self.block_addr(block_size) && self.size == block_size
    }

    /// Turn a request into its response in place. Payload is kept.
    pub fn make_response(&mut self) {
        self.cmd = match self.cmd.response() {
            Some(cmd) => cmd,
            None => panic!("{:?} has no response", self.cmd),
        };
    }

    /// Copy this packet's payload into the block it falls in.
    pub fn write_data_to_block(&self, block: &mut [u8]) {
        let offset = self.block_offset(block.len());
        block[offset..offset + self.size].copy_from_slice(&self.data[..self.size]);
    }

    /// Fill this packet's payload from the block it falls in.
    pub fn set_data_from_block(&mut self, block: &[u8]) {
        let offset = self.block_offset(block.len());
        self.data.resize(self.size, 0);
        self.data.copy_from_slice(&block[offset..offset + self.size]);
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Packet {{req: {}, cmd: {:?}, addr: 0x{:016x}, size: {} }}",
            self.req_id, self.cmd, self.addr, self.size
        )
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} [0x{:x}:0x{:x}]", self.cmd, self.addr, self.addr + self.size as u64)
    }
}

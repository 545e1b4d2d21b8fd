use tracing::debug;

use crate::error::{CacheError, Result};
use crate::eviction::RandomEviction;
use crate::packet::Packet;
use crate::store::BlockStore;

/// Functional side of the cache: lookups, in-place reads/writes, fills.
#[derive(Debug)]
pub struct AccessEngine {
    store: BlockStore,
    eviction: RandomEviction,
}

impl AccessEngine {
    pub fn new(capacity: usize, block_size: usize, seed: u64) -> Self {
        AccessEngine {
            store: BlockStore::new(capacity, block_size),
            eviction: RandomEviction::new(seed),
        }
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn block_size(&self) -> usize {
        self.store.block_size()
    }

    /// Check that `pkt` is a read or write that expects a response and stays
    /// inside one block.
    pub fn check_access(&self, pkt: &Packet) -> Result<()> {
        let block_size = self.block_size();
        if !(pkt.is_read() || pkt.is_write()) || !pkt.needs_response() {
            return Err(CacheError::UnsupportedCommand(pkt.cmd));
        }
        if !pkt.fits_in_block(block_size) {
            return Err(CacheError::SpansBlocks {
                addr: pkt.addr,
                size: pkt.size,
                block_size,
            });
        }
        Ok(())
    }

    /// Serve `pkt` from the store if its block is resident.
    ///
    /// Returns `Ok(true)` on a hit, with the read data copied into the packet
    /// or the write applied to the block. A miss has no side effects.
    pub fn access_functional(&mut self, pkt: &mut Packet) -> Result<bool> {
        self.check_access(pkt)?;
        let block_addr = pkt.block_addr(self.block_size());
        let Some(block) = self.store.get_mut(block_addr) else {
            return Ok(false);
        };
        if pkt.is_write() {
            pkt.write_data_to_block(block);
        } else {
            pkt.set_data_from_block(block);
        }
        Ok(true)
    }

    /// Free a slot if the store is full, returning the write-back for the
    /// evicted block.
    pub fn make_room(&mut self) -> Option<Packet> {
        if !self.store.is_full() {
            return None;
        }
        let victim = self.eviction.victim(&self.store)?;
        let block = self.store.remove(victim)?;
        debug!(addr = format_args!("{:#x}", block.addr), "removing block");
        Some(Packet::writeback(block.addr, block.data.into_vec()))
    }

    /// Store the block carried by a downstream response.
    ///
    /// The store must have room for it (see [`AccessEngine::make_room`]).
    pub fn fill(&mut self, pkt: &Packet) {
        debug_assert!(pkt.is_whole_block(self.block_size()));
        let block = self.store.allocate(pkt.addr);
        pkt.write_data_to_block(block);
    }

    /// Evict if needed, then store the block. Returns the write-back, if any.
    pub fn insert(&mut self, pkt: &Packet) -> Option<Packet> {
        let writeback = if self.store.contains(pkt.addr) {
            None
        } else {
            self.make_room()
        };
        self.fill(pkt);
        writeback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::MemCmd;
    use proptest::prelude::*;

    fn block(addr: u64, byte: u8) -> Packet {
        let mut pkt = Packet::write(0, addr, vec![byte; 64]);
        pkt.make_response();
        pkt
    }

    #[test]
    fn miss_has_no_side_effects() {
        let mut engine = AccessEngine::new(2, 64, 1);
        let mut rd = Packet::read(1, 0x100, 8);
        assert!(!engine.access_functional(&mut rd).unwrap());
        assert!(engine.store().is_empty());
        assert_eq!(rd.data, vec![0; 8]);
    }

    #[test]
    fn hit_reads_and_writes_in_place() {
        let mut engine = AccessEngine::new(2, 64, 1);
        assert!(engine.insert(&block(0x40, 0xaa)).is_none());

        let mut wr = Packet::write(1, 0x44, vec![1, 2]);
        assert!(engine.access_functional(&mut wr).unwrap());

        let mut rd = Packet::read(2, 0x42, 4);
        assert!(engine.access_functional(&mut rd).unwrap());
        assert_eq!(rd.data, vec![0xaa, 0xaa, 1, 2]);
    }

    #[test]
    fn full_store_writes_back_one_victim() {
        let mut engine = AccessEngine::new(2, 64, 3);
        engine.insert(&block(0x000, 1));
        engine.insert(&block(0x040, 2));

        let wb = engine.insert(&block(0x080, 3)).expect("writeback");
        assert_eq!(wb.cmd, MemCmd::WritebackDirty);
        assert_eq!(wb.size, 64);
        assert!(wb.addr == 0x000 || wb.addr == 0x040);
        let expected = if wb.addr == 0 { 1 } else { 2 };
        assert_eq!(wb.data, vec![expected; 64]);

        assert_eq!(engine.store().len(), 2);
        assert!(engine.store().contains(0x080));
        assert!(!engine.store().contains(wb.addr));
    }

    #[test]
    fn refilling_a_resident_block_evicts_nothing() {
        let mut engine = AccessEngine::new(1, 64, 3);
        engine.insert(&block(0x000, 1));
        assert!(engine.insert(&block(0x000, 2)).is_none());
        assert_eq!(engine.store().get(0x000).unwrap()[0], 2);
    }

    #[test]
    fn rejects_spanning_and_unsupported_accesses() {
        let mut engine = AccessEngine::new(2, 64, 1);
        let mut straddle = Packet::read(1, 0x3c, 8);
        assert!(matches!(
            engine.access_functional(&mut straddle),
            Err(CacheError::SpansBlocks { addr: 0x3c, size: 8, block_size: 64 })
        ));

        let mut inval = Packet::new(2, 0x40, 64, MemCmd::InvalidateReq);
        assert!(matches!(
            engine.access_functional(&mut inval),
            Err(CacheError::UnsupportedCommand(MemCmd::InvalidateReq))
        ));
    }

    #[test]
    fn writebacks_from_upstream_are_unsupported() {
        let mut engine = AccessEngine::new(2, 64, 1);
        engine.insert(&block(0x0, 4));
        let mut wb = Packet::writeback(0x0, vec![8; 64]);
        assert!(matches!(
            engine.access_functional(&mut wb),
            Err(CacheError::UnsupportedCommand(MemCmd::WritebackDirty))
        ));
        assert_eq!(engine.store().get(0x0).unwrap()[0], 4);
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(capacity in 1usize..8, addrs in prop::collection::vec(0u64..64, 1..200)) {
            let mut engine = AccessEngine::new(capacity, 64, 9);
            for a in addrs {
                let had_room = !engine.store().is_full() || engine.store().contains(a * 64);
                let wb = engine.insert(&block(a * 64, a as u8));
                prop_assert!(engine.store().len() <= capacity);
                prop_assert_eq!(wb.is_some(), !had_room);
            }
        }

        #[test]
        fn reads_return_last_inserted_data(addr in 0u64..0x4000, byte in any::<u8>(), off in 0u64..56) {
            let mut engine = AccessEngine::new(4, 64, 5);
            let base = addr & !63;
            engine.insert(&block(base, byte));
            let mut rd = Packet::read(1, base + off, 8);
            prop_assert!(engine.access_functional(&mut rd).unwrap());
            prop_assert_eq!(rd.data, vec![byte; 8]);
        }
    }
}

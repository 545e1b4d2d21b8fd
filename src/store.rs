use std::collections::HashMap;

use crate::types::Addr;

/// One cached block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub addr: Addr,
    pub data: Box<[u8]>,
}

/// Fixed-capacity arena of blocks keyed by block address.
///
/// Blocks live densely in a `Vec`; `index` maps a block address to its slot.
/// Removal swaps the last slot into the hole, so any slot number in
/// `0..len()` always names a resident block.
#[derive(Debug)]
pub struct BlockStore {
    capacity: usize,
    block_size: usize,
    blocks: Vec<Block>,
    index: HashMap<Addr, usize>,
}

impl BlockStore {
    pub fn new(capacity: usize, block_size: usize) -> Self {
        BlockStore {
            capacity,
            block_size,
            blocks: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.blocks.len() >= self.capacity
    }

    pub fn contains(&self, addr: Addr) -> bool {
        self.index.contains_key(&addr)
    }

    pub fn get(&self, addr: Addr) -> Option<&[u8]> {
        self.index.get(&addr).map(|&slot| &*self.blocks[slot].data)
    }

    pub fn get_mut(&mut self, addr: Addr) -> Option<&mut [u8]> {
        let slot = *self.index.get(&addr)?;
        Some(&mut *self.blocks[slot].data)
    }

    /// Block resident in `slot`, for slot in `0..len()`.
    pub fn slot(&self, slot: usize) -> Option<&Block> {
        self.blocks.get(slot)
    }

    /// Allocate a zeroed block for `addr` and return its bytes. An already
    /// resident block is returned as is.
    ///
    /// Panics if the store is full; callers evict first.
    pub fn allocate(&mut self, addr: Addr) -> &mut [u8] {
        let slot = match self.index.get(&addr) {
            Some(&slot) => slot,
            None => {
                assert!(!self.is_full(), "block store over capacity");
                self.blocks.push(Block {
                    addr,
                    data: vec![0; self.block_size].into_boxed_slice(),
                });
                let slot = self.blocks.len() - 1;
                self.index.insert(addr, slot);
                slot
            }
        };
        &mut self.blocks[slot].data
    }

    /// Remove a block, handing its storage to the caller.
    pub fn remove(&mut self, addr: Addr) -> Option<Block> {
        let slot = self.index.remove(&addr)?;
        let block = self.blocks.swap_remove(slot);
        if let Some(moved) = self.blocks.get(slot) {
            self.index.insert(moved.addr, slot);
        }
        Some(block)
    }

    pub fn addrs(&self) -> impl Iterator<Item = Addr> + '_ {
        self.blocks.iter().map(|b| b.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_keeps_slots_dense() {
        let mut store = BlockStore::new(3, 64);
        store.allocate(0x000)[0] = 1;
        store.allocate(0x040)[0] = 2;
        store.allocate(0x080)[0] = 3;
        assert!(store.is_full());

        let gone = store.remove(0x000).unwrap();
        assert_eq!(gone.data[0], 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0x080).unwrap()[0], 3);
        assert_eq!(store.get(0x040).unwrap()[0], 2);
        for slot in 0..store.len() {
            let block = store.slot(slot).unwrap();
            assert!(store.contains(block.addr));
        }
        assert!(store.remove(0x000).is_none());
    }

    #[test]
    fn allocate_existing_is_not_a_second_slot() {
        let mut store = BlockStore::new(1, 8);
        store.allocate(0x10)[3] = 7;
        assert_eq!(store.allocate(0x10)[3], 7);
        assert_eq!(store.len(), 1);
    }

    #[test]
    #[should_panic(expected = "over capacity")]
    fn allocate_past_capacity_panics() {
        let mut store = BlockStore::new(1, 8);
        store.allocate(0x0);
        store.allocate(0x8);
    }
}

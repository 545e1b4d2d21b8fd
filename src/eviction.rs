use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::store::BlockStore;
use crate::types::Addr;

/// Picks eviction victims uniformly at random among resident blocks.
///
/// Recency and frequency are ignored. Each cache owns its own seeded
/// generator so runs replay exactly.
#[derive(Debug)]
pub struct RandomEviction {
    rng: StdRng,
}

impl RandomEviction {
    pub fn new(seed: u64) -> Self {
        RandomEviction {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Address of the block to evict, or `None` if the store is empty.
    pub fn victim(&mut self, store: &BlockStore) -> Option<Addr> {
        if store.is_empty() {
            return None;
        }
        let slot = self.rng.random_range(0..store.len());
        store.slot(slot).map(|block| block.addr)
    }
}

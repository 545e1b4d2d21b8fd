use crate::error::{CacheError, Result};
use crate::types::Tick;

/// Number of clock cycles.
pub type Cycles = u64;

/// Fixed-period clock used to turn cycle latencies into ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    period: Tick,
}

impl Clock {
    pub fn new(period: Tick) -> Result<Self> {
        if period == 0 {
            return Err(CacheError::InvalidConfig("clock period must be non-zero".into()));
        }
        Ok(Clock { period })
    }

    pub fn period(&self) -> Tick {
        self.period
    }

    /// First clock edge at or after `now`, plus `cycles` whole periods.
    pub fn clock_edge(&self, now: Tick, cycles: Cycles) -> Tick {
        let aligned = now.div_ceil(self.period) * self.period;
        aligned + cycles * self.period
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock { period: 1 }
    }
}

/// Parameters of one cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Cycles between accepting a request and looking it up.
    pub latency: Cycles,
    /// Bytes per block; every connected party must use the same granularity.
    pub block_size: usize,
    /// Total capacity in bytes.
    pub size: usize,
    /// Number of upstream (CPU-side) connections.
    pub cpu_ports: usize,
    /// Seed for the victim selector.
    pub seed: u64,
}

impl CacheConfig {
    pub const DEFAULT_LATENCY: Cycles = 1;
    pub const DEFAULT_SEED: u64 = 0x5eed;

    pub fn new(size: usize, block_size: usize) -> Result<Self> {
        let config = CacheConfig {
            latency: Self::DEFAULT_LATENCY,
            block_size,
            size,
            cpu_ports: 1,
            seed: Self::DEFAULT_SEED,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_latency(mut self, latency: Cycles) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_cpu_ports(mut self, cpu_ports: usize) -> Self {
        self.cpu_ports = cpu_ports;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of blocks the cache can hold.
    pub fn capacity(&self) -> usize {
        self.size / self.block_size
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || !self.block_size.is_power_of_two() {
            return Err(CacheError::InvalidConfig(format!(
                "block size {} is not a power of two",
                self.block_size
            )));
        }
        if self.size == 0 || self.size % self.block_size != 0 {
            return Err(CacheError::InvalidConfig(format!(
                "cache size {} is not a non-zero multiple of the block size {}",
                self.size, self.block_size
            )));
        }
        if self.cpu_ports == 0 {
            return Err(CacheError::InvalidConfig(
                "cache needs at least one cpu_side port".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_counted_in_blocks() {
        let config = CacheConfig::new(1024, 64).unwrap();
        assert_eq!(config.capacity(), 16);
        assert_eq!(config.cpu_ports, 1);
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(matches!(
            CacheConfig::new(1024, 48),
            Err(CacheError::InvalidConfig(_))
        ));
        assert!(matches!(
            CacheConfig::new(100, 64),
            Err(CacheError::InvalidConfig(_))
        ));
        assert!(matches!(
            CacheConfig::new(0, 64),
            Err(CacheError::InvalidConfig(_))
        ));
        let no_ports = CacheConfig::new(128, 64).unwrap().with_cpu_ports(0);
        assert!(no_ports.validate().is_err());
    }

    #[test]
    fn clock_edges_align_to_period() {
        let clock = Clock::new(10).unwrap();
        assert_eq!(clock.clock_edge(0, 2), 20);
        assert_eq!(clock.clock_edge(3, 0), 10);
        assert_eq!(clock.clock_edge(10, 1), 20);
        assert_eq!(Clock::default().clock_edge(7, 3), 10);
        assert!(Clock::new(0).is_err());
    }
}

use std::io::{self, Write};

/// Histogram with a fixed number of buckets whose width doubles whenever a
/// sample lands past the last bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    buckets: Vec<u64>,
    bucket_size: u64,
    samples: u64,
    sum: u64,
    min: Option<u64>,
    max: Option<u64>,
}

impl Histogram {
    pub fn new(num_buckets: usize) -> Self {
        assert!(
            num_buckets >= 2 && num_buckets % 2 == 0,
            "histogram needs an even bucket count"
        );
        Histogram {
            buckets: vec![0; num_buckets],
            bucket_size: 1,
            samples: 0,
            sum: 0,
            min: None,
            max: None,
        }
    }

    pub fn sample(&mut self, value: u64) {
        while value >= self.bucket_size * self.buckets.len() as u64 {
            self.grow();
        }
        self.buckets[(value / self.bucket_size) as usize] += 1;
        self.samples += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
    }

    fn grow(&mut self) {
        let n = self.buckets.len();
        for i in 0..n / 2 {
            self.buckets[i] = self.buckets[2 * i] + self.buckets[2 * i + 1];
        }
        self.buckets[n / 2..].fill(0);
        self.bucket_size *= 2;
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn bucket_size(&self) -> u64 {
        self.bucket_size
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }

    pub fn min(&self) -> Option<u64> {
        self.min
    }

    pub fn max(&self) -> Option<u64> {
        self.max
    }

    pub fn mean(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.sum as f64 / self.samples as f64
        }
    }
}

/// Counters a cache exports. Purely observational.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Ticks from detecting a miss to receiving the block.
    pub miss_latency: Histogram,
}

impl CacheStats {
    pub fn new() -> Self {
        CacheStats {
            hits: 0,
            misses: 0,
            miss_latency: Histogram::new(16),
        }
    }

    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// hits / (hits + misses); 0 before the first access.
    pub fn hit_ratio(&self) -> f64 {
        match self.accesses() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }

    /// Write a `name.stat value # description` dump.
    pub fn write_to(&self, name: &str, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "{name}.hits {} # Number of hits", self.hits)?;
        writeln!(out, "{name}.misses {} # Number of misses", self.misses)?;
        writeln!(
            out,
            "{name}.missLatency::samples {} # Ticks for misses to the cache",
            self.miss_latency.samples()
        )?;
        writeln!(
            out,
            "{name}.missLatency::mean {:.6} # Ticks for misses to the cache",
            self.miss_latency.mean()
        )?;
        let width = self.miss_latency.bucket_size();
        for (i, count) in self.miss_latency.buckets().iter().enumerate() {
            let lo = i as u64 * width;
            writeln!(out, "{name}.missLatency::{}-{} {count}", lo, lo + width - 1)?;
        }
        writeln!(
            out,
            "{name}.hitRatio {:.6} # The ratio of hits to the total accesses to the cache",
            self.hit_ratio()
        )
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

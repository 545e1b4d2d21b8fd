use std::fmt;

/// Byte address in the simulated physical address space.
pub type Addr = u64;

/// Simulated time.
pub type Tick = u64;

/// Index of a CPU-side port on a component.
pub type PortId = usize;

/// Half-open address range `[start, end)` advertised by a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrRange {
    pub start: Addr,
    pub end: Addr,
}

impl AddrRange {
    pub fn new(start: Addr, end: Addr) -> Self {
        assert!(start <= end, "address range end before start");
        AddrRange { start, end }
    }

    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn contains(&self, addr: Addr) -> bool {
        addr >= self.start && addr < self.end
    }

    /// True if every byte of `[addr, addr + size)` is inside the range.
    pub fn contains_span(&self, addr: Addr, size: usize) -> bool {
        addr >= self.start
            && addr
                .checked_add(size as u64)
                .is_some_and(|end| end <= self.end)
    }
}

impl fmt::Display for AddrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0x{:016x}:0x{:016x})", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_must_fit_entirely() {
        let range = AddrRange::new(0x1000, 0x2000);
        assert!(range.contains(0x1000));
        assert!(!range.contains(0x2000));
        assert!(range.contains_span(0x1fc0, 64));
        assert!(!range.contains_span(0x1fc1, 64));
        assert!(!range.contains_span(0x0fff, 2));
        assert_eq!(range.size(), 0x1000);
    }
}

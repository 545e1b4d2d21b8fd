use std::collections::VecDeque;

use tracing::trace;

use crate::event::Scheduler;
use crate::packet::Packet;
use crate::sim::SimEvent;
use crate::types::{AddrRange, Tick};

/// Backing memory behind the cache's memory-side port.
///
/// Answers every request after a fixed latency, in arrival order. At most
/// `max_outstanding` requests that need a response may be in flight; more are
/// refused until a response leaves. Write-backs are applied on arrival and
/// never answered.
#[derive(Debug)]
pub struct SimpleMemory {
    range: AddrRange,
    latency: Tick,
    max_outstanding: usize,
    bytes: Vec<u8>,
    in_flight: VecDeque<Packet>,
    need_retry: bool,
    refuse_next: usize,
    received: Vec<(Tick, Packet)>,
}

impl SimpleMemory {
    pub fn new(range: AddrRange, latency: Tick) -> Self {
        SimpleMemory {
            range,
            latency,
            max_outstanding: 1,
            bytes: vec![0; range.size() as usize],
            in_flight: VecDeque::new(),
            need_retry: false,
            refuse_next: 0,
            received: Vec::new(),
        }
    }

    pub fn with_max_outstanding(mut self, max_outstanding: usize) -> Self {
        self.max_outstanding = max_outstanding.max(1);
        self
    }

    /// Refuse the next `n` timing requests regardless of load; each refusal
    /// is followed by a retry one tick later.
    pub fn refuse_next(&mut self, n: usize) {
        self.refuse_next = n;
    }

    pub fn range(&self) -> AddrRange {
        self.range
    }

    /// Every accepted timing request with its arrival tick.
    pub fn received(&self) -> &[(Tick, Packet)] {
        &self.received
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Bytes currently stored at `[addr, addr + len)`.
    pub fn peek(&self, addr: u64, len: usize) -> &[u8] {
        let offset = self.offset(addr, len);
        &self.bytes[offset..offset + len]
    }

    /// Store bytes directly, bypassing timing.
    pub fn poke(&mut self, addr: u64, data: &[u8]) {
        let offset = self.offset(addr, data.len());
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn offset(&self, addr: u64, len: usize) -> usize {
        assert!(
            self.range.contains_span(addr, len),
            "access 0x{addr:x}+{len} outside memory {}",
            self.range
        );
        (addr - self.range.start) as usize
    }

    fn apply(&mut self, pkt: &mut Packet) {
        let offset = self.offset(pkt.addr, pkt.size);
        if pkt.is_write() {
            self.bytes[offset..offset + pkt.size].copy_from_slice(&pkt.data[..pkt.size]);
        } else if pkt.is_read() {
            pkt.data.resize(pkt.size, 0);
            pkt.data.copy_from_slice(&self.bytes[offset..offset + pkt.size]);
        }
    }

    pub fn recv_timing_req<S: Scheduler<SimEvent> + ?Sized>(
        &mut self,
        mut pkt: Packet,
        sched: &mut S,
    ) -> Result<(), Packet> {
        if self.refuse_next > 0 {
            self.refuse_next -= 1;
            self.need_retry = true;
            trace!(addr = format_args!("{:#x}", pkt.addr), "memory refusing on request");
            sched.schedule(sched.now() + 1, SimEvent::MemRetry);
            return Err(pkt);
        }
        if pkt.needs_response() && self.in_flight.len() >= self.max_outstanding {
            self.need_retry = true;
            return Err(pkt);
        }

        self.received.push((sched.now(), pkt.clone()));
        self.apply(&mut pkt);
        if pkt.needs_response() {
            pkt.make_response();
            self.in_flight.push_back(pkt);
            sched.schedule(sched.now() + self.latency, SimEvent::MemRespond);
        }
        Ok(())
    }

    /// Oldest response, now due. Schedules the retry owed to a refused sender.
    pub fn take_response<S: Scheduler<SimEvent> + ?Sized>(&mut self, sched: &mut S) -> Packet {
        let Some(pkt) = self.in_flight.pop_front() else {
            panic!("memory response event with nothing in flight");
        };
        if self.need_retry {
            sched.schedule(sched.now(), SimEvent::MemRetry);
        }
        pkt
    }

    /// Consume the owed retry, if there still is one.
    pub fn take_retry(&mut self) -> bool {
        std::mem::take(&mut self.need_retry)
    }

    pub fn functional(&mut self, pkt: &mut Packet) {
        self.apply(pkt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventQueue;
    use crate::packet::MemCmd;

    #[test]
    fn answers_after_latency_and_limits_in_flight() {
        let mut mem = SimpleMemory::new(AddrRange::new(0, 0x1000), 10);
        let mut q = EventQueue::new();
        mem.poke(0x40, &[1, 2, 3, 4]);

        mem.recv_timing_req(Packet::read(1, 0x40, 4), &mut q).unwrap();
        assert!(mem.recv_timing_req(Packet::read(2, 0x80, 4), &mut q).is_err());
        // Write-backs bypass the in-flight limit.
        mem.recv_timing_req(Packet::writeback(0x100, vec![7; 8]), &mut q)
            .unwrap();
        assert_eq!(mem.peek(0x100, 8), &[7; 8]);

        assert_eq!(q.pop(), Some((10, SimEvent::MemRespond)));
        let resp = mem.take_response(&mut q);
        assert_eq!(resp.cmd, MemCmd::ReadResp);
        assert_eq!(resp.data, vec![1, 2, 3, 4]);
        assert_eq!(q.pop(), Some((10, SimEvent::MemRetry)));
        assert!(mem.take_retry());
        assert!(!mem.take_retry());
    }

    #[test]
    fn forced_refusal_schedules_retry() {
        let mut mem = SimpleMemory::new(AddrRange::new(0, 0x100), 1);
        let mut q = EventQueue::new();
        mem.refuse_next(1);
        assert!(mem.recv_timing_req(Packet::read(1, 0x0, 8), &mut q).is_err());
        assert_eq!(q.pop(), Some((1, SimEvent::MemRetry)));
        assert!(mem.take_retry());
        assert!(mem.received().is_empty());
    }

    #[test]
    fn functional_reads_and_writes_backing_store() {
        let mut mem = SimpleMemory::new(AddrRange::new(0x1000, 0x2000), 1);
        let mut wr = Packet::write(1, 0x1010, vec![5, 6]);
        mem.functional(&mut wr);
        let mut rd = Packet::read(2, 0x100f, 4);
        mem.functional(&mut rd);
        assert_eq!(rd.data, vec![0, 5, 6, 0]);
    }

    #[test]
    #[should_panic(expected = "outside memory")]
    fn out_of_range_access_panics() {
        let mut mem = SimpleMemory::new(AddrRange::new(0, 0x100), 1);
        mem.functional(&mut Packet::read(1, 0xfc, 8));
    }
}

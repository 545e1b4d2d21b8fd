//! Blocking cache controller.
//!
//! The cache services one request at a time. A request accepted on any
//! CPU-side port closes the gate until its response has been sent; requests
//! arriving meanwhile are refused and their ports are offered a retry, in port
//! order, once the gate reopens.

use tracing::{debug, trace};

use crate::access::AccessEngine;
use crate::config::{CacheConfig, Clock};
use crate::error::Result;
use crate::event::{EventId, Scheduler};
use crate::packet::{MemCmd, Packet};
use crate::port::{CpuSidePort, MemSidePort, PortBindings, PortRef};
use crate::stats::CacheStats;
use crate::store::BlockStore;
use crate::types::{AddrRange, PortId, Tick};

/// Events the cache schedules for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// The access latency of the request in service has elapsed.
    AccessTiming,
}

/// Everything a cache needs from its surroundings: its peers and a scheduler.
pub trait CacheContext: PortBindings + Scheduler<CacheEvent> {}

impl<T: PortBindings + Scheduler<CacheEvent> + ?Sized> CacheContext for T {}

#[derive(Debug)]
enum State {
    Idle,
    TimingPending {
        port: PortId,
        pkt: Packet,
        event: EventId,
    },
    WaitingDownstream {
        port: PortId,
        /// The partial access a block-sized fetch was built for.
        original: Option<Packet>,
        miss_time: Tick,
    },
}

/// Observable phase of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    TimingPending,
    WaitingDownstream,
}

pub struct SimpleCache {
    name: String,
    latency: u64,
    clock: Clock,
    engine: AccessEngine,
    cpu_ports: Vec<CpuSidePort>,
    mem_port: MemSidePort,
    state: State,
    stats: CacheStats,
}

impl SimpleCache {
    pub fn new(name: impl Into<String>, config: &CacheConfig, clock: Clock) -> Result<Self> {
        config.validate()?;
        Ok(SimpleCache {
            name: name.into(),
            latency: config.latency,
            clock,
            engine: AccessEngine::new(config.capacity(), config.block_size, config.seed),
            cpu_ports: (0..config.cpu_ports).map(CpuSidePort::new).collect(),
            mem_port: MemSidePort::new(),
            state: State::Idle,
            stats: CacheStats::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block_size(&self) -> usize {
        self.engine.block_size()
    }

    pub fn num_cpu_ports(&self) -> usize {
        self.cpu_ports.len()
    }

    pub fn store(&self) -> &BlockStore {
        self.engine.store()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Idle => Phase::Idle,
            State::TimingPending { .. } => Phase::TimingPending,
            State::WaitingDownstream { .. } => Phase::WaitingDownstream,
        }
    }

    pub fn is_blocked(&self) -> bool {
        !matches!(self.state, State::Idle)
    }

    /// Port currently being serviced, if any.
    pub fn waiting_port(&self) -> Option<PortId> {
        match self.state {
            State::Idle => None,
            State::TimingPending { port, .. } | State::WaitingDownstream { port, .. } => {
                Some(port)
            }
        }
    }

    /// Handle of the scheduled access event, while one is pending.
    pub fn pending_event(&self) -> Option<EventId> {
        match self.state {
            State::TimingPending { event, .. } => Some(event),
            _ => None,
        }
    }

    pub fn cpu_port(&self, port: PortId) -> &CpuSidePort {
        &self.cpu_ports[port]
    }

    pub fn mem_port(&self) -> &MemSidePort {
        &self.mem_port
    }

    /// Look up a port by interface name (`cpu_side[i]` or `mem_side`).
    pub fn port(&self, if_name: &str, idx: Option<usize>) -> Result<PortRef> {
        PortRef::resolve(if_name, idx, self.cpu_ports.len())
    }

    /// Timing request arriving on a CPU-side port. `Err` hands the packet back
    /// when the cache is busy; the port is then owed a retry.
    pub fn recv_timing_req<C: CacheContext + ?Sized>(
        &mut self,
        port: PortId,
        pkt: Packet,
        ctx: &mut C,
    ) -> std::result::Result<(), Packet> {
        assert!(
            port < self.cpu_ports.len(),
            "{}: request on cpu_side[{port}], which does not exist",
            self.name
        );
        if self.is_blocked() {
            trace!(port, addr = format_args!("{:#x}", pkt.addr), "busy, refusing request");
            self.cpu_ports[port].refuse();
            return Err(pkt);
        }
        debug!(port, addr = format_args!("{:#x}", pkt.addr), "got request");
        let when = self.clock.clock_edge(ctx.now(), self.latency);
        let event = ctx.schedule(when, CacheEvent::AccessTiming);
        self.state = State::TimingPending { port, pkt, event };
        Ok(())
    }

    /// Run a previously scheduled event.
    pub fn process<C: CacheContext + ?Sized>(
        &mut self,
        event: CacheEvent,
        ctx: &mut C,
    ) -> Result<()> {
        match event {
            CacheEvent::AccessTiming => {
                let State::TimingPending { port, pkt, .. } =
                    std::mem::replace(&mut self.state, State::Idle)
                else {
                    panic!("{}: access event with no request pending", self.name);
                };
                self.access_timing(port, pkt, ctx)
            }
        }
    }

    fn access_timing<C: CacheContext + ?Sized>(
        &mut self,
        port: PortId,
        mut pkt: Packet,
        ctx: &mut C,
    ) -> Result<()> {
        if self.engine.access_functional(&mut pkt)? {
            self.stats.hits += 1;
            pkt.make_response();
            self.send_response(port, pkt, ctx);
            return Ok(());
        }

        self.stats.misses += 1;
        let miss_time = ctx.now();
        let block_size = self.block_size();

        if pkt.is_whole_block(block_size) {
            debug!(addr = format_args!("{:#x}", pkt.addr), "miss, forwarding packet");
            self.state = State::WaitingDownstream {
                port,
                original: None,
                miss_time,
            };
            self.mem_port.send_packet(pkt, ctx);
        } else {
            // Bounds and command were checked by the functional access.
            assert!(pkt.needs_response(), "upgraded access must need a response");
            let block_addr = pkt.block_addr(block_size);
            debug!(
                addr = format_args!("{:#x}", pkt.addr),
                block = format_args!("{:#x}", block_addr),
                "miss, upgrading packet to block size"
            );
            let fetch = Packet::new(pkt.req_id, block_addr, block_size, MemCmd::ReadReq);
            self.state = State::WaitingDownstream {
                port,
                original: Some(pkt),
                miss_time,
            };
            self.mem_port.send_packet(fetch, ctx);
        }
        Ok(())
    }

    /// Response from memory for the miss in service.
    pub fn recv_timing_resp<C: CacheContext + ?Sized>(
        &mut self,
        pkt: Packet,
        ctx: &mut C,
    ) -> Result<()> {
        let State::WaitingDownstream {
            port,
            original,
            miss_time,
        } = std::mem::replace(&mut self.state, State::Idle)
        else {
            panic!("{}: response with no miss outstanding", self.name);
        };
        debug!(addr = format_args!("{:#x}", pkt.addr), "got response");

        if let Some(writeback) = self.engine.insert(&pkt) {
            debug!(addr = format_args!("{:#x}", writeback.addr), "writing back evicted block");
            self.mem_port.send_packet(writeback, ctx);
        }
        self.stats.miss_latency.sample(ctx.now() - miss_time);

        let response = match original {
            Some(mut original) => {
                let hit = self.engine.access_functional(&mut original)?;
                debug_assert!(hit, "block was just filled");
                original.make_response();
                original
            }
            None => pkt,
        };
        self.send_response(port, response, ctx);
        Ok(())
    }

    fn send_response<C: CacheContext + ?Sized>(&mut self, port: PortId, pkt: Packet, ctx: &mut C) {
        self.state = State::Idle;
        self.cpu_ports[port].send_packet(pkt, ctx);
        for cpu_port in &mut self.cpu_ports {
            cpu_port.try_send_retry(ctx);
        }
    }

    /// The requestor on `port` can now take the response it refused.
    pub fn recv_resp_retry<C: CacheContext + ?Sized>(&mut self, port: PortId, ctx: &mut C) {
        self.cpu_ports[port].recv_resp_retry(ctx);
        // A port whose retry was held back behind its parked response gets it now.
        self.cpu_ports[port].try_send_retry(ctx);
    }

    /// Memory can now take the request it refused.
    pub fn recv_req_retry<C: CacheContext + ?Sized>(&mut self, ctx: &mut C) {
        self.mem_port.recv_req_retry(ctx);
    }

    /// Untimed access; bypasses the cache contents.
    pub fn recv_functional<C: CacheContext + ?Sized>(&mut self, pkt: &mut Packet, ctx: &mut C) {
        ctx.send_functional(pkt);
    }

    pub fn addr_ranges<C: CacheContext + ?Sized>(&self, ctx: &C) -> Vec<AddrRange> {
        debug!(cache = %self.name, "sending new ranges");
        ctx.mem_addr_ranges()
    }

    /// Memory's ranges changed; tell every requestor.
    pub fn recv_range_change<C: CacheContext + ?Sized>(&mut self, ctx: &mut C) {
        for port in &self.cpu_ports {
            ctx.send_range_change(port.id());
        }
    }
}

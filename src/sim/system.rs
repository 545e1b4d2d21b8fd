use tracing::{info, warn};

use crate::cache::{CacheEvent, SimpleCache};
use crate::error::{CacheError, Result};
use crate::event::{EventId, EventQueue, Scheduler};
use crate::memory_access::TraceRecord;
use crate::packet::Packet;
use crate::port::PortBindings;
use crate::sim::{SimEvent, SimpleMemory, TraceRequestor};
use crate::types::{AddrRange, PortId, Tick};

/// A cache wired to a memory and one requestor per CPU-side port.
pub struct System {
    queue: EventQueue<SimEvent>,
    cache: SimpleCache,
    memory: SimpleMemory,
    requestors: Vec<TraceRequestor>,
    next_req_id: u64,
}

/// The cache's peers, borrowed for the duration of one event.
struct Wiring<'a> {
    queue: &'a mut EventQueue<SimEvent>,
    memory: &'a mut SimpleMemory,
    requestors: &'a mut [TraceRequestor],
}

impl PortBindings for Wiring<'_> {
    fn send_timing_resp(&mut self, port: PortId, pkt: Packet) -> std::result::Result<(), Packet> {
        self.requestors[port].recv_timing_resp(pkt, self.queue)
    }

    fn send_retry_req(&mut self, port: PortId) {
        self.requestors[port].recv_req_retry(self.queue);
    }

    fn send_range_change(&mut self, port: PortId) {
        self.requestors[port].recv_range_change();
    }

    fn send_timing_req(&mut self, pkt: Packet) -> std::result::Result<(), Packet> {
        self.memory.recv_timing_req(pkt, self.queue)
    }

    fn send_functional(&mut self, pkt: &mut Packet) {
        self.memory.functional(pkt);
    }

    fn mem_addr_ranges(&self) -> Vec<AddrRange> {
        vec![self.memory.range()]
    }
}

impl Scheduler<CacheEvent> for Wiring<'_> {
    fn now(&self) -> Tick {
        self.queue.now()
    }

    fn schedule(&mut self, when: Tick, event: CacheEvent) -> EventId {
        self.queue.schedule(when, SimEvent::Cache(event))
    }

    fn deschedule(&mut self, id: EventId) -> bool {
        self.queue.deschedule(id)
    }
}

impl System {
    /// Wire `cache` to `memory`, with one requestor per CPU-side port.
    pub fn new(cache: SimpleCache, memory: SimpleMemory, think: Tick) -> Self {
        let requestors = (0..cache.num_cpu_ports())
            .map(|port| TraceRequestor::new(port, think))
            .collect();
        System {
            queue: EventQueue::new(),
            cache,
            memory,
            requestors,
            next_req_id: 1,
        }
    }

    pub fn now(&self) -> Tick {
        self.queue.now()
    }

    pub fn cache(&self) -> &SimpleCache {
        &self.cache
    }

    pub fn memory(&self) -> &SimpleMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut SimpleMemory {
        &mut self.memory
    }

    pub fn requestor(&self, port: PortId) -> &TraceRequestor {
        &self.requestors[port]
    }

    pub fn requestor_mut(&mut self, port: PortId) -> &mut TraceRequestor {
        &mut self.requestors[port]
    }

    /// Queue a request on a CPU-side port. Returns the request id.
    pub fn enqueue(&mut self, port: PortId, mut pkt: Packet) -> Result<u64> {
        if port >= self.requestors.len() {
            return Err(CacheError::UnknownPort {
                name: "cpu_side".into(),
                idx: Some(port),
            });
        }
        if !self.memory.range().contains_span(pkt.addr, pkt.size) {
            return Err(CacheError::InvalidConfig(format!(
                "access 0x{:x}+{} is outside memory {}",
                pkt.addr,
                pkt.size,
                self.memory.range()
            )));
        }
        let id = self.next_req_id;
        self.next_req_id += 1;
        pkt.req_id = id;
        self.requestors[port].push(pkt);
        Ok(id)
    }

    /// Queue every trace record on the port it names.
    pub fn load_trace(&mut self, records: &[TraceRecord]) -> Result<()> {
        for record in records {
            self.enqueue(record.cpu, record.to_packet(0))?;
        }
        Ok(())
    }

    /// Run until no events remain. Stops at the first fatal error.
    pub fn run(&mut self) -> Result<()> {
        self.start();
        while self.step()? {}
        for requestor in &self.requestors {
            if !requestor.is_done() {
                warn!(port = requestor.port(), "requestor finished with work left");
            }
        }
        info!(tick = self.now(), "simulation finished");
        Ok(())
    }

    /// Run events up to and including `until`.
    pub fn run_until(&mut self, until: Tick) -> Result<()> {
        self.start();
        while self.queue.peek_time().is_some_and(|t| t <= until) {
            self.step()?;
        }
        Ok(())
    }

    fn start(&mut self) {
        for port in 0..self.requestors.len() {
            if self.requestors[port].has_pending() && !self.issue_scheduled(port) {
                let now = self.queue.now();
                self.queue.schedule(now, SimEvent::Issue(port));
            }
        }
    }

    fn issue_scheduled(&self, port: PortId) -> bool {
        self.queue.contains(&SimEvent::Issue(port))
    }

    /// Dispatch one event. Returns false once the queue is empty.
    pub fn step(&mut self) -> Result<bool> {
        let Some((_, event)) = self.queue.pop() else {
            return Ok(false);
        };
        let mut wiring = Wiring {
            queue: &mut self.queue,
            memory: &mut self.memory,
            requestors: &mut self.requestors,
        };
        match event {
            SimEvent::Cache(ev) => self.cache.process(ev, &mut wiring)?,
            SimEvent::Issue(port) => {
                if let Some(pkt) = wiring.requestors[port].next_request() {
                    let req_id = pkt.req_id;
                    match self.cache.recv_timing_req(port, pkt, &mut wiring) {
                        Ok(()) => wiring.requestors[port].accepted(req_id),
                        Err(pkt) => wiring.requestors[port].refused_request(pkt),
                    }
                }
            }
            SimEvent::MemRespond => {
                let pkt = wiring.memory.take_response(wiring.queue);
                self.cache.recv_timing_resp(pkt, &mut wiring)?;
            }
            SimEvent::MemRetry => {
                if wiring.memory.take_retry() {
                    self.cache.recv_req_retry(&mut wiring);
                }
            }
            SimEvent::RespRetry(port) => self.cache.recv_resp_retry(port, &mut wiring),
        }
        Ok(true)
    }

    /// Untimed access through the cache to memory.
    pub fn functional(&mut self, pkt: &mut Packet) {
        let mut wiring = Wiring {
            queue: &mut self.queue,
            memory: &mut self.memory,
            requestors: &mut self.requestors,
        };
        self.cache.recv_functional(pkt, &mut wiring);
    }

    /// Ranges the cache advertises upstream.
    pub fn addr_ranges(&mut self) -> Vec<AddrRange> {
        let wiring = Wiring {
            queue: &mut self.queue,
            memory: &mut self.memory,
            requestors: &mut self.requestors,
        };
        self.cache.addr_ranges(&wiring)
    }

    /// Memory changed its ranges; propagate through the cache.
    pub fn memory_range_changed(&mut self) {
        let mut wiring = Wiring {
            queue: &mut self.queue,
            memory: &mut self.memory,
            requestors: &mut self.requestors,
        };
        self.cache.recv_range_change(&mut wiring);
    }
}

use std::collections::VecDeque;

use tracing::trace;

use crate::event::Scheduler;
use crate::packet::Packet;
use crate::sim::SimEvent;
use crate::types::{PortId, Tick};

/// Upstream issuer bound to one CPU-side port.
///
/// Sends queued requests one at a time and waits for each response before
/// issuing the next, `think` ticks later. A refused request is held until
/// the cache sends a retry.
#[derive(Debug)]
pub struct TraceRequestor {
    port: PortId,
    think: Tick,
    pending: VecDeque<Packet>,
    outstanding: Option<u64>,
    waiting_retry: bool,
    refuse_resps: usize,
    responses: Vec<(Tick, Packet)>,
    retries: usize,
    refused: usize,
    range_changes: usize,
}

impl TraceRequestor {
    pub fn new(port: PortId, think: Tick) -> Self {
        TraceRequestor {
            port,
            think,
            pending: VecDeque::new(),
            outstanding: None,
            waiting_retry: false,
            refuse_resps: 0,
            responses: Vec::new(),
            retries: 0,
            refused: 0,
            range_changes: 0,
        }
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    pub fn push(&mut self, pkt: Packet) {
        self.pending.push_back(pkt);
    }

    /// Refuse the next `n` responses; each is retried one tick later.
    pub fn refuse_responses(&mut self, n: usize) {
        self.refuse_resps = n;
    }

    pub fn responses(&self) -> &[(Tick, Packet)] {
        &self.responses
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    pub fn refused(&self) -> usize {
        self.refused
    }

    pub fn range_changes(&self) -> usize {
        self.range_changes
    }

    /// Id of the accepted request still awaiting its response.
    pub fn outstanding(&self) -> Option<u64> {
        self.outstanding
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty() && self.outstanding.is_none()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Next request to send, unless one is outstanding or a retry is awaited.
    pub fn next_request(&mut self) -> Option<Packet> {
        if self.outstanding.is_some() || self.waiting_retry {
            return None;
        }
        self.pending.pop_front()
    }

    pub fn accepted(&mut self, req_id: u64) {
        self.outstanding = Some(req_id);
    }

    pub fn refused_request(&mut self, pkt: Packet) {
        trace!(port = self.port, req = pkt.req_id, "request refused, waiting for retry");
        self.refused += 1;
        self.waiting_retry = true;
        self.pending.push_front(pkt);
    }

    pub fn recv_req_retry<S: Scheduler<SimEvent> + ?Sized>(&mut self, sched: &mut S) {
        assert!(
            self.waiting_retry,
            "requestor {} got a retry it was not waiting for",
            self.port
        );
        self.waiting_retry = false;
        self.retries += 1;
        sched.schedule(sched.now(), SimEvent::Issue(self.port));
    }

    pub fn recv_timing_resp<S: Scheduler<SimEvent> + ?Sized>(
        &mut self,
        pkt: Packet,
        sched: &mut S,
    ) -> Result<(), Packet> {
        if self.refuse_resps > 0 {
            self.refuse_resps -= 1;
            sched.schedule(sched.now() + 1, SimEvent::RespRetry(self.port));
            return Err(pkt);
        }
        assert_eq!(
            self.outstanding,
            Some(pkt.req_id),
            "requestor {} got a response it did not ask for",
            self.port
        );
        self.outstanding = None;
        self.responses.push((sched.now(), pkt));
        if !self.pending.is_empty() {
            sched.schedule(sched.now() + self.think, SimEvent::Issue(self.port));
        }
        Ok(())
    }

    pub fn recv_range_change(&mut self) {
        self.range_changes += 1;
    }
}

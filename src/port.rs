//! Flow-controlled port protocol shared by every component.
//!
//! A send either succeeds (the peer owns the packet) or is refused, in which
//! case the packet comes back and the sender parks it until the peer signals a
//! retry. A port never sends past a parked packet: a CPU-side port holds at
//! most one, and the memory-side port queues later packets behind it.

use std::collections::VecDeque;

use tracing::trace;

use crate::error::{CacheError, Result};
use crate::packet::Packet;
use crate::types::{AddrRange, PortId};

/// A component's view of the peers bound to its ports.
///
/// CPU-side methods address one upstream connection by index; memory-side
/// methods go to the single downstream connection. `Err(pkt)` from a timing
/// send means the peer is busy and hands the packet back.
pub trait PortBindings {
    fn send_timing_resp(&mut self, port: PortId, pkt: Packet) -> std::result::Result<(), Packet>;

    /// Tell a refused requestor it may resend.
    fn send_retry_req(&mut self, port: PortId);

    fn send_range_change(&mut self, port: PortId);

    fn send_timing_req(&mut self, pkt: Packet) -> std::result::Result<(), Packet>;

    /// Untimed access straight through to the backing store. Always succeeds.
    fn send_functional(&mut self, pkt: &mut Packet);

    fn mem_addr_ranges(&self) -> Vec<AddrRange>;
}

/// Names one of a component's ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRef {
    CpuSide(PortId),
    MemSide,
}

impl PortRef {
    pub const CPU_SIDE: &'static str = "cpu_side";
    pub const MEM_SIDE: &'static str = "mem_side";

    /// Look up a port by interface name. `cpu_side` is a vector port and needs
    /// an index below `cpu_ports`; `mem_side` takes none.
    pub fn resolve(if_name: &str, idx: Option<usize>, cpu_ports: usize) -> Result<PortRef> {
        match (if_name, idx) {
            (Self::MEM_SIDE, None) => Ok(PortRef::MemSide),
            (Self::CPU_SIDE, Some(i)) if i < cpu_ports => Ok(PortRef::CpuSide(i)),
            _ => Err(CacheError::UnknownPort {
                name: if_name.to_string(),
                idx,
            }),
        }
    }
}

/// Upstream-facing port: receives requests, sends responses.
#[derive(Debug)]
pub struct CpuSidePort {
    id: PortId,
    need_retry: bool,
    blocked_packet: Option<Packet>,
}

impl CpuSidePort {
    pub fn new(id: PortId) -> Self {
        CpuSidePort {
            id,
            need_retry: false,
            blocked_packet: None,
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn needs_retry(&self) -> bool {
        self.need_retry
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_packet.is_some()
    }

    /// A request from this port was refused; it is owed a retry.
    pub fn refuse(&mut self) {
        self.need_retry = true;
    }

    pub fn send_packet<B: PortBindings + ?Sized>(&mut self, pkt: Packet, peers: &mut B) {
        assert!(
            self.blocked_packet.is_none(),
            "cpu_side[{}] should never try to send if blocked",
            self.id
        );
        if let Err(pkt) = peers.send_timing_resp(self.id, pkt) {
            trace!(port = self.id, "response refused, holding");
            self.blocked_packet = Some(pkt);
        }
    }

    /// The requestor can take the parked response now.
    pub fn recv_resp_retry<B: PortBindings + ?Sized>(&mut self, peers: &mut B) {
        let Some(pkt) = self.blocked_packet.take() else {
            panic!("cpu_side[{}] got a response retry with nothing blocked", self.id);
        };
        self.send_packet(pkt, peers);
    }

    /// Send the owed retry, unless a response is still parked on this path.
    pub fn try_send_retry<B: PortBindings + ?Sized>(&mut self, peers: &mut B) {
        if self.need_retry && self.blocked_packet.is_none() {
            self.need_retry = false;
            trace!(port = self.id, "sending retry req");
            peers.send_retry_req(self.id);
        }
    }
}

/// Downstream-facing port: sends requests, receives responses.
///
/// Write-backs are fire-and-forget, so a fetch can follow a write-back the
/// memory refused. Packets queue behind the refused one and leave in order
/// once the memory sends a retry.
#[derive(Debug, Default)]
pub struct MemSidePort {
    queue: VecDeque<Packet>,
}

impl MemSidePort {
    pub fn new() -> Self {
        MemSidePort::default()
    }

    pub fn is_blocked(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Packets waiting for the memory to accept them.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn send_packet<B: PortBindings + ?Sized>(&mut self, pkt: Packet, peers: &mut B) {
        if self.is_blocked() {
            trace!(queued = self.queue.len(), "mem_side blocked, queueing request");
            self.queue.push_back(pkt);
            return;
        }
        if let Err(pkt) = peers.send_timing_req(pkt) {
            trace!("request refused by memory, holding");
            self.queue.push_back(pkt);
        }
    }

    /// Resend queued packets in order until the memory refuses one.
    pub fn recv_req_retry<B: PortBindings + ?Sized>(&mut self, peers: &mut B) {
        assert!(
            self.is_blocked(),
            "mem_side got a request retry with nothing blocked"
        );
        while let Some(pkt) = self.queue.pop_front() {
            if let Err(pkt) = peers.send_timing_req(pkt) {
                trace!(queued = self.queue.len() + 1, "request refused again, holding");
                self.queue.push_front(pkt);
                break;
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingPeers;
    use super::*;
    use crate::packet::MemCmd;

    #[test]
    fn refused_response_is_resent_on_retry() {
        let mut peers = RecordingPeers {
            refuse_resps: 1,
            ..Default::default()
        };
        let mut port = CpuSidePort::new(2);
        port.send_packet(Packet::read(1, 0x0, 8), &mut peers);
        assert!(port.is_blocked());
        assert!(peers.resps.is_empty());

        port.recv_resp_retry(&mut peers);
        assert!(!port.is_blocked());
        assert_eq!(peers.resps.len(), 1);
        assert_eq!(peers.resps[0].0, 2);
        assert_eq!(peers.resps[0].1.req_id, 1);
    }

    #[test]
    fn retry_is_owed_once_and_held_while_blocked() {
        let mut peers = RecordingPeers {
            refuse_resps: 1,
            ..Default::default()
        };
        let mut port = CpuSidePort::new(0);
        port.try_send_retry(&mut peers);
        assert!(peers.retries.is_empty());

        port.refuse();
        port.send_packet(Packet::read(1, 0x0, 8), &mut peers);
        port.try_send_retry(&mut peers);
        assert!(peers.retries.is_empty(), "no retry while a response is parked");

        port.recv_resp_retry(&mut peers);
        port.try_send_retry(&mut peers);
        port.try_send_retry(&mut peers);
        assert_eq!(peers.retries, vec![0]);
        assert!(!port.needs_retry());
    }

    #[test]
    fn mem_side_parks_refused_request() {
        let mut peers = RecordingPeers {
            refuse_reqs: 2,
            ..Default::default()
        };
        let mut port = MemSidePort::new();
        port.send_packet(Packet::read(4, 0x40, 64), &mut peers);
        assert!(port.is_blocked());
        port.recv_req_retry(&mut peers);
        assert!(port.is_blocked());
        port.recv_req_retry(&mut peers);
        assert!(!port.is_blocked());
        assert_eq!(peers.reqs.len(), 1);
        assert_eq!(peers.reqs[0].req_id, 4);
    }

    #[test]
    fn mem_side_queues_behind_refused_writeback() {
        let mut peers = RecordingPeers {
            refuse_reqs: 1,
            ..Default::default()
        };
        let mut port = MemSidePort::new();
        port.send_packet(Packet::writeback(0x0, vec![1; 64]), &mut peers);
        port.send_packet(Packet::read(2, 0x40, 64), &mut peers);
        assert_eq!(port.queued(), 2);
        assert!(peers.reqs.is_empty());

        port.recv_req_retry(&mut peers);
        assert!(!port.is_blocked());
        let order: Vec<_> = peers.reqs.iter().map(|p| (p.cmd, p.addr)).collect();
        assert_eq!(
            order,
            vec![(MemCmd::WritebackDirty, 0x0), (MemCmd::ReadReq, 0x40)]
        );
    }

    #[test]
    fn mem_side_drain_stops_at_next_refusal() {
        let mut peers = RecordingPeers {
            refuse_reqs: 1,
            ..Default::default()
        };
        let mut port = MemSidePort::new();
        port.send_packet(Packet::writeback(0x0, vec![0; 64]), &mut peers);
        port.send_packet(Packet::read(2, 0x40, 64), &mut peers);
        peers.refuse_reqs = 1;
        port.recv_req_retry(&mut peers);
        assert_eq!(port.queued(), 2);
        port.recv_req_retry(&mut peers);
        assert_eq!(port.queued(), 0);
        assert_eq!(peers.reqs.len(), 2);
    }

    #[test]
    #[should_panic(expected = "never try to send if blocked")]
    fn double_send_while_blocked_panics() {
        let mut peers = RecordingPeers {
            refuse_resps: 1,
            ..Default::default()
        };
        let mut port = CpuSidePort::new(0);
        port.send_packet(Packet::read(1, 0x0, 8), &mut peers);
        port.send_packet(Packet::read(2, 0x8, 8), &mut peers);
    }

    #[test]
    #[should_panic(expected = "nothing blocked")]
    fn unrequested_retry_panics() {
        let mut peers = RecordingPeers::default();
        CpuSidePort::new(0).recv_resp_retry(&mut peers);
    }

    #[test]
    fn resolves_named_ports() {
        assert_eq!(
            PortRef::resolve("cpu_side", Some(1), 2).unwrap(),
            PortRef::CpuSide(1)
        );
        assert_eq!(
            PortRef::resolve("mem_side", None, 2).unwrap(),
            PortRef::MemSide
        );
        assert!(PortRef::resolve("cpu_side", Some(2), 2).is_err());
        assert!(PortRef::resolve("cpu_side", None, 2).is_err());
        assert!(PortRef::resolve("mem_side", Some(0), 2).is_err());
        assert!(PortRef::resolve("icache_port", None, 2).is_err());
    }
}

use tracing::debug;

use crate::error::{CacheError, Result};
use crate::packet::Packet;
use crate::port::{CpuSidePort, MemSidePort, PortBindings, PortRef};
use crate::types::{AddrRange, PortId};

/// Pass-through between an instruction port, a data port and memory. No
/// storage, no latency; one request in flight at a time.
pub struct SimpleMemobj {
    inst_port: CpuSidePort,
    data_port: CpuSidePort,
    mem_port: MemSidePort,
    waiting_port: Option<PortId>,
}

impl SimpleMemobj {
    pub const INST_PORT: PortId = 0;
    pub const DATA_PORT: PortId = 1;

    pub fn new() -> Self {
        SimpleMemobj {
            inst_port: CpuSidePort::new(Self::INST_PORT),
            data_port: CpuSidePort::new(Self::DATA_PORT),
            mem_port: MemSidePort::new(),
            waiting_port: None,
        }
    }

    /// `inst_port`, `data_port` or `mem_side`.
    pub fn port(&self, if_name: &str) -> Result<PortRef> {
        match if_name {
            "inst_port" => Ok(PortRef::CpuSide(Self::INST_PORT)),
            "data_port" => Ok(PortRef::CpuSide(Self::DATA_PORT)),
            PortRef::MEM_SIDE => Ok(PortRef::MemSide),
            _ => Err(CacheError::UnknownPort {
                name: if_name.to_string(),
                idx: None,
            }),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.waiting_port.is_some()
    }

    fn cpu_port(&mut self, port: PortId) -> &mut CpuSidePort {
        match port {
            Self::INST_PORT => &mut self.inst_port,
            Self::DATA_PORT => &mut self.data_port,
            _ => panic!("memobj has no cpu-side port {port}"),
        }
    }

    pub fn recv_timing_req<B: PortBindings + ?Sized>(
        &mut self,
        port: PortId,
        pkt: Packet,
        peers: &mut B,
    ) -> std::result::Result<(), Packet> {
        if self.is_blocked() {
            self.cpu_port(port).refuse();
            return Err(pkt);
        }
        debug!(port, addr = format_args!("{:#x}", pkt.addr), "forwarding request");
        if pkt.needs_response() {
            self.waiting_port = Some(port);
        }
        self.mem_port.send_packet(pkt, peers);
        Ok(())
    }

    pub fn recv_timing_resp<B: PortBindings + ?Sized>(&mut self, pkt: Packet, peers: &mut B) {
        let Some(port) = self.waiting_port.take() else {
            panic!("memobj got a response with no request outstanding");
        };
        self.cpu_port(port).send_packet(pkt, peers);
        self.inst_port.try_send_retry(peers);
        self.data_port.try_send_retry(peers);
    }

    pub fn recv_resp_retry<B: PortBindings + ?Sized>(&mut self, port: PortId, peers: &mut B) {
        let cpu_port = self.cpu_port(port);
        cpu_port.recv_resp_retry(peers);
        cpu_port.try_send_retry(peers);
    }

    pub fn recv_req_retry<B: PortBindings + ?Sized>(&mut self, peers: &mut B) {
        self.mem_port.recv_req_retry(peers);
    }

    pub fn recv_functional<B: PortBindings + ?Sized>(&mut self, pkt: &mut Packet, peers: &mut B) {
        peers.send_functional(pkt);
    }

    pub fn addr_ranges<B: PortBindings + ?Sized>(&self, peers: &B) -> Vec<AddrRange> {
        peers.mem_addr_ranges()
    }

    pub fn recv_range_change<B: PortBindings + ?Sized>(&mut self, peers: &mut B) {
        peers.send_range_change(Self::INST_PORT);
        peers.send_range_change(Self::DATA_PORT);
    }
}

impl Default for SimpleMemobj {
    fn default() -> Self {
        Self::new()
    }
}

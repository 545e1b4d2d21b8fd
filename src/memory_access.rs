use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::packet::Packet;
use crate::types::{Addr, PortId};

/// Default access size when a record does not give one.
pub const DEFAULT_ACCESS_SIZE: usize = 8;

/// One load or store from a trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub insn_count: u64,
    pub address: Addr,
    pub store: bool,
    pub size: usize,
    pub cpu: PortId,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: malformed record {text:?}")]
    InvalidFormat { line: usize, text: String },

    #[error("line {line}: access size must be non-zero")]
    ZeroSize { line: usize },
}

// <insn>,[-1,]<0xaddr>[,<size>][,cpu<N>]
static RECORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(\d+),(-1,)?(0x[0-9a-fA-F]+)(?:,(\d+))?(?:,cpu(\d+))?$"#)
        .expect("failed to compile regex")
});

fn parse_hex_addr(addr: &str) -> Option<Addr> {
    u64::from_str_radix(addr.trim_start_matches("0x"), 16).ok()
}

impl TraceRecord {
    fn parse_line(s: &str, line: usize) -> Result<Self, ParseError> {
        let malformed = || ParseError::InvalidFormat {
            line,
            text: s.to_string(),
        };
        let caps = RECORD_PATTERN.captures(s.trim()).ok_or_else(malformed)?;
        let size = match caps.get(4) {
            Some(m) => m.as_str().parse().map_err(|_| malformed())?,
            None => DEFAULT_ACCESS_SIZE,
        };
        if size == 0 {
            return Err(ParseError::ZeroSize { line });
        }
        Ok(TraceRecord {
            insn_count: caps[1].parse().map_err(|_| malformed())?,
            store: caps.get(2).is_some(),
            address: parse_hex_addr(&caps[3]).ok_or_else(malformed)?,
            size,
            cpu: match caps.get(5) {
                Some(m) => m.as_str().parse().map_err(|_| malformed())?,
                None => 0,
            },
        })
    }

    /// Request packet for this record. Stores write the low bytes of the
    /// instruction count, repeated.
    pub fn to_packet(&self, req_id: u64) -> Packet {
        if self.store {
            let pattern = self.insn_count.to_le_bytes();
            let data = (0..self.size).map(|i| pattern[i % pattern.len()]).collect();
            Packet::write(req_id, self.address, data)
        } else {
            Packet::read(req_id, self.address, self.size)
        }
    }
}

impl FromStr for TraceRecord {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_line(s, 0)
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.store {
            write!(f, "{},-1,0x{:016x}", self.insn_count, self.address)?;
        } else {
            write!(f, "{},0x{:016x}", self.insn_count, self.address)?;
        }
        write!(f, ",{},cpu{}", self.size, self.cpu)
    }
}

/// Read every record from a trace, skipping blank lines and `#` comments.
pub fn read_trace(reader: impl BufRead) -> crate::error::Result<Vec<TraceRecord>> {
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        records.push(TraceRecord::parse_line(text, i + 1)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::packet::MemCmd;

    #[test]
    fn parses_loads_and_stores() {
        let load: TraceRecord = "12,0x1000".parse().unwrap();
        assert_eq!(
            load,
            TraceRecord {
                insn_count: 12,
                address: 0x1000,
                store: false,
                size: DEFAULT_ACCESS_SIZE,
                cpu: 0,
            }
        );

        let store: TraceRecord = "13,-1,0x2004,4,cpu1".parse().unwrap();
        assert!(store.store);
        assert_eq!(store.size, 4);
        assert_eq!(store.cpu, 1);
        assert_eq!(store.to_string(), "13,-1,0x0000000000002004,4,cpu1");
    }

    #[test]
    fn store_packets_carry_data() {
        let rec: TraceRecord = "258,-1,0x40,4".parse().unwrap();
        let pkt = rec.to_packet(9);
        assert_eq!(pkt.cmd, MemCmd::WriteReq);
        assert_eq!(pkt.data, vec![2, 1, 0, 0]);
        assert_eq!(pkt.req_id, 9);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!("12".parse::<TraceRecord>().is_err());
        assert!("12,1000".parse::<TraceRecord>().is_err());
        assert!("12,0x10,0x20,0x30".parse::<TraceRecord>().is_err());
        assert_eq!(
            "1,0x10,0".parse::<TraceRecord>(),
            Err(ParseError::ZeroSize { line: 0 })
        );
    }

    #[test]
    fn trace_reader_reports_line_numbers() {
        let text = "# header\n1,0x0\n\n2,-1,0x8\nbogus\n";
        let err = read_trace(text.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            CacheError::Parse(ParseError::InvalidFormat { line: 5, .. })
        ));

        let records = read_trace("1,0x0\n2,-1,0x8,2\n".as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[1].store);
    }
}

//! TCP/UDP session model and assembly.
//!
//! A session groups the packets exchanged over one (local port, remote IP,
//! remote port) tuple, carries the two reassembled byte streams, and owns
//! the HTTP messages parsed out of them. Assembly is a single pass over
//! the filtered packet list followed by per-session role-analysis passes.

pub mod assembler;
pub mod reassembler;

pub use assembler::assemble_sessions;
pub use reassembler::Reassembler;

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::IpAddr;

use serde::Serialize;

use crate::http::HttpRequestResponseInfo;
use crate::trace::{Direction, PacketRecord};

/// Identity of a session: direction-normalized endpoint tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionKey {
    pub local_port: u16,
    pub remote_ip: IpAddr,
    pub remote_port: u16,
}

/// Contiguous run of reassembled bytes contributed by one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PacketRange {
    pub offset: usize,
    pub len: usize,
    pub packet_id: usize,
}

/// One direction's reassembled byte stream.
#[derive(Debug, Clone, Default)]
pub struct StreamBuffer {
    pub storage: Vec<u8>,
    /// byte offset in `storage` -> index of the contributing packet in the
    /// filtered packet list.
    pub packet_offsets: BTreeMap<usize, usize>,
    pub ranges: Vec<PacketRange>,
}

impl StreamBuffer {
    pub fn clear(&mut self) {
        self.storage.clear();
        self.packet_offsets.clear();
        self.ranges.clear();
    }

    /// Packet (by filtered-list index) contributing the byte at `offset`,
    /// resolved through the offset map and per-packet payload lengths.
    pub fn packet_at(&self, offset: usize, packets: &[PacketRecord]) -> Option<usize> {
        for (&start, &index) in &self.packet_offsets {
            let len = packets.get(index).map(|p| p.payload_len()).unwrap_or(0);
            if offset >= start && offset < start + len {
                return Some(index);
            }
        }
        None
    }
}

/// How and when a session was torn down.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Termination {
    /// Index (into the filtered packet list) of the FIN/RST packet.
    pub packet_index: usize,
    /// Seconds between the preceding packet and the terminating one.
    pub delay: f64,
}

/// One reassembled TCP or UDP session.
#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    /// Indices into the filtered packet list, in chronological order.
    pub packet_indices: Vec<usize>,
    pub app_names: BTreeSet<String>,
    pub remote_host_name: Option<String>,
    /// Host that initiated the session: the first HTTP request's referrer
    /// host, the request host, or the remote address as a fallback.
    pub domain_name: Option<String>,
    pub dns_request: Option<usize>,
    pub dns_response: Option<usize>,
    pub last_ssl_handshake: Option<usize>,
    pub udp_only: bool,
    pub ssl: bool,
    pub bytes_transferred: u64,
    pub file_download_count: usize,
    pub termination: Option<Termination>,
    pub uplink: StreamBuffer,
    pub downlink: StreamBuffer,
    /// HTTP messages parsed from both streams, time-ordered.
    pub messages: Vec<HttpRequestResponseInfo>,
}

impl Session {
    pub fn new(key: SessionKey) -> Self {
        Self {
            key,
            packet_indices: Vec::new(),
            app_names: BTreeSet::new(),
            remote_host_name: None,
            domain_name: None,
            dns_request: None,
            dns_response: None,
            last_ssl_handshake: None,
            udp_only: false,
            ssl: false,
            bytes_transferred: 0,
            file_download_count: 0,
            termination: None,
            uplink: StreamBuffer::default(),
            downlink: StreamBuffer::default(),
            messages: Vec::new(),
        }
    }

    pub fn buffer(&self, direction: Direction) -> &StreamBuffer {
        match direction {
            Direction::Downlink => &self.downlink,
            _ => &self.uplink,
        }
    }

    pub fn start_time(&self, packets: &[PacketRecord]) -> f64 {
        self.packet_indices
            .first()
            .and_then(|&i| packets.get(i))
            .map(|p| p.timestamp)
            .unwrap_or(0.0)
    }

    pub fn end_time(&self, packets: &[PacketRecord]) -> f64 {
        self.packet_indices
            .last()
            .and_then(|&i| packets.get(i))
            .map(|p| p.timestamp)
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn buffer_selection_defaults_to_uplink() {
        let key = SessionKey {
            local_port: 1,
            remote_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            remote_port: 2,
        };
        let mut session = Session::new(key);
        session.uplink.storage = vec![1];
        session.downlink.storage = vec![2];
        assert_eq!(session.buffer(Direction::Uplink).storage, vec![1]);
        assert_eq!(session.buffer(Direction::Unknown).storage, vec![1]);
        assert_eq!(session.buffer(Direction::Downlink).storage, vec![2]);
    }
}

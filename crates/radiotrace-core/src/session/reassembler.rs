//! Per-direction TCP byte-stream reassembly.
//!
//! Payload bytes are appended at the position implied by the packet's
//! sequence number relative to the stream's base, wrapping modulo 2^32.
//! In-order packets append immediately; the out-of-order buffer is then
//! re-scanned until no further packet fits. A packet overlapping the
//! cursor from below but extending past it (retransmission carrying new
//! data) is appended whole, matching the reference behavior.

use tracing::warn;

use crate::trace::{PacketRecord, TagTable, TcpRole};

use super::{PacketRange, StreamBuffer};

const SEQ_MODULUS: u64 = 1 << 32;

/// Working state for one direction of one session.
#[derive(Debug, Default)]
pub struct Reassembler {
    base_seq: Option<u32>,
    /// Next expected relative sequence number; `None` until the first
    /// packet seeds it.
    expected: Option<u64>,
    /// Indices (into the filtered packet list) of out-of-order packets.
    out_of_order: Vec<usize>,
    buffer: StreamBuffer,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.base_seq = None;
        self.expected = None;
        self.out_of_order.clear();
        self.buffer.clear();
    }

    pub fn base_seq(&self) -> Option<u32> {
        self.base_seq
    }

    pub fn set_base_seq(&mut self, seq: u32) {
        self.base_seq = Some(seq);
    }

    /// Sequence number relative to the stream base, wrapped modulo 2^32.
    fn relative_seq(&self, sequence: u32) -> u64 {
        let base = self.base_seq.unwrap_or(sequence);
        sequence.wrapping_sub(base) as u64 % SEQ_MODULUS
    }

    /// Feed one packet of this direction through the reassembler.
    ///
    /// Returns the index of the last TLS-handshake-bearing packet appended
    /// during this call (directly or from the out-of-order drain), for the
    /// session to record.
    pub fn reassemble(
        &mut self,
        index: usize,
        packets: &[PacketRecord],
        tags: &mut TagTable,
    ) -> Option<usize> {
        let packet = &packets[index];
        let Some(tcp) = packet.tcp() else {
            return None;
        };

        let seq = self.relative_seq(tcp.sequence);
        if self.expected.is_none() {
            self.expected = Some(seq);
        }
        let expected = self.expected.unwrap();

        let mut ssl_handshake = None;
        if seq == expected || (seq < expected && seq + packet.payload_len() as u64 > expected) {
            if let Some(idx) = self.append(index, packets, tags) {
                ssl_handshake = Some(idx);
            }
            // Drain the out-of-order buffer to a fixpoint. Appending
            // advances the cursor immediately, so a duplicate of an
            // already-drained segment stops matching.
            loop {
                let mut progressed = false;
                let mut slot = 0;
                while slot < self.out_of_order.len() {
                    let ooid_index = self.out_of_order[slot];
                    let ooid_seq = packets[ooid_index]
                        .tcp()
                        .map(|tcp| self.relative_seq(tcp.sequence));
                    if ooid_seq == self.expected {
                        self.out_of_order.remove(slot);
                        if let Some(idx) = self.append(ooid_index, packets, tags) {
                            ssl_handshake = Some(idx);
                        }
                        progressed = true;
                    } else {
                        slot += 1;
                    }
                }
                if !progressed {
                    break;
                }
            }
        } else if packet.payload_len() == 0
            && seq + 1 == expected
            && tcp.ack
            && !tcp.syn
            && !tcp.fin
            && !tcp.rst
        {
            // Zero-length segment one byte behind the cursor: keep-alive.
            if tags.tcp_role(packet.id).is_some() {
                warn!(packet = packet.id, "keep-alive packet already typed");
            }
            tags.set_tcp_role(packet.id, TcpRole::KeepAlive);
        } else {
            self.out_of_order.push(index);
        }
        ssl_handshake
    }

    /// Append one packet at the cursor; SYN and FIN each consume a
    /// sequence number. Returns the index when the packet carries a TLS
    /// handshake record.
    fn append(
        &mut self,
        index: usize,
        packets: &[PacketRecord],
        tags: &mut TagTable,
    ) -> Option<usize> {
        let packet = &packets[index];
        let tcp = packet.tcp()?;
        let mut ssl_handshake = None;

        let payload_len = packet.payload_len();
        if payload_len > 0 {
            tags.set_tcp_role(packet.id, TcpRole::Data);
            let offset = self.buffer.storage.len();
            self.buffer.packet_offsets.insert(offset, index);
            self.buffer.storage.extend_from_slice(&packet.payload);
            self.buffer.ranges.push(PacketRange {
                offset,
                len: payload_len,
                packet_id: packet.id,
            });
            *self.expected.get_or_insert(0) += payload_len as u64;
            if packet.is_ssl_handshake() {
                ssl_handshake = Some(index);
            }
        }
        if tcp.syn || tcp.fin {
            *self.expected.get_or_insert(0) += 1;
        }
        ssl_handshake
    }

    /// Append a UDP payload; offsets are running payload lengths, with no
    /// sequence-number logic.
    pub fn append_udp(&mut self, index: usize, packets: &[PacketRecord]) {
        let packet = &packets[index];
        let payload_len = packet.payload_len();
        if payload_len == 0 {
            return;
        }
        let offset = self.buffer.storage.len();
        self.buffer.packet_offsets.insert(offset, index);
        self.buffer.storage.extend_from_slice(&packet.payload);
        self.buffer.ranges.push(PacketRange {
            offset,
            len: payload_len,
            packet_id: packet.id,
        });
    }

    /// Tag leftover out-of-order packets with payload as duplicates and
    /// hand the finished buffer to the session.
    pub fn finish(&mut self, packets: &[PacketRecord], tags: &mut TagTable) -> StreamBuffer {
        for &index in &self.out_of_order {
            let packet = &packets[index];
            if packet.payload_len() > 0 {
                tags.set_tcp_role(packet.id, TcpRole::DataDup);
            }
        }
        std::mem::take(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{Direction, TcpHeader, Transport};
    use std::net::{IpAddr, Ipv4Addr};

    fn data_packet(id: usize, seq: u32, payload: &[u8]) -> PacketRecord {
        tcp_packet(id, seq, payload, false, false)
    }

    fn tcp_packet(id: usize, seq: u32, payload: &[u8], syn: bool, fin: bool) -> PacketRecord {
        PacketRecord {
            id,
            timestamp: id as f64,
            direction: Direction::Uplink,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            ip_len: 40 + payload.len(),
            transport: Transport::Tcp(TcpHeader {
                src_port: 1000,
                dst_port: 80,
                sequence: seq,
                ack_number: 1,
                window: 100,
                syn,
                ack: !syn,
                fin,
                rst: false,
                psh: false,
            }),
            payload: payload.to_vec(),
            app_name: None,
        }
    }

    fn run(packets: &[PacketRecord], base: u32) -> (StreamBuffer, TagTable) {
        let mut tags = TagTable::new(packets.len());
        let mut reassembler = Reassembler::new();
        reassembler.set_base_seq(base);
        for index in 0..packets.len() {
            reassembler.reassemble(index, packets, &mut tags);
        }
        let buffer = reassembler.finish(packets, &mut tags);
        (buffer, tags)
    }

    #[test]
    fn in_order_concatenation() {
        let packets = vec![
            tcp_packet(1, 100, b"", true, false), // SYN consumes seq 100
            data_packet(2, 101, b"hello"),
            data_packet(3, 106, b" world"),
        ];
        let (buffer, tags) = run(&packets, 100);
        assert_eq!(buffer.storage, b"hello world");
        assert_eq!(tags.tcp_role(2), Some(TcpRole::Data));
        assert_eq!(buffer.ranges.len(), 2);
        assert_eq!(buffer.ranges[1].offset, 5);
    }

    #[test]
    fn out_of_order_packets_are_reordered() {
        let packets = vec![
            data_packet(1, 100, b"abc"),
            data_packet(2, 106, b"ghi"), // arrives early
            data_packet(3, 103, b"def"),
        ];
        let (buffer, _tags) = run(&packets, 100);
        assert_eq!(buffer.storage, b"abcdefghi");
    }

    #[test]
    fn retransmitted_duplicate_changes_nothing() {
        let packets = vec![
            data_packet(1, 100, b"abc"),
            data_packet(2, 100, b"abc"), // pure retransmission
            data_packet(3, 103, b"def"),
        ];
        let (buffer, tags) = run(&packets, 100);
        assert_eq!(buffer.storage, b"abcdef");
        assert_eq!(tags.tcp_role(2), Some(TcpRole::DataDup));
    }

    #[test]
    fn overlap_with_new_data_is_reassembled() {
        // Retransmission of "bc" plus new data "de": overlaps the cursor.
        let packets = vec![
            data_packet(1, 100, b"abc"),
            data_packet(2, 101, b"bcde"),
        ];
        let (buffer, tags) = run(&packets, 100);
        // Reference behavior appends the whole overlapping payload.
        assert_eq!(buffer.storage, b"abcbcde");
        assert_eq!(tags.tcp_role(2), Some(TcpRole::Data));
    }

    #[test]
    fn keep_alive_is_tagged_not_buffered() {
        let packets = vec![
            data_packet(1, 100, b"abc"),
            data_packet(2, 102, b""), // expected-1 pure ack
        ];
        let (buffer, tags) = run(&packets, 100);
        assert_eq!(buffer.storage, b"abc");
        assert_eq!(tags.tcp_role(2), Some(TcpRole::KeepAlive));
    }

    #[test]
    fn sequence_wraparound_is_handled() {
        let packets = vec![
            data_packet(1, u32::MAX - 1, b"ab"), // wraps into 0
            data_packet(2, 0, b"cd"),
        ];
        let (buffer, _tags) = run(&packets, u32::MAX - 1);
        assert_eq!(buffer.storage, b"abcd");
    }

    #[test]
    fn udp_append_uses_running_offsets() {
        let mut reassembler = Reassembler::new();
        let mut packets = vec![data_packet(1, 0, b"xy"), data_packet(2, 0, b"z")];
        // Transport type does not matter for append_udp offsets.
        packets[0].id = 1;
        reassembler.append_udp(0, &packets);
        reassembler.append_udp(1, &packets);
        assert_eq!(reassembler.buffer.storage, b"xyz");
        assert_eq!(reassembler.buffer.ranges[1].offset, 2);
    }
}

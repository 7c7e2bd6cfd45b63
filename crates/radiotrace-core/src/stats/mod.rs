//! Aggregate trace statistics: byte/packet totals, per-application and
//! per-endpoint summaries, and the packet-size histogram consumed by the
//! burst analyzer's MSS heuristic.

pub mod throughput;

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::Serialize;

use crate::trace::{PacketRecord, Transport};

/// Packet/byte totals for one application.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationPacketSummary {
    pub app_name: String,
    pub packet_count: u64,
    pub total_bytes: u64,
}

/// Packet/byte totals for one remote endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct IpPacketSummary {
    pub ip_address: IpAddr,
    pub packet_count: u64,
    pub total_bytes: u64,
}

/// Aggregate statistics over the packets retained in sessions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Statistic {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub total_https_bytes: u64,
    /// Seconds between the first and last retained packet.
    pub packet_duration: f64,
    pub average_kbps: f64,
    pub application_summaries: Vec<ApplicationPacketSummary>,
    pub ip_summaries: Vec<IpPacketSummary>,
    /// payload size -> occurrence count; feeds the MSS heuristic.
    #[serde(skip)]
    pub packet_size_counts: BTreeMap<usize, usize>,
}

#[derive(Default)]
struct Counter {
    packets: u64,
    bytes: u64,
}

/// Compute [`Statistic`] over a time-ordered packet list.
///
/// TCP packets are counted with their network-layer length, other
/// transports with payload length only; HTTPS bytes are those on an SSL
/// flow or port 443.
pub fn compute_statistic(packets: &[&PacketRecord]) -> Statistic {
    let mut stat = Statistic::default();
    if packets.is_empty() {
        return stat;
    }

    let mut app_counters: BTreeMap<String, Counter> = BTreeMap::new();
    let mut ip_counters: BTreeMap<IpAddr, Counter> = BTreeMap::new();

    for packet in packets {
        let counted = match &packet.transport {
            Transport::Tcp(_) => {
                if packet.is_ssl() {
                    stat.total_https_bytes += packet.len() as u64;
                }
                packet.len()
            }
            Transport::Udp(_) => packet.payload_len(),
        };
        stat.total_bytes += counted as u64;

        let app = packet.app_name.clone().unwrap_or_default();
        let counter = app_counters.entry(app).or_default();
        counter.packets += 1;
        counter.bytes += packet.len() as u64;

        *stat.packet_size_counts.entry(packet.payload_len()).or_insert(0) += 1;

        let remote = packet.remote_ip().unwrap_or(packet.dst_ip);
        let counter = ip_counters.entry(remote).or_default();
        counter.packets += 1;
        counter.bytes += packet.len() as u64;
    }

    stat.total_packets = packets.len() as u64;
    stat.packet_duration = packets[packets.len() - 1].timestamp - packets[0].timestamp;
    stat.average_kbps = if stat.packet_duration != 0.0 {
        stat.total_bytes as f64 * 8.0 / 1000.0 / stat.packet_duration
    } else {
        0.0
    };
    stat.application_summaries = app_counters
        .into_iter()
        .map(|(app_name, counter)| ApplicationPacketSummary {
            app_name,
            packet_count: counter.packets,
            total_bytes: counter.bytes,
        })
        .collect();
    stat.ip_summaries = ip_counters
        .into_iter()
        .map(|(ip_address, counter)| IpPacketSummary {
            ip_address,
            packet_count: counter.packets,
            total_bytes: counter.bytes,
        })
        .collect();
    stat
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{Direction, TcpHeader, UdpHeader};
    use std::net::Ipv4Addr;

    fn tcp_packet(timestamp: f64, len: usize, payload_len: usize, port: u16) -> PacketRecord {
        PacketRecord {
            id: 0,
            timestamp,
            direction: Direction::Uplink,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            ip_len: len,
            transport: Transport::Tcp(TcpHeader {
                src_port: 40000,
                dst_port: port,
                sequence: 0,
                ack_number: 0,
                window: 0,
                syn: false,
                ack: false,
                fin: false,
                rst: false,
                psh: false,
            }),
            payload: vec![0; payload_len],
            app_name: Some("app".to_string()),
        }
    }

    fn udp_packet(timestamp: f64, payload_len: usize) -> PacketRecord {
        PacketRecord {
            id: 0,
            timestamp,
            direction: Direction::Downlink,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            ip_len: 28 + payload_len,
            transport: Transport::Udp(UdpHeader { src_port: 53, dst_port: 4000, dns: None }),
            payload: vec![0; payload_len],
            app_name: None,
        }
    }

    #[test]
    fn totals_distinguish_tcp_and_udp_accounting() {
        let packets = vec![tcp_packet(0.0, 140, 100, 80), udp_packet(2.0, 60)];
        let refs: Vec<&PacketRecord> = packets.iter().collect();
        let stat = compute_statistic(&refs);
        assert_eq!(stat.total_packets, 2);
        // TCP counted with header length, UDP with payload only.
        assert_eq!(stat.total_bytes, 140 + 60);
        assert_eq!(stat.total_https_bytes, 0);
        assert_eq!(stat.packet_duration, 2.0);
        assert!(stat.average_kbps > 0.0);
    }

    #[test]
    fn https_bytes_counted_for_port_443() {
        let packets = vec![tcp_packet(0.0, 140, 100, 443)];
        let refs: Vec<&PacketRecord> = packets.iter().collect();
        let stat = compute_statistic(&refs);
        assert_eq!(stat.total_https_bytes, 140);
    }

    #[test]
    fn histogram_and_summaries_filled() {
        let packets = vec![
            tcp_packet(0.0, 140, 100, 80),
            tcp_packet(1.0, 140, 100, 80),
            udp_packet(2.0, 60),
        ];
        let refs: Vec<&PacketRecord> = packets.iter().collect();
        let stat = compute_statistic(&refs);
        assert_eq!(stat.packet_size_counts.get(&100), Some(&2));
        assert_eq!(stat.packet_size_counts.get(&60), Some(&1));
        assert_eq!(stat.application_summaries.len(), 2); // "app" and unnamed
        assert_eq!(stat.ip_summaries.len(), 2);
    }

    #[test]
    fn empty_input_is_all_zero() {
        let stat = compute_statistic(&[]);
        assert_eq!(stat.total_packets, 0);
        assert_eq!(stat.average_kbps, 0.0);
    }
}

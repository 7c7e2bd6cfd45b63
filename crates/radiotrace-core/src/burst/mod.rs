//! Burst modeling: time-clustered packet groups, their causal categories,
//! and the per-category aggregation reported to callers.

pub mod analyzer;

pub use analyzer::analyze;

use serde::Serialize;

use crate::trace::PacketRecord;

/// Causal category assigned to a burst, first matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum BurstCategory {
    TcpProtocol,
    TcpLossOrDup,
    UserInput,
    ScreenRotation,
    Cpu,
    ServerNetDelay,
    ClientApp,
    Long,
    Periodical,
    Unknown,
}

impl BurstCategory {
    pub const ALL: [BurstCategory; 10] = [
        BurstCategory::TcpProtocol,
        BurstCategory::TcpLossOrDup,
        BurstCategory::UserInput,
        BurstCategory::ScreenRotation,
        BurstCategory::Cpu,
        BurstCategory::ServerNetDelay,
        BurstCategory::ClientApp,
        BurstCategory::Long,
        BurstCategory::Periodical,
        BurstCategory::Unknown,
    ];
}

/// A contiguous group of packets treated as one unit of network activity.
///
/// Bursts partition the filtered packet list: every packet belongs to
/// exactly one burst, in time order.
#[derive(Debug, Clone, Serialize)]
pub struct Burst {
    /// Indices into the filtered packet list.
    pub packet_indices: Vec<usize>,
    pub begin_time: f64,
    pub end_time: f64,
    pub category: BurstCategory,
    /// Gap to the following burst exceeds the long-burst threshold.
    pub long_inter_burst: bool,
    pub energy: f64,
    pub active_time: f64,
    /// First uplink packet with payload, once periodic diagnosis found one.
    pub first_uplink_data_packet: Option<usize>,
}

impl Burst {
    pub fn new(packet_indices: Vec<usize>, packets: &[PacketRecord]) -> Self {
        let begin_time = packet_indices
            .first()
            .map(|&i| packets[i].timestamp)
            .unwrap_or(0.0);
        let end_time = packet_indices
            .last()
            .map(|&i| packets[i].timestamp)
            .unwrap_or(0.0);
        Self {
            packet_indices,
            begin_time,
            end_time,
            category: BurstCategory::Unknown,
            long_inter_burst: false,
            energy: 0.0,
            active_time: 0.0,
            first_uplink_data_packet: None,
        }
    }

    /// Absorb the following burst.
    pub fn merge(&mut self, other: Burst) {
        self.packet_indices.extend(other.packet_indices);
        self.end_time = other.end_time;
    }

    pub fn begin_packet(&self) -> Option<usize> {
        self.packet_indices.first().copied()
    }

    pub fn end_packet(&self) -> Option<usize> {
        self.packet_indices.last().copied()
    }
}

/// Per-category aggregation over the whole burst collection.
#[derive(Debug, Clone, Serialize)]
pub struct BurstAnalysisInfo {
    pub category: BurstCategory,
    pub payload_bytes: u64,
    pub payload_pct: f64,
    pub energy: f64,
    pub energy_pct: f64,
    pub active_time: f64,
    pub active_time_pct: f64,
    /// Joules per kilobyte of payload; absent for payload-free categories.
    pub joules_per_kilobyte: Option<f64>,
}

/// Complete burst analysis output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BurstCollectionAnalysisData {
    pub bursts: Vec<Burst>,
    pub burst_analysis_info: Vec<BurstAnalysisInfo>,
    pub long_burst_count: usize,
    pub total_energy: f64,
    /// Index (into the filtered packet list) of the packet anchoring the
    /// shortest periodic repeat.
    pub shortest_period_packet: Option<usize>,
    /// Interval (seconds) of the fastest periodic pattern found.
    pub shortest_period_interval: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{Direction, TcpHeader, Transport};
    use std::net::{IpAddr, Ipv4Addr};

    fn packet(timestamp: f64) -> PacketRecord {
        PacketRecord {
            id: 1,
            timestamp,
            direction: Direction::Uplink,
            src_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            dst_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ip_len: 40,
            transport: Transport::Tcp(TcpHeader {
                src_port: 1,
                dst_port: 2,
                sequence: 0,
                ack_number: 0,
                window: 0,
                syn: false,
                ack: false,
                fin: false,
                rst: false,
                psh: false,
            }),
            payload: Vec::new(),
            app_name: None,
        }
    }

    #[test]
    fn merge_extends_time_and_packets() {
        let packets = vec![packet(1.0), packet(2.0), packet(5.0)];
        let mut first = Burst::new(vec![0, 1], &packets);
        let second = Burst::new(vec![2], &packets);
        first.merge(second);
        assert_eq!(first.packet_indices, vec![0, 1, 2]);
        assert_eq!(first.begin_time, 1.0);
        assert_eq!(first.end_time, 5.0);
    }
}

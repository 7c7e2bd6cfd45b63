use std::collections::HashSet;
use std::net::IpAddr;

use super::packet::{PacketRecord, Transport};

/// Inclusive time window within the trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub begin: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn contains(&self, timestamp: f64) -> bool {
        self.begin <= timestamp && timestamp <= self.end
    }
}

/// Selects which packets participate in the analysis.
///
/// The default filter keeps everything. An app allow-list of `Some` drops
/// packets whose application is absent from the set (packets with no
/// recorded application match the empty string).
#[derive(Debug, Clone)]
pub struct AnalysisFilter {
    pub app_names: Option<HashSet<String>>,
    pub ipv4: bool,
    pub ipv6: bool,
    pub udp: bool,
    pub time_range: Option<TimeRange>,
}

impl Default for AnalysisFilter {
    fn default() -> Self {
        Self {
            app_names: None,
            ipv4: true,
            ipv6: true,
            udp: true,
            time_range: None,
        }
    }
}

impl AnalysisFilter {
    fn keeps(&self, packet: &PacketRecord) -> bool {
        let remote = packet.remote_ip().unwrap_or(packet.dst_ip);
        if !self.ipv4 && matches!(remote, IpAddr::V4(_)) {
            return false;
        }
        if !self.ipv6 && matches!(remote, IpAddr::V6(_)) {
            return false;
        }
        if !self.udp && matches!(packet.transport, Transport::Udp(_)) {
            return false;
        }
        if let Some(range) = &self.time_range {
            if !range.contains(packet.timestamp) {
                return false;
            }
        }
        if let Some(apps) = &self.app_names {
            let name = packet.app_name.as_deref().unwrap_or("");
            if !apps.contains(name) {
                return false;
            }
        }
        true
    }

    /// Apply the filter and assign 1-based packet ids to the survivors.
    pub fn apply(&self, packets: Vec<PacketRecord>) -> Vec<PacketRecord> {
        let mut kept: Vec<PacketRecord> = packets.into_iter().filter(|p| self.keeps(p)).collect();
        for (index, packet) in kept.iter_mut().enumerate() {
            packet.id = index + 1;
        }
        kept
    }
}

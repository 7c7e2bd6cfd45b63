use std::net::IpAddr;

use serde::Serialize;

use crate::rrc::RrcState;

/// Direction of a packet relative to the traced device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    /// Device to network (request direction).
    Uplink,
    /// Network to device (response direction).
    Downlink,
    /// Direction could not be determined; such packets are kept in their
    /// session but excluded from role analysis.
    Unknown,
}

/// TCP role assigned to a packet during session analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TcpRole {
    Data,
    Ack,
    Establish,
    Close,
    Reset,
    DataDup,
    AckDup,
    KeepAlive,
    KeepAliveAck,
    ZeroWindow,
    WindowUpdate,
    DataRecover,
    AckRecover,
}

/// TCP-specific transport fields.
#[derive(Debug, Clone)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub sequence: u32,
    pub ack_number: u32,
    pub window: u16,
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
}

/// Decoded DNS query/response summary carried by a UDP packet.
#[derive(Debug, Clone)]
pub struct DnsInfo {
    pub is_response: bool,
    pub domain_name: String,
    pub addresses: Vec<IpAddr>,
}

/// UDP-specific transport fields.
#[derive(Debug, Clone)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub dns: Option<DnsInfo>,
}

/// Transport layer of a packet record.
#[derive(Debug, Clone)]
pub enum Transport {
    Tcp(TcpHeader),
    Udp(UdpHeader),
}

/// One decoded packet from the capture.
///
/// Immutable once decoded; the `id` is assigned (1-based) when the packet
/// passes the analysis filter and doubles as its index into the tag tables.
#[derive(Debug, Clone)]
pub struct PacketRecord {
    /// 1-based id within the filtered packet list; 0 until filtering.
    pub id: usize,
    /// Seconds from the start of the trace.
    pub timestamp: f64,
    pub direction: Direction,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    /// Packet length excluding the datalink header (the part that crosses
    /// the radio access network).
    pub ip_len: usize,
    pub transport: Transport,
    pub payload: Vec<u8>,
    /// Application the socket belonged to, when the collector recorded it.
    pub app_name: Option<String>,
}

impl PacketRecord {
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Length used for byte accounting (excludes the datalink header).
    pub fn len(&self) -> usize {
        self.ip_len
    }

    pub fn is_empty(&self) -> bool {
        self.ip_len == 0
    }

    pub fn tcp(&self) -> Option<&TcpHeader> {
        match &self.transport {
            Transport::Tcp(tcp) => Some(tcp),
            Transport::Udp(_) => None,
        }
    }

    pub fn udp(&self) -> Option<&UdpHeader> {
        match &self.transport {
            Transport::Udp(udp) => Some(udp),
            Transport::Tcp(_) => None,
        }
    }

    /// IP address of the far end, by direction. `None` when the direction
    /// is unknown.
    pub fn remote_ip(&self) -> Option<IpAddr> {
        match self.direction {
            Direction::Uplink => Some(self.dst_ip),
            Direction::Downlink => Some(self.src_ip),
            Direction::Unknown => None,
        }
    }

    /// Whether this packet belongs to an HTTPS/TLS flow (port 443).
    pub fn is_ssl(&self) -> bool {
        match &self.transport {
            Transport::Tcp(tcp) => tcp.src_port == 443 || tcp.dst_port == 443,
            Transport::Udp(_) => false,
        }
    }

    /// TLS handshake record heuristic: content type 22, protocol major 3.
    pub fn is_ssl_handshake(&self) -> bool {
        self.tcp().is_some() && self.payload.len() >= 2 && self.payload[0] == 0x16 && self.payload[1] == 0x03
    }
}

/// Side tables holding the analysis-assigned per-packet tags.
///
/// Indexed by the packet's 1-based filtered id. Keeping these out of
/// `PacketRecord` keeps the records immutable and makes each pass's side
/// effects auditable.
#[derive(Debug, Clone)]
pub struct TagTable {
    tcp_roles: Vec<Option<TcpRole>>,
    radio_states: Vec<Option<RrcState>>,
}

impl TagTable {
    pub fn new(packet_count: usize) -> Self {
        Self {
            tcp_roles: vec![None; packet_count],
            radio_states: vec![None; packet_count],
        }
    }

    pub fn tcp_role(&self, packet_id: usize) -> Option<TcpRole> {
        self.tcp_roles.get(packet_id.wrapping_sub(1)).copied().flatten()
    }

    pub fn set_tcp_role(&mut self, packet_id: usize, role: TcpRole) {
        if let Some(slot) = self.tcp_roles.get_mut(packet_id.wrapping_sub(1)) {
            *slot = Some(role);
        }
    }

    pub fn clear_tcp_role(&mut self, packet_id: usize) {
        if let Some(slot) = self.tcp_roles.get_mut(packet_id.wrapping_sub(1)) {
            *slot = None;
        }
    }

    pub fn radio_state(&self, packet_id: usize) -> Option<RrcState> {
        self.radio_states.get(packet_id.wrapping_sub(1)).copied().flatten()
    }

    pub fn set_radio_state(&mut self, packet_id: usize, state: RrcState) {
        if let Some(slot) = self.radio_states.get_mut(packet_id.wrapping_sub(1)) {
            *slot = Some(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn tcp_record(payload: Vec<u8>) -> PacketRecord {
        PacketRecord {
            id: 1,
            timestamp: 0.0,
            direction: Direction::Uplink,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            ip_len: 40 + payload.len(),
            transport: Transport::Tcp(TcpHeader {
                src_port: 40000,
                dst_port: 443,
                sequence: 0,
                ack_number: 0,
                window: 1000,
                syn: false,
                ack: true,
                fin: false,
                rst: false,
                psh: false,
            }),
            payload,
            app_name: None,
        }
    }

    #[test]
    fn remote_ip_follows_direction() {
        let mut record = tcp_record(vec![]);
        assert_eq!(record.remote_ip(), Some(record.dst_ip));
        record.direction = Direction::Downlink;
        assert_eq!(record.remote_ip(), Some(record.src_ip));
        record.direction = Direction::Unknown;
        assert_eq!(record.remote_ip(), None);
    }

    #[test]
    fn ssl_detection() {
        let record = tcp_record(vec![0x16, 0x03, 0x01]);
        assert!(record.is_ssl());
        assert!(record.is_ssl_handshake());
        let record = tcp_record(vec![0x17, 0x03]);
        assert!(!record.is_ssl_handshake());
    }

    #[test]
    fn tag_table_roundtrip_and_out_of_range() {
        let mut tags = TagTable::new(2);
        tags.set_tcp_role(1, TcpRole::Data);
        tags.set_radio_state(2, RrcState::LteContinuous);
        assert_eq!(tags.tcp_role(1), Some(TcpRole::Data));
        assert_eq!(tags.radio_state(2), Some(RrcState::LteContinuous));
        assert_eq!(tags.tcp_role(2), None);
        // Ids outside the table are ignored, not panics.
        tags.set_tcp_role(99, TcpRole::Ack);
        assert_eq!(tags.tcp_role(99), None);
        tags.clear_tcp_role(1);
        assert_eq!(tags.tcp_role(1), None);
    }
}

//! Frame decoding: link/IP/transport slicing via etherparse, plus the
//! small DNS decoder used to associate lookups with sessions.

use std::net::IpAddr;

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap_parser::Linktype;
use tracing::debug;

use super::PacketEvent;
use crate::trace::{DnsInfo, TcpHeader, Transport, UdpHeader};

const DNS_PORT: u16 = 53;
const ETHERNET_HEADER_LEN: usize = 14;

/// One decoded frame, before direction assignment.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub ts: f64,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    /// Frame length minus the datalink header (what crosses the radio).
    pub ip_len: usize,
    pub transport: Transport,
    pub payload: Vec<u8>,
    pub syn: bool,
    pub ack: bool,
}

/// Decode a raw frame; `None` when it is not IP TCP/UDP or fails to
/// slice.
pub fn decode_frame(event: &PacketEvent) -> Option<DecodedFrame> {
    let (sliced, link_header_len) = match event.linktype {
        Linktype::ETHERNET => (
            SlicedPacket::from_ethernet(&event.data).ok()?,
            ETHERNET_HEADER_LEN,
        ),
        Linktype::RAW => (SlicedPacket::from_ip(&event.data).ok()?, 0),
        _ => return None,
    };

    let (src_ip, dst_ip) = match sliced.net.as_ref()? {
        NetSlice::Ipv4(ipv4) => (
            IpAddr::V4(ipv4.header().source_addr()),
            IpAddr::V4(ipv4.header().destination_addr()),
        ),
        NetSlice::Ipv6(ipv6) => (
            IpAddr::V6(ipv6.header().source_addr()),
            IpAddr::V6(ipv6.header().destination_addr()),
        ),
    };

    let (transport, payload, syn, ack) = match sliced.transport.as_ref()? {
        TransportSlice::Tcp(tcp) => {
            let header = TcpHeader {
                src_port: tcp.source_port(),
                dst_port: tcp.destination_port(),
                sequence: tcp.sequence_number(),
                ack_number: tcp.acknowledgment_number(),
                window: tcp.window_size(),
                syn: tcp.syn(),
                ack: tcp.ack(),
                fin: tcp.fin(),
                rst: tcp.rst(),
                psh: tcp.psh(),
            };
            let syn = header.syn;
            let ack = header.ack;
            (Transport::Tcp(header), tcp.payload().to_vec(), syn, ack)
        }
        TransportSlice::Udp(udp) => {
            let payload = udp.payload().to_vec();
            let dns = if udp.source_port() == DNS_PORT || udp.destination_port() == DNS_PORT {
                decode_dns(&payload)
            } else {
                None
            };
            let header = UdpHeader {
                src_port: udp.source_port(),
                dst_port: udp.destination_port(),
                dns,
            };
            (Transport::Udp(header), payload, false, false)
        }
        _ => return None,
    };

    Some(DecodedFrame {
        ts: event.ts.unwrap_or(0.0),
        src_ip,
        dst_ip,
        ip_len: event.data.len().saturating_sub(link_header_len),
        transport,
        payload,
        syn,
        ack,
    })
}

/// The device's own address: the source of the first connection-opening
/// SYN (a SYN without ACK is sent by the client side).
pub fn infer_local_address(frames: &[DecodedFrame]) -> Option<IpAddr> {
    frames
        .iter()
        .find(|frame| frame.syn && !frame.ack)
        .map(|frame| frame.src_ip)
}

pub fn is_private_address(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            octets[0] == 10
                || (octets[0] == 172 && (16..=31).contains(&octets[1]))
                || (octets[0] == 192 && octets[1] == 168)
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            (segments[0] & 0xfe00) == 0xfc00 || (segments[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Minimal DNS message decoder: the question name plus any A/AAAA answer
/// addresses, enough to tie lookups to the sessions they name.
pub fn decode_dns(payload: &[u8]) -> Option<DnsInfo> {
    if payload.len() < 12 {
        return None;
    }
    let flags = u16::from_be_bytes([payload[2], payload[3]]);
    let is_response = flags & 0x8000 != 0;
    let question_count = u16::from_be_bytes([payload[4], payload[5]]);
    let answer_count = u16::from_be_bytes([payload[6], payload[7]]);
    if question_count == 0 {
        return None;
    }

    let (domain_name, mut offset) = read_name(payload, 12)?;
    // QTYPE and QCLASS of the first question.
    offset += 4;
    // Any further questions are skipped whole.
    for _ in 1..question_count {
        let (_, next) = read_name(payload, offset)?;
        offset = next + 4;
    }

    let mut addresses = Vec::new();
    for _ in 0..answer_count {
        let (_, next) = read_name(payload, offset)?;
        offset = next;
        if payload.len() < offset + 10 {
            break;
        }
        let record_type = u16::from_be_bytes([payload[offset], payload[offset + 1]]);
        let rdata_len =
            u16::from_be_bytes([payload[offset + 8], payload[offset + 9]]) as usize;
        offset += 10;
        if payload.len() < offset + rdata_len {
            break;
        }
        match (record_type, rdata_len) {
            (1, 4) => {
                let mut octets = [0u8; 4];
                octets.copy_from_slice(&payload[offset..offset + 4]);
                addresses.push(IpAddr::from(octets));
            }
            (28, 16) => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&payload[offset..offset + 16]);
                addresses.push(IpAddr::from(octets));
            }
            _ => {}
        }
        offset += rdata_len;
    }

    Some(DnsInfo { is_response, domain_name, addresses })
}

/// Read a possibly-compressed DNS name; returns the name and the offset
/// just past it.
fn read_name(payload: &[u8], start: usize) -> Option<(String, usize)> {
    let mut name = String::new();
    let mut offset = start;
    let mut jumped = false;
    let mut end = start;
    let mut hops = 0;

    loop {
        let length = *payload.get(offset)? as usize;
        if length == 0 {
            if !jumped {
                end = offset + 1;
            }
            break;
        }
        if length & 0xc0 == 0xc0 {
            // Compression pointer.
            let low = *payload.get(offset + 1)? as usize;
            if !jumped {
                end = offset + 2;
            }
            offset = ((length & 0x3f) << 8) | low;
            jumped = true;
            hops += 1;
            if hops > 16 {
                debug!("dns name compression loop");
                return None;
            }
            continue;
        }
        let label = payload.get(offset + 1..offset + 1 + length)?;
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(&String::from_utf8_lossy(label));
        offset += 1 + length;
        if !jumped {
            end = offset + 1;
        }
    }
    Some((name, end))
}

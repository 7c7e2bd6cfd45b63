//! Groups filtered packets into sessions, reassembles both directions,
//! and runs the TCP role-analysis passes.
//!
//! The grouping pass is direction-normalized: uplink packets key on
//! (source port, destination address), downlink packets on the reverse.
//! DNS traffic is cross-referenced to name sessions before they are
//! created. A SYN carrying a conflicting initial sequence number splits
//! the session, modeling a second connection reusing the port tuple.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use tracing::{debug, warn};

use crate::http;
use crate::trace::{Direction, PacketRecord, TagTable, TcpRole, Transport};

use super::reassembler::Reassembler;
use super::{Session, SessionKey, Termination};

/// Assemble TCP and UDP sessions from the filtered packet list.
///
/// TCP sessions come first, sorted by start time; UDP-only sessions are
/// appended in creation order. Every input packet lands in exactly one
/// session.
pub fn assemble_sessions(packets: &[PacketRecord], tags: &mut TagTable) -> Vec<Session> {
    let mut sessions: Vec<Session> = Vec::new();
    let mut by_key: HashMap<SessionKey, usize> = HashMap::new();
    let mut dns_packets: Vec<usize> = Vec::new();
    let mut udp_packets: Vec<usize> = Vec::new();
    let mut host_map: HashMap<IpAddr, String> = HashMap::new();

    for (index, packet) in packets.iter().enumerate() {
        let tcp = match &packet.transport {
            Transport::Udp(udp) => {
                udp_packets.push(index);
                if let Some(dns) = &udp.dns {
                    dns_packets.push(index);
                    if dns.is_response {
                        for addr in &dns.addresses {
                            host_map.insert(*addr, dns.domain_name.clone());
                        }
                    }
                }
                continue;
            }
            Transport::Tcp(tcp) => tcp,
        };

        let (local_port, remote_ip, remote_port) = match packet.direction {
            Direction::Uplink => (tcp.src_port, packet.dst_ip, tcp.dst_port),
            Direction::Downlink => (tcp.dst_port, packet.src_ip, tcp.src_port),
            Direction::Unknown => {
                warn!(packet = packet.id, "unable to determine packet direction");
                continue;
            }
        };

        tags.clear_tcp_role(packet.id);

        let key = SessionKey { local_port, remote_ip, remote_port };
        let session_index = match by_key.get(&key) {
            Some(&existing) => existing,
            None => {
                let mut session = Session::new(key);
                associate_dns(&mut session, remote_ip, &mut dns_packets, packets, &host_map);
                sessions.push(session);
                by_key.insert(key, sessions.len() - 1);
                sessions.len() - 1
            }
        };
        sessions[session_index].packet_indices.push(index);
    }

    // Reassembly may split sessions, appending to the list mid-iteration.
    let mut index = 0;
    while index < sessions.len() {
        if let Some(spawned) = reassemble_session(&mut sessions[index], packets, tags) {
            sessions.push(spawned);
        }
        index += 1;
    }

    for session in sessions.iter_mut() {
        session.bytes_transferred = session
            .packet_indices
            .iter()
            .map(|&i| packets[i].len() as u64)
            .sum();
        analyze_ack(session, packets, tags);
        analyze_zero_window(session, packets, tags);
        analyze_recover(session, packets, tags);
        http::parser::parse_session(session, packets);
        finish_naming(session, packets);
    }

    sessions.sort_by(|a, b| a.start_time(packets).total_cmp(&b.start_time(packets)));

    if !udp_packets.is_empty() {
        let udp_sessions = build_udp_sessions(&udp_packets, &sessions, packets, tags);
        sessions.extend(udp_sessions);
    }

    sessions
}

/// Pick the session's host names from the DNS traffic seen so far: the
/// most recent response resolving the remote address, then the matching
/// request by domain name. Matched DNS packets are consumed so they are
/// not reused by other sessions.
fn associate_dns(
    session: &mut Session,
    remote_ip: IpAddr,
    dns_packets: &mut Vec<usize>,
    packets: &[PacketRecord],
    host_map: &HashMap<IpAddr, String>,
) {
    let mut response_domain: Option<String> = None;
    for &dns_index in dns_packets.iter().rev() {
        if let Some(dns) = packets[dns_index].udp().and_then(|u| u.dns.as_ref()) {
            if dns.is_response && dns.addresses.contains(&remote_ip) {
                session.dns_response = Some(dns_index);
                response_domain = Some(dns.domain_name.clone());
                break;
            }
        }
    }

    match response_domain {
        Some(domain) => {
            let mut position = 0;
            while position < dns_packets.len() {
                let dns_index = dns_packets[position];
                let matches = packets[dns_index]
                    .udp()
                    .and_then(|u| u.dns.as_ref())
                    .map(|dns| (dns.domain_name == domain, dns.is_response))
                    .unwrap_or((false, false));
                if !matches.0 {
                    position += 1;
                    continue;
                }
                if session.dns_request.is_none() && !matches.1 {
                    session.remote_host_name = Some(domain.clone());
                    session.dns_request = Some(dns_index);
                }
                dns_packets.remove(position);
                if Some(dns_index) == session.dns_response {
                    break;
                }
            }
        }
        None => {
            session.remote_host_name = host_map.get(&remote_ip).cloned();
        }
    }
}

/// Walk one session's packets chronologically through the two
/// reassemblers. Returns a spawned session when a conflicting SYN splits
/// the stream.
fn reassemble_session(
    session: &mut Session,
    packets: &[PacketRecord],
    tags: &mut TagTable,
) -> Option<Session> {
    let mut uplink = Reassembler::new();
    let mut downlink = Reassembler::new();
    let mut terminated = false;
    let mut last_index: Option<usize> = None;
    let mut spawned: Option<Session> = None;

    let indices = std::mem::take(&mut session.packet_indices);
    for (position, &index) in indices.iter().enumerate() {
        let packet = &packets[index];
        let Some(tcp) = packet.tcp() else { continue };
        if packet.is_ssl() {
            session.ssl = true;
        }
        let is_uplink = match packet.direction {
            Direction::Uplink => true,
            Direction::Downlink => false,
            Direction::Unknown => {
                warn!(packet = packet.id, "no direction for packet");
                continue;
            }
        };

        if tcp.syn {
            tags.set_tcp_role(packet.id, TcpRole::Establish);
            let reassembler = if is_uplink { &mut uplink } else { &mut downlink };
            match reassembler.base_seq() {
                None => {
                    reassembler.set_base_seq(tcp.sequence);
                    if packet.payload_len() != 0 {
                        warn!(packet = packet.id, "payload in establish packet");
                    }
                }
                Some(base) if base == tcp.sequence => {}
                Some(_) => {
                    // A different initial sequence number on the same
                    // tuple: a new logical connection begins here.
                    if !terminated {
                        debug!(packet = packet.id, "session reused without termination");
                    }
                    let mut new_session = Session::new(session.key);
                    new_session.packet_indices = indices[position..].to_vec();
                    session.packet_indices = indices[..position].to_vec();
                    spawned = Some(new_session);
                    break;
                }
            }
        } else {
            if tcp.fin || tcp.rst {
                if !terminated {
                    if let Some(last) = last_index {
                        session.termination = Some(Termination {
                            packet_index: index,
                            delay: packet.timestamp - packets[last].timestamp,
                        });
                    }
                }
                terminated = true;
                let role = if tcp.fin { TcpRole::Close } else { TcpRole::Reset };
                tags.set_tcp_role(packet.id, role);
            }

            // Joined mid-stream: infer both base sequence numbers from the
            // first packet observed.
            let seeded = if is_uplink { uplink.base_seq() } else { downlink.base_seq() };
            if seeded.is_none() {
                if is_uplink {
                    uplink.set_base_seq(tcp.sequence);
                    downlink.set_base_seq(tcp.ack_number);
                } else {
                    downlink.set_base_seq(tcp.sequence);
                    uplink.set_base_seq(tcp.ack_number);
                }
            }
        }

        if let Some(app) = &packet.app_name {
            session.app_names.insert(app.clone());
        }

        let reassembler = if is_uplink { &mut uplink } else { &mut downlink };
        if let Some(handshake) = reassembler.reassemble(index, packets, tags) {
            session.last_ssl_handshake = Some(handshake);
        }
        last_index = Some(index);
    }

    if spawned.is_none() {
        session.packet_indices = indices;
    }
    session.uplink = uplink.finish(packets, tags);
    session.downlink = downlink.finish(packets, tags);
    spawned
}

/// ACK-stream analysis: pure ACKs, duplicated ACKs (same window for the
/// same ack/flags key), window updates, and acks answering keep-alives.
fn analyze_ack(session: &Session, packets: &[PacketRecord], tags: &mut TagTable) {
    let mut ul_ack_window: HashMap<u64, u16> = HashMap::new();
    let mut dl_ack_window: HashMap<u64, u16> = HashMap::new();
    let mut ul_alive_ack: HashSet<i64> = HashSet::new();
    let mut dl_alive_ack: HashSet<i64> = HashSet::new();

    for &index in &session.packet_indices {
        let packet = &packets[index];
        let Some(tcp) = packet.tcp() else { continue };
        if !tcp.ack {
            continue;
        }

        let (ack_window, alive_ack, alive_ack_other) = match packet.direction {
            Direction::Uplink => (&mut ul_ack_window, &mut ul_alive_ack, &dl_alive_ack),
            Direction::Downlink => (&mut dl_ack_window, &mut dl_alive_ack, &ul_alive_ack),
            Direction::Unknown => {
                warn!(packet = packet.id, "no direction for packet");
                continue;
            }
        };

        if tags.tcp_role(packet.id) == Some(TcpRole::KeepAlive) {
            alive_ack.insert(tcp.sequence as i64);
            continue;
        }

        let flag_bits: u64 = if tcp.fin {
            1
        } else if tcp.syn {
            2
        } else if tcp.rst {
            4
        } else {
            0
        };
        let key = ((tcp.ack_number as u64) << 32) | flag_bits;
        let payload_len = packet.payload_len();
        let plain = !tcp.syn && !tcp.fin && !tcp.rst;

        if alive_ack_other.contains(&(tcp.ack_number as i64 - 1)) && payload_len == 0 && plain {
            tags.set_tcp_role(packet.id, TcpRole::KeepAliveAck);
        } else if let Some(&previous_window) = ack_window.get(&key) {
            if tcp.window == previous_window {
                if payload_len == 0
                    && !tcp.rst
                    && tags.tcp_role(packet.id) != Some(TcpRole::KeepAlive)
                {
                    tags.set_tcp_role(packet.id, TcpRole::AckDup);
                }
            } else {
                ack_window.insert(key, tcp.window);
                if payload_len == 0
                    && !tcp.rst
                    && tags.tcp_role(packet.id) != Some(TcpRole::KeepAlive)
                {
                    tags.set_tcp_role(packet.id, TcpRole::WindowUpdate);
                }
            }
        } else {
            ack_window.insert(key, tcp.window);
            if payload_len == 0 && plain {
                tags.set_tcp_role(packet.id, TcpRole::Ack);
            }
        }
    }
}

/// Zero-payload, zero-window packets advertise a stalled receiver.
fn analyze_zero_window(session: &Session, packets: &[PacketRecord], tags: &mut TagTable) {
    for &index in &session.packet_indices {
        let packet = &packets[index];
        let Some(tcp) = packet.tcp() else { continue };
        if packet.payload_len() == 0
            && tcp.window == 0
            && !tcp.syn
            && !tcp.fin
            && !tcp.rst
        {
            tags.set_tcp_role(packet.id, TcpRole::ZeroWindow);
        }
    }
}

/// Correlate duplicate data/acks with the later packets that recover
/// them.
///
/// A recover-data packet's sequence equals a previously duplicated ack;
/// a recover-ack's ack equals a duplicated data's end sequence. The map
/// clearing is deliberately asymmetric (duplicated data implies a
/// duplicated ack, never the reverse); downstream burst classification
/// depends on the tags this exact ordering produces.
fn analyze_recover(session: &Session, packets: &[PacketRecord], tags: &mut TagTable) {
    let mut dup_ack_ul: HashSet<i64> = HashSet::new();
    let mut dup_ack_dl: HashSet<i64> = HashSet::new();
    let mut dup_seq_ul: HashSet<i64> = HashSet::new();
    let mut dup_seq_dl: HashSet<i64> = HashSet::new();

    for &index in &session.packet_indices {
        let packet = &packets[index];
        let Some(tcp) = packet.tcp() else { continue };
        let role = tags.tcp_role(packet.id);
        let uplink = packet.direction == Direction::Uplink;
        let downlink = packet.direction == Direction::Downlink;
        let seq = tcp.sequence as i64;
        let ack = tcp.ack_number as i64;
        let end_seq = seq + packet.payload_len() as i64;

        if role == Some(TcpRole::DataDup) {
            if uplink {
                dup_seq_ul.insert(end_seq);
            } else {
                dup_seq_dl.insert(end_seq);
            }
        }

        // Duplicated data implies a duplicated ack as well.
        if role == Some(TcpRole::AckDup) || role == Some(TcpRole::DataDup) {
            if uplink {
                dup_ack_ul.insert(ack);
            } else {
                dup_ack_dl.insert(ack);
            }
        }

        if role == Some(TcpRole::Data) {
            if uplink && dup_ack_dl.contains(&seq) {
                tags.set_tcp_role(packet.id, TcpRole::DataRecover);
            }
            if downlink && dup_ack_ul.contains(&seq) {
                tags.set_tcp_role(packet.id, TcpRole::DataRecover);
            }
        }

        if role == Some(TcpRole::Ack) {
            if uplink && dup_seq_dl.contains(&ack) {
                tags.set_tcp_role(packet.id, TcpRole::DataRecover);
            }
            if downlink && dup_seq_ul.contains(&ack) {
                tags.set_tcp_role(packet.id, TcpRole::DataRecover);
            }
        }

        // An ack-family packet whose sequence answers a pending duplicate
        // cancels the correlation on the opposite direction.
        if matches!(
            role,
            Some(TcpRole::Ack) | Some(TcpRole::AckDup) | Some(TcpRole::AckRecover)
        ) {
            if uplink {
                dup_ack_dl.remove(&seq);
            }
            if downlink {
                dup_ack_ul.remove(&seq);
            }
        }

        // Data clears its own direction's pending dup-ack by ack number;
        // there is no mirror-image rule for the dup-seq maps.
        if matches!(role, Some(TcpRole::Data) | Some(TcpRole::DataRecover)) {
            if uplink {
                dup_ack_ul.remove(&ack);
            }
            if downlink {
                dup_ack_dl.remove(&ack);
            }
        }
    }
}

/// Fill host/domain names and the download counter from the parsed HTTP
/// messages.
fn finish_naming(session: &mut Session, _packets: &[PacketRecord]) {
    let mut remote_host = None;
    let mut domain = None;
    for message in &session.messages {
        if message.is_request() {
            if domain.is_none() {
                if let Some(host) = message.host_name.clone() {
                    remote_host = Some(host.clone());
                    domain = Some(
                        message
                            .referrer_host()
                            .unwrap_or(host),
                    );
                }
            }
        } else if message.content_length > 0 {
            session.file_download_count += 1;
        }
    }
    if let Some(host) = remote_host {
        session.remote_host_name = Some(host);
    }
    if domain.is_some() {
        session.domain_name = domain;
    }
    if session.domain_name.is_none() {
        session.domain_name = Some(
            session
                .remote_host_name
                .clone()
                .unwrap_or_else(|| session.key.remote_ip.to_string()),
        );
    }
}

/// Group UDP packets that are not part of a TCP session's DNS exchange
/// into UDP-only sessions with payload-offset reassembly.
fn build_udp_sessions(
    udp_packets: &[usize],
    tcp_sessions: &[Session],
    packets: &[PacketRecord],
    tags: &mut TagTable,
) -> Vec<Session> {
    // Drop the DNS packets already accounted to a TCP session.
    let mut remaining: Vec<usize> = udp_packets.to_vec();
    for session in tcp_sessions {
        remaining.retain(|&index| {
            let Some(dns) = packets[index].udp().and_then(|u| u.dns.as_ref()) else {
                return true;
            };
            if !dns.is_response {
                if let Some(request) = session.dns_request {
                    if let Some(session_dns) = packets[request].udp().and_then(|u| u.dns.as_ref()) {
                        if session_dns.domain_name == dns.domain_name {
                            return false;
                        }
                    }
                }
            } else if let Some(response) = session.dns_response {
                if let Some(session_dns) = packets[response].udp().and_then(|u| u.dns.as_ref()) {
                    if session_dns.domain_name == dns.domain_name
                        && dns.addresses.contains(&session.key.remote_ip)
                    {
                        return false;
                    }
                }
            }
            true
        });
    }

    let mut sessions: Vec<Session> = Vec::new();
    let mut by_key: HashMap<SessionKey, usize> = HashMap::new();
    for &index in &remaining {
        let packet = &packets[index];
        let Some(udp) = packet.udp() else { continue };
        let (local_port, remote_ip, remote_port) = match packet.direction {
            Direction::Uplink => (udp.src_port, packet.dst_ip, udp.dst_port),
            Direction::Downlink => (udp.dst_port, packet.src_ip, udp.src_port),
            Direction::Unknown => {
                warn!(packet = packet.id, "unable to determine packet direction");
                continue;
            }
        };
        let key = SessionKey { local_port, remote_ip, remote_port };
        let session_index = match by_key.get(&key) {
            Some(&existing) => existing,
            None => {
                let mut session = Session::new(key);
                session.udp_only = true;
                if let Some(dns) = udp.dns.as_ref() {
                    session.remote_host_name = Some(dns.domain_name.clone());
                }
                if session.remote_host_name.is_none() {
                    session.remote_host_name = Some(remote_ip.to_string());
                }
                sessions.push(session);
                by_key.insert(key, sessions.len() - 1);
                sessions.len() - 1
            }
        };
        sessions[session_index].packet_indices.push(index);
    }

    for session in sessions.iter_mut() {
        let mut uplink = Reassembler::new();
        let mut downlink = Reassembler::new();
        for &index in &session.packet_indices {
            match packets[index].direction {
                Direction::Uplink => uplink.append_udp(index, packets),
                Direction::Downlink => downlink.append_udp(index, packets),
                Direction::Unknown => {
                    warn!(packet = packets[index].id, "no direction for packet");
                    continue;
                }
            }
            session.bytes_transferred += packets[index].payload_len() as u64;
        }
        session.uplink = uplink.finish(packets, tags);
        session.downlink = downlink.finish(packets, tags);

        http::parser::parse_session(session, packets);
        finish_naming(session, packets);
    }

    sessions
}

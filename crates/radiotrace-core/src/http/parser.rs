//! Frame extraction: walks each direction's reassembled stream, emits
//! ordered messages, pairs requests with responses, and builds the
//! per-transaction timing breakdown.

use std::collections::VecDeque;

use tracing::warn;

use crate::session::{Session, StreamBuffer};
use crate::trace::{Direction, PacketRecord};

use super::headers::parse_header_line;
use super::reader::ByteLineReader;
use super::{HttpDirection, HttpRequestResponseInfo, RequestResponseTimeline};

const REQUEST_METHODS: [&str; 7] = ["GET", "PUT", "POST", "HEAD", "DELETE", "OPTIONS", "CONNECT"];

/// Parse both streams of a session into `session.messages`.
pub fn parse_session(session: &mut Session, packets: &[PacketRecord]) {
    let mut messages = Vec::new();
    extract_messages(session, Direction::Uplink, packets, &mut messages);
    extract_messages(session, Direction::Downlink, packets, &mut messages);

    // Time order across both directions.
    messages.sort_by(|a, b| {
        message_time(a, packets).total_cmp(&message_time(b, packets))
    });

    if !session.udp_only && !messages.is_empty() {
        pair_messages(&mut messages);
        build_timelines(session, packets, &mut messages);
    }
    session.messages = messages;
}

fn message_time(message: &HttpRequestResponseInfo, packets: &[PacketRecord]) -> f64 {
    message
        .first_data_packet
        .and_then(|index| packets.get(index))
        .map(|packet| packet.timestamp)
        .unwrap_or(0.0)
}

/// Requests pair with the next unmatched response, FIFO per session.
fn pair_messages(messages: &mut [HttpRequestResponseInfo]) {
    let mut pending: VecDeque<usize> = VecDeque::new();
    for index in 0..messages.len() {
        match messages[index].direction {
            HttpDirection::Request => pending.push_back(index),
            HttpDirection::Response => {
                if let Some(request) = pending.pop_front() {
                    messages[index].assoc = Some(request);
                    messages[request].assoc = Some(index);
                }
            }
        }
    }
}

/// DNS lookup and TCP connect are credited to the first pair only; the
/// remaining durations depend on whether an SSL handshake was seen and
/// whether the response overlaps the request in time.
fn build_timelines(
    session: &Session,
    packets: &[PacketRecord],
    messages: &mut [HttpRequestResponseInfo],
) {
    let mut dns = match (session.dns_request, session.dns_response) {
        (Some(request), Some(_)) => Some(packets[request].timestamp),
        _ => None,
    };
    let mut syn_time = session
        .packet_indices
        .iter()
        .find(|&&index| packets[index].tcp().map(|t| t.syn).unwrap_or(false))
        .map(|&index| packets[index].timestamp);
    let ssl_negotiation_time = session
        .last_ssl_handshake
        .and_then(|index| packets.get(index))
        .map(|packet| packet.timestamp);

    for index in 0..messages.len() {
        if messages[index].direction != HttpDirection::Request {
            continue;
        }
        let Some(response_index) = messages[index].assoc else {
            continue;
        };
        let (Some(first_request), Some(last_request)) =
            (messages[index].first_data_packet, messages[index].last_data_packet)
        else {
            continue;
        };
        let response = &messages[response_index];
        let (Some(first_response), Some(last_response)) =
            (response.first_data_packet, response.last_data_packet)
        else {
            continue;
        };

        let first_request_ts = packets[first_request].timestamp;
        let last_request_ts = packets[last_request].timestamp;
        let first_response_ts = packets[first_response].timestamp;
        let last_response_ts = packets[last_response].timestamp;

        let mut start_time = -1.0;
        let mut dns_lookup_duration = None;
        if let Some(dns_ts) = dns.take() {
            start_time = dns_ts;
            dns_lookup_duration = Some(match syn_time {
                Some(syn) => syn - dns_ts,
                None => first_request_ts - dns_ts,
            });
        }
        let mut initial_connection_duration = None;
        if let Some(syn) = syn_time.take() {
            initial_connection_duration = Some(first_request_ts - syn);
            if start_time < 0.0 {
                start_time = syn;
            }
        }
        if start_time < 0.0 {
            start_time = first_request_ts;
        }

        let timeline = if let Some(ssl_ts) = ssl_negotiation_time {
            RequestResponseTimeline {
                start_time,
                dns_lookup_duration,
                initial_connection_duration,
                ssl_negotiation_duration: Some(ssl_ts - first_request_ts),
                request_duration: 0.0,
                time_to_first_byte: 0.0,
                content_download_duration: last_response_ts - ssl_ts,
            }
        } else if first_response_ts >= last_request_ts {
            RequestResponseTimeline {
                start_time,
                dns_lookup_duration,
                initial_connection_duration,
                ssl_negotiation_duration: None,
                request_duration: last_request_ts - first_request_ts,
                time_to_first_byte: first_response_ts - last_request_ts,
                content_download_duration: last_response_ts - first_response_ts,
            }
        } else {
            // Response interleaves with the request; only the total
            // transfer time is meaningful.
            RequestResponseTimeline {
                start_time,
                dns_lookup_duration,
                initial_connection_duration,
                ssl_negotiation_duration: None,
                request_duration: 0.0,
                time_to_first_byte: 0.0,
                content_download_duration: last_response_ts - first_request_ts,
            }
        };
        messages[index].timeline = Some(timeline);
    }
}

/// Scan one direction's stream for messages.
fn extract_messages(
    session: &Session,
    direction: Direction,
    packets: &[PacketRecord],
    messages: &mut Vec<HttpRequestResponseInfo>,
) {
    let buffer = session.buffer(direction);
    let mut reader = ByteLineReader::new(&buffer.storage);

    loop {
        let Some((mut message, parsed_headers)) =
            next_message(&mut reader, session, direction, buffer, packets)
        else {
            break;
        };
        if !parsed_headers {
            // Opaque block, already framed in full.
            messages.push(message);
            continue;
        }

        // Header block, then body framing at the blank line.
        let mut complete = false;
        while let Some(line) = reader.read_line() {
            if line.is_empty() {
                frame_body(&mut reader, &mut message);
                let end = reader.index().saturating_sub(1);
                message.first_data_packet = buffer.packet_at(message.rr_start, packets);
                message.last_data_packet = buffer.packet_at(end, packets);
                message.raw_size = reader.index() - message.rr_start;
                complete = true;
                break;
            }
            parse_header_line(&line, &mut message);
        }
        if complete {
            messages.push(message);
        }
        // An incomplete header block (capture cut off) is dropped.
        if reader.at_end() {
            break;
        }
    }
}

/// Read past any blank separators and start the next message. Returns the
/// message and whether its headers remain to be parsed (`false` for the
/// opaque fallback, which is consumed here in full).
fn next_message(
    reader: &mut ByteLineReader<'_>,
    session: &Session,
    direction: Direction,
    buffer: &StreamBuffer,
    packets: &[PacketRecord],
) -> Option<(HttpRequestResponseInfo, bool)> {
    let mut start = reader.index();
    let mut line = reader.read_line()?;
    while line.is_empty() {
        start = reader.index();
        line = reader.read_line()?;
    }

    if let Some(mut message) = match_request_line(&line, start) {
        message.host_name = session.remote_host_name.clone();
        if let Some(host) = absolute_uri_host(message.obj_name.as_deref()) {
            message.host_name = Some(host);
        }
        message.port = Some(match direction {
            Direction::Downlink => session.key.local_port,
            _ => session.key.remote_port,
        });
        return Some((message, true));
    }
    if let Some(mut message) = match_status_line(&line, start) {
        message.host_name = session.remote_host_name.clone();
        return Some((message, true));
    }

    // Not HTTP: treat everything up to the next blank line as one opaque
    // message (covers TLS streams).
    let message_direction = match direction {
        Direction::Downlink => HttpDirection::Response,
        _ => HttpDirection::Request,
    };
    let mut message = HttpRequestResponseInfo::new(message_direction, start);
    message.host_name = session.remote_host_name.clone();
    message.ssl = session.ssl;
    while let Some(next) = reader.read_line() {
        if next.is_empty() {
            break;
        }
    }
    message.raw_size = reader.index() - start;
    if message_direction == HttpDirection::Response {
        // Actual content length is unknown, so headers are included.
        message.content_offsets.insert(start, message.raw_size);
    }
    message.first_data_packet = buffer.packet_at(start, packets);
    message.last_data_packet = buffer.packet_at(reader.index().saturating_sub(1), packets);
    Some((message, false))
}

/// `METHOD target VERSION` with a known method and HTTP/RTSP version.
fn match_request_line(line: &str, start: usize) -> Option<HttpRequestResponseInfo> {
    let mut tokens = line.split_whitespace();
    let method = tokens.next()?;
    if !REQUEST_METHODS.contains(&method) {
        return None;
    }
    let target = tokens.next()?;
    let version = tokens.next()?;
    if !version.starts_with("HTTP/") && !version.starts_with("RTSP/") {
        return None;
    }

    let mut message = HttpRequestResponseInfo::new(HttpDirection::Request, start);
    message.status_line = Some(line.to_string());
    message.request_type = Some(method.to_string());
    message.obj_name = Some(target.to_string());
    message.version = Some(version.to_string());
    message.scheme = version.split('/').next().map(String::from);
    Some(message)
}

/// `VERSION code reason`.
fn match_status_line(line: &str, start: usize) -> Option<HttpRequestResponseInfo> {
    let mut tokens = line.splitn(3, ' ');
    let version = tokens.next()?;
    if !version.starts_with("HTTP/") && !version.starts_with("RTSP/") {
        return None;
    }
    let code = tokens.next()?.parse::<u16>().ok()?;

    let mut message = HttpRequestResponseInfo::new(HttpDirection::Response, start);
    message.status_line = Some(line.to_string());
    message.version = Some(version.to_string());
    message.scheme = version.split('/').next().map(String::from);
    message.status_code = Some(code);
    message.response_result = tokens.next().map(String::from);
    Some(message)
}

/// Host component of an absolute request target, if it is one.
fn absolute_uri_host(target: Option<&str>) -> Option<String> {
    let target = target?;
    let after_scheme = target.split_once("://").map(|(_, rest)| rest)?;
    let host = after_scheme.split(['/', '?']).next()?.split(':').next()?;
    if host.is_empty() { None } else { Some(host.to_string()) }
}

/// Frame the message body after its blank line: a Content-Length skip or
/// the chunked loop recording each chunk's offset.
fn frame_body(reader: &mut ByteLineReader<'_>, message: &mut HttpRequestResponseInfo) {
    if message.content_length > 0 {
        message
            .content_offsets
            .insert(reader.index(), message.content_length as usize);
        reader.skip_forward(message.content_length as usize);
    } else if message.chunked {
        loop {
            let Some(line) = reader.read_line() else { break };
            let size_field = line.split(';').next().unwrap_or("").trim();
            let size = match usize::from_str_radix(size_field, 16) {
                Ok(size) => size,
                Err(_) => {
                    warn!(line = %line, "unparseable chunk size");
                    break;
                }
            };
            if size > 0 {
                message.content_offsets.insert(reader.index(), size);
                message.content_length += size as u64;
                reader.skip_forward(size);
                // CRLF terminating the chunk.
                if let Some(terminator) = reader.read_line() {
                    if !terminator.is_empty() {
                        warn!(line = %terminator, "unexpected end of chunk");
                    }
                }
            } else {
                message.chunk_mode_finished = true;
                if let Some(trailer) = reader.read_line() {
                    if !trailer.is_empty() {
                        warn!(line = %trailer, "unexpected end of chunked data");
                    }
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, SessionKey};
    use crate::trace::{TcpHeader, Transport};
    use std::net::{IpAddr, Ipv4Addr};

    fn make_session() -> Session {
        Session::new(SessionKey {
            local_port: 40000,
            remote_ip: IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
            remote_port: 80,
        })
    }

    /// Lay `data` into the session's buffer as a single packet, appending
    /// a matching packet record.
    fn load_stream(
        session: &mut Session,
        direction: Direction,
        packets: &mut Vec<PacketRecord>,
        timestamp: f64,
        data: &[u8],
    ) {
        let index = packets.len();
        packets.push(PacketRecord {
            id: index + 1,
            timestamp,
            direction,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
            ip_len: 40 + data.len(),
            transport: Transport::Tcp(TcpHeader {
                src_port: 40000,
                dst_port: 80,
                sequence: 0,
                ack_number: 0,
                window: 100,
                syn: false,
                ack: true,
                fin: false,
                rst: false,
                psh: false,
            }),
            payload: data.to_vec(),
            app_name: None,
        });
        session.packet_indices.push(index);
        let buffer = match direction {
            Direction::Downlink => &mut session.downlink,
            _ => &mut session.uplink,
        };
        let offset = buffer.storage.len();
        buffer.packet_offsets.insert(offset, index);
        buffer.storage.extend_from_slice(data);
    }

    #[test]
    fn request_and_response_with_bodies() {
        let mut session = make_session();
        let mut packets = Vec::new();
        load_stream(
            &mut session,
            Direction::Uplink,
            &mut packets,
            1.0,
            b"GET /index.html HTTP/1.1\r\nHost: www.example.com\r\n\r\n",
        );
        load_stream(
            &mut session,
            Direction::Downlink,
            &mut packets,
            2.0,
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello",
        );
        parse_session(&mut session, &packets);

        assert_eq!(session.messages.len(), 2);
        let request = &session.messages[0];
        assert_eq!(request.direction, HttpDirection::Request);
        assert_eq!(request.request_type.as_deref(), Some("GET"));
        assert_eq!(request.host_name.as_deref(), Some("www.example.com"));
        assert_eq!(request.port, Some(80));
        let response = &session.messages[1];
        assert_eq!(response.status_code, Some(200));
        assert_eq!(response.content_length, 5);
        assert_eq!(response.assoc, Some(0));
        assert_eq!(request.assoc, Some(1));
        // Body range covers exactly "hello".
        let (&offset, &len) = response.content_offsets.iter().next().unwrap();
        assert_eq!(&session.downlink.storage[offset..offset + len], b"hello");
    }

    #[test]
    fn chunked_response_records_each_chunk() {
        let mut session = make_session();
        let mut packets = Vec::new();
        load_stream(
            &mut session,
            Direction::Downlink,
            &mut packets,
            1.0,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n",
        );
        parse_session(&mut session, &packets);

        assert_eq!(session.messages.len(), 1);
        let response = &session.messages[0];
        assert!(response.chunked);
        assert!(response.chunk_mode_finished);
        assert_eq!(response.content_length, 9);
        assert_eq!(response.content_offsets.len(), 2);
        let body = response.content_bytes(&session.downlink).unwrap();
        assert_eq!(body, b"Wikipedia");
    }

    #[test]
    fn non_http_stream_becomes_opaque_message() {
        let mut session = make_session();
        session.ssl = true;
        let mut packets = Vec::new();
        load_stream(
            &mut session,
            Direction::Downlink,
            &mut packets,
            1.0,
            b"\x16\x03\x01random tls bytes\r\n\r\n",
        );
        parse_session(&mut session, &packets);
        assert_eq!(session.messages.len(), 1);
        let message = &session.messages[0];
        assert!(message.ssl);
        assert_eq!(message.direction, HttpDirection::Response);
        assert!(message.status_line.is_none());
        assert!(!message.content_offsets.is_empty());
    }

    #[test]
    fn multiple_requests_pair_fifo() {
        let mut session = make_session();
        let mut packets = Vec::new();
        load_stream(
            &mut session,
            Direction::Uplink,
            &mut packets,
            1.0,
            b"GET /a HTTP/1.1\r\n\r\n",
        );
        load_stream(
            &mut session,
            Direction::Downlink,
            &mut packets,
            2.0,
            b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nA",
        );
        load_stream(
            &mut session,
            Direction::Uplink,
            &mut packets,
            3.0,
            b"GET /b HTTP/1.1\r\n\r\n",
        );
        load_stream(
            &mut session,
            Direction::Downlink,
            &mut packets,
            4.0,
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 1\r\n\r\nB",
        );
        parse_session(&mut session, &packets);

        assert_eq!(session.messages.len(), 4);
        assert_eq!(session.messages[0].assoc, Some(1));
        assert_eq!(session.messages[1].assoc, Some(0));
        assert_eq!(session.messages[2].assoc, Some(3));
        assert_eq!(session.messages[3].assoc, Some(2));
        assert_eq!(session.messages[3].status_code, Some(404));
    }

    #[test]
    fn timeline_credits_dns_and_connect_to_first_pair() {
        let mut session = make_session();
        let mut packets = Vec::new();
        // Fake DNS request/response records.
        packets.push(PacketRecord {
            id: 1,
            timestamp: 0.1,
            direction: Direction::Uplink,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            ip_len: 60,
            transport: Transport::Tcp(TcpHeader {
                src_port: 5353,
                dst_port: 53,
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
        });
        session.dns_request = Some(0);
        session.dns_response = Some(0);
        // SYN at 0.3.
        let syn_index = packets.len();
        packets.push(PacketRecord {
            id: 2,
            timestamp: 0.3,
            direction: Direction::Uplink,
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
            ip_len: 40,
            transport: Transport::Tcp(TcpHeader {
                src_port: 40000,
                dst_port: 80,
                sequence: 0,
                ack_number: 0,
                window: 0,
                syn: true,
                ack: false,
                fin: false,
                rst: false,
                psh: false,
            }),
            payload: Vec::new(),
            app_name: None,
        });
        session.packet_indices.push(syn_index);
        load_stream(
            &mut session,
            Direction::Uplink,
            &mut packets,
            1.0,
            b"GET / HTTP/1.1\r\n\r\n",
        );
        load_stream(
            &mut session,
            Direction::Downlink,
            &mut packets,
            2.0,
            b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nZ",
        );
        parse_session(&mut session, &packets);

        let request = session
            .messages
            .iter()
            .find(|m| m.direction == HttpDirection::Request)
            .unwrap();
        let timeline = request.timeline.unwrap();
        assert!((timeline.start_time - 0.1).abs() < 1e-9);
        assert!((timeline.dns_lookup_duration.unwrap() - 0.2).abs() < 1e-9);
        assert!((timeline.initial_connection_duration.unwrap() - 0.7).abs() < 1e-9);
        assert!(timeline.ssl_negotiation_duration.is_none());
        assert!((timeline.time_to_first_byte - 1.0).abs() < 1e-9);
    }
}

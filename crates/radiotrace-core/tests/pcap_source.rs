//! Packet-source tests over synthetic capture files written to a temp
//! directory.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use radiotrace_core::trace::{Direction, Transport};
use radiotrace_core::{PacketSource, PcapFileSource, SourceError, source};

const LINKTYPE_RAW: u32 = 101;

fn temp_path(name: &str) -> PathBuf {
    let unique = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    std::env::temp_dir().join(format!("radiotrace_{name}_{unique}.pcap"))
}

/// Legacy pcap global header, microsecond timestamps, raw-IP linktype.
fn pcap_header() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0xa1b2c3d4u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes()); // major
    bytes.extend_from_slice(&4u16.to_le_bytes()); // minor
    bytes.extend_from_slice(&0i32.to_le_bytes()); // thiszone
    bytes.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
    bytes.extend_from_slice(&65535u32.to_le_bytes()); // snaplen
    bytes.extend_from_slice(&LINKTYPE_RAW.to_le_bytes());
    bytes
}

/// One raw IPv4+TCP frame with the given payload.
fn tcp_frame(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, seq: u32, flags: u8, payload: &[u8]) -> Vec<u8> {
    let total_len = 20 + 20 + payload.len();
    let mut ip = Vec::with_capacity(total_len);
    ip.push(0x45); // version 4, IHL 5
    ip.push(0);
    ip.extend_from_slice(&(total_len as u16).to_be_bytes());
    ip.extend_from_slice(&[0, 0, 0, 0]); // id, flags/frag
    ip.push(64); // ttl
    ip.push(6); // tcp
    ip.extend_from_slice(&[0, 0]); // checksum (unverified)
    ip.extend_from_slice(&src);
    ip.extend_from_slice(&dst);

    ip.extend_from_slice(&sport.to_be_bytes());
    ip.extend_from_slice(&dport.to_be_bytes());
    ip.extend_from_slice(&seq.to_be_bytes());
    ip.extend_from_slice(&0u32.to_be_bytes()); // ack number
    ip.push(5 << 4); // data offset
    ip.push(flags);
    ip.extend_from_slice(&1000u16.to_be_bytes()); // window
    ip.extend_from_slice(&[0, 0, 0, 0]); // checksum, urgent
    ip.extend_from_slice(payload);
    ip
}

fn record(ts_sec: u32, ts_usec: u32, frame: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&ts_sec.to_le_bytes());
    bytes.extend_from_slice(&ts_usec.to_le_bytes());
    bytes.extend_from_slice(&(frame.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(frame.len() as u32).to_le_bytes());
    bytes.extend_from_slice(frame);
    bytes
}

fn write_sample_capture(path: &PathBuf) {
    const SYN: u8 = 0x02;
    const ACK: u8 = 0x10;
    let local = [10, 0, 0, 1];
    let remote = [93, 184, 216, 34];

    let mut bytes = pcap_header();
    bytes.extend(record(100, 0, &tcp_frame(local, remote, 40000, 80, 1, SYN, b"")));
    bytes.extend(record(100, 200_000, &tcp_frame(remote, local, 80, 40000, 900, SYN | ACK, b"")));
    bytes.extend(record(101, 0, &tcp_frame(local, remote, 40000, 80, 2, ACK, b"hello")));
    fs::write(path, bytes).unwrap();
}

#[test]
fn pcap_source_reads_all_packets() {
    let path = temp_path("sample");
    write_sample_capture(&path);

    let mut pcap = PcapFileSource::open(&path).unwrap();
    let mut packets = 0;
    while let Some(_event) = pcap.next_packet().unwrap() {
        packets += 1;
    }
    let _ = fs::remove_file(&path);
    assert_eq!(packets, 3);
}

#[test]
fn read_capture_decodes_and_rebases() {
    let path = temp_path("decode");
    write_sample_capture(&path);
    let capture = source::read_capture_file(&path).unwrap();
    let _ = fs::remove_file(&path);

    assert_eq!(capture.packets.len(), 3);
    // Timestamps rebased to the first frame.
    assert!((capture.packets[0].timestamp).abs() < 1e-9);
    assert!((capture.trace_duration - 1.0).abs() < 1e-6);
    assert!((capture.base_timestamp - 100.0).abs() < 1e-9);

    // Direction inferred from the SYN sender.
    assert_eq!(capture.packets[0].direction, Direction::Uplink);
    assert_eq!(capture.packets[1].direction, Direction::Downlink);
    match &capture.packets[2].transport {
        Transport::Tcp(tcp) => {
            assert_eq!(tcp.dst_port, 80);
            assert_eq!(tcp.sequence, 2);
        }
        Transport::Udp(_) => panic!("expected tcp"),
    }
    assert_eq!(capture.packets[2].payload, b"hello");
    // Raw-IP framing: ip_len is the whole frame.
    assert_eq!(capture.packets[2].ip_len, 45);
}

#[test]
fn truncated_file_is_rejected() {
    let path = temp_path("truncated");
    fs::write(&path, [0x0a, 0x0d, 0x0d]).unwrap();
    let err = match PcapFileSource::open(&path) {
        Ok(_) => panic!("expected truncated file to be rejected"),
        Err(err) => err,
    };
    let _ = fs::remove_file(&path);
    assert!(matches!(err, SourceError::Io(_)));
}

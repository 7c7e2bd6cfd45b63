//! End-to-end pipeline tests over synthetic packet lists: known inputs
//! with field-level assertions on the full analysis result.

use std::net::{IpAddr, Ipv4Addr};

use radiotrace_core::analyze;
use radiotrace_core::profile::{Profile, ProfileLte};
use radiotrace_core::rrc::RrcState;
use radiotrace_core::trace::{
    AnalysisFilter, Direction, PacketRecord, TcpHeader, Telemetry, Transport, UserEvent,
    UserEventType,
};

const LOCAL: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
const REMOTE: IpAddr = IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34));

#[allow(clippy::too_many_arguments)]
fn tcp_packet(
    timestamp: f64,
    direction: Direction,
    seq: u32,
    ack: u32,
    payload: &[u8],
    syn: bool,
    fin: bool,
) -> PacketRecord {
    let (src_ip, dst_ip, src_port, dst_port) = match direction {
        Direction::Downlink => (REMOTE, LOCAL, 80, 40000),
        _ => (LOCAL, REMOTE, 40000, 80),
    };
    PacketRecord {
        id: 0,
        timestamp,
        direction,
        src_ip,
        dst_ip,
        ip_len: 40 + payload.len(),
        transport: Transport::Tcp(TcpHeader {
            src_port,
            dst_port,
            sequence: seq,
            ack_number: ack,
            window: 1000,
            syn,
            ack: !syn,
            fin,
            rst: false,
            psh: false,
        }),
        payload: payload.to_vec(),
        app_name: Some("browser".to_string()),
    }
}

/// A small but complete HTTP-over-TCP exchange.
fn http_exchange() -> Vec<PacketRecord> {
    let request = b"GET /index.html HTTP/1.1\r\nHost: www.example.com\r\n\r\n";
    let response = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
    vec![
        tcp_packet(1.0, Direction::Uplink, 100, 0, b"", true, false),
        tcp_packet(1.1, Direction::Downlink, 500, 101, b"", true, false),
        tcp_packet(1.2, Direction::Uplink, 101, 501, request, false, false),
        tcp_packet(1.5, Direction::Downlink, 501, 101 + request.len() as u32, response, false, false),
        tcp_packet(2.0, Direction::Uplink, 101 + request.len() as u32, 501 + response.len() as u32, b"", false, true),
    ]
}

#[test]
fn pipeline_reconstructs_http_session() {
    let result = analyze(
        http_exchange(),
        None,
        &AnalysisFilter::default(),
        &Telemetry::default(),
        30.0,
    );

    assert_eq!(result.sessions.len(), 1);
    let session = &result.sessions[0];
    assert_eq!(session.key.remote_ip, REMOTE);
    assert_eq!(session.key.remote_port, 80);
    assert_eq!(session.remote_host_name.as_deref(), Some("www.example.com"));
    assert_eq!(session.file_download_count, 1);
    assert!(session.termination.is_some());

    let request = session.messages.iter().find(|m| m.is_request()).unwrap();
    assert_eq!(request.request_type.as_deref(), Some("GET"));
    assert!(request.assoc.is_some());
    let response = &session.messages[request.assoc.unwrap()];
    assert_eq!(response.status_code, Some(200));
    assert_eq!(response.content_length, 5);
    assert_eq!(
        response.content_bytes(&session.downlink).unwrap(),
        b"hello"
    );
    assert!(request.timeline.is_some());
}

#[test]
fn rrc_ranges_tile_the_trace_for_every_technology() {
    for profile in [
        Profile::ThreeG(Default::default()),
        Profile::Lte(Default::default()),
        Profile::Wifi(Default::default()),
    ] {
        let result = analyze(
            http_exchange(),
            Some(profile),
            &AnalysisFilter::default(),
            &Telemetry::default(),
            30.0,
        );
        let ranges = &result.rrc.ranges;
        assert!(!ranges.is_empty());
        assert!((ranges[0].begin_time).abs() < 1e-9);
        for pair in ranges.windows(2) {
            assert!(pair[0].end_time <= pair[1].begin_time + 1e-9);
            assert!((pair[0].end_time - pair[1].begin_time).abs() < 1e-9, "gap in ranges");
        }
        assert!((ranges.last().unwrap().end_time - 30.0).abs() < 1e-9);
        assert!(result.rrc.total_rrc_energy > 0.0);
    }
}

#[test]
fn lte_promotion_example_matches_reference_layout() {
    // Single packet at t=5 with promotionTime=2, inactivityTimer=10:
    // IDLE [0,3), PROMOTION [3,5), tails from 5, trailing idle to 20
    // once the (shortened) DRX long timer exhausts.
    let mut lte = ProfileLte::default();
    lte.promotion_time = 2.0;
    lte.inactivity_timer = 10.0;
    lte.drx_long_time = 2.0;
    let packets = vec![tcp_packet(5.0, Direction::Uplink, 100, 0, b"x", false, false)];
    let result = analyze(
        packets,
        Some(Profile::Lte(lte)),
        &AnalysisFilter::default(),
        &Telemetry::default(),
        20.0,
    );

    let ranges = &result.rrc.ranges;
    assert_eq!(ranges[0].state, RrcState::LteIdle);
    assert!((ranges[0].end_time - 3.0).abs() < 1e-9);
    assert_eq!(ranges[1].state, RrcState::LtePromotion);
    assert!((ranges[1].begin_time - 3.0).abs() < 1e-9);
    assert!((ranges[1].end_time - 5.0).abs() < 1e-9);
    assert_eq!(ranges.last().unwrap().state, RrcState::LteIdle);
    assert!((ranges.last().unwrap().end_time - 20.0).abs() < 1e-9);
}

#[test]
fn bursts_partition_and_classify() {
    // Packets at t = 0, 1, 10 with burst_th 1.5 yield two bursts.
    let packets = vec![
        tcp_packet(0.0, Direction::Uplink, 100, 1, b"aa", false, false),
        tcp_packet(1.0, Direction::Uplink, 102, 1, b"bb", false, false),
        tcp_packet(10.0, Direction::Uplink, 104, 1, b"cc", false, false),
    ];
    let result = analyze(
        packets,
        None,
        &AnalysisFilter::default(),
        &Telemetry::default(),
        20.0,
    );

    assert_eq!(result.bursts.bursts.len(), 2);
    let flattened: Vec<usize> = result
        .bursts
        .bursts
        .iter()
        .flat_map(|b| b.packet_indices.clone())
        .collect();
    assert_eq!(flattened, vec![0, 1, 2]);
    // Total burst energy matches the per-burst sum.
    let sum: f64 = result.bursts.bursts.iter().map(|b| b.energy).sum();
    assert!((sum - result.bursts.total_energy).abs() < 1e-9);
}

#[test]
fn user_events_shift_classification() {
    let packets = vec![tcp_packet(5.0, Direction::Uplink, 100, 1, b"data", false, false)];
    let telemetry = Telemetry {
        user_events: vec![UserEvent {
            event_type: UserEventType::Touch,
            press_time: 4.7,
            release_time: 4.8,
        }],
        ..Telemetry::default()
    };
    let result = analyze(packets, None, &AnalysisFilter::default(), &telemetry, 20.0);
    assert_eq!(result.bursts.bursts.len(), 1);
    assert_eq!(
        result.bursts.bursts[0].category,
        radiotrace_core::BurstCategory::UserInput
    );
}

#[test]
fn statistic_reflects_session_bytes() {
    let result = analyze(
        http_exchange(),
        None,
        &AnalysisFilter::default(),
        &Telemetry::default(),
        30.0,
    );
    assert_eq!(result.statistic.total_packets, 5);
    assert_eq!(
        result.statistic.total_bytes,
        result.sessions.iter().map(|s| s.bytes_transferred).sum::<u64>()
    );
    assert!(!result.statistic.application_summaries.is_empty());
}

#[test]
fn repeated_content_byte_counts_are_identical() {
    let result = analyze(
        http_exchange(),
        None,
        &AnalysisFilter::default(),
        &Telemetry::default(),
        30.0,
    );
    let session = &result.sessions[0];
    let response = session.messages.iter().find(|m| !m.is_request()).unwrap();
    let first = response.actual_byte_count(&session.downlink);
    let second = response.actual_byte_count(&session.downlink);
    assert_eq!(first, 5);
    assert_eq!(first, second);
}

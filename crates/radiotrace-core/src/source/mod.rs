//! Packet sources: the external collaborators that hand the analysis its
//! decoded packet records.
//!
//! File I/O and low-level capture parsing stay here; the analysis layer
//! never touches the filesystem. A [`PacketSource`] yields raw frames,
//! [`read_capture`] decodes them into [`PacketRecord`]s with timestamps
//! rebased to the start of the trace.

pub mod decode;
pub mod pcap;

pub use pcap::PcapFileSource;

use std::path::Path;

use pcap_parser::Linktype;
use thiserror::Error;
use tracing::debug;

use crate::trace::{Direction, PacketRecord};
use decode::{DecodedFrame, decode_frame, infer_local_address, is_private_address};

/// One raw captured frame.
#[derive(Debug, Clone)]
pub struct PacketEvent {
    pub ts: Option<f64>,
    pub linktype: Linktype,
    pub data: Vec<u8>,
}

pub trait PacketSource {
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture parse error ({context}): {message}")]
    Pcap {
        context: &'static str,
        message: String,
    },
}

/// A decoded capture: packet records time-rebased to zero, plus the trace
/// duration.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub packets: Vec<PacketRecord>,
    pub trace_duration: f64,
    /// Wall-clock timestamp (unix seconds) of the first frame; packet
    /// timestamps are relative to it.
    pub base_timestamp: f64,
}

/// Open and decode a PCAP/PCAPNG file.
pub fn read_capture_file(path: &Path) -> Result<Capture, SourceError> {
    let source = PcapFileSource::open(path)?;
    read_capture(source)
}

/// Drain a packet source into a decoded capture.
///
/// Frames that fail to decode are logged and skipped. Direction is
/// inferred from the device address: the source of the first plain SYN,
/// falling back to a private-range heuristic. Records whose direction
/// cannot be determined keep `Direction::Unknown` and are excluded from
/// role analysis downstream.
pub fn read_capture<S: PacketSource>(mut source: S) -> Result<Capture, SourceError> {
    let mut frames: Vec<DecodedFrame> = Vec::new();
    while let Some(event) = source.next_packet()? {
        match decode_frame(&event) {
            Some(frame) => frames.push(frame),
            None => debug!("skipping undecodable frame"),
        }
    }
    if frames.is_empty() {
        return Ok(Capture::default());
    }

    frames.sort_by(|a, b| a.ts.total_cmp(&b.ts));
    let base_ts = frames[0].ts;
    let local_address = infer_local_address(&frames);

    let mut packets: Vec<PacketRecord> = Vec::with_capacity(frames.len());
    for frame in frames {
        let direction = match local_address {
            Some(local) if frame.src_ip == local => Direction::Uplink,
            Some(local) if frame.dst_ip == local => Direction::Downlink,
            Some(_) => Direction::Unknown,
            None => {
                // No SYN seen: fall back to address class.
                if is_private_address(frame.src_ip) && !is_private_address(frame.dst_ip) {
                    Direction::Uplink
                } else if is_private_address(frame.dst_ip) && !is_private_address(frame.src_ip) {
                    Direction::Downlink
                } else {
                    Direction::Unknown
                }
            }
        };
        packets.push(PacketRecord {
            id: 0,
            timestamp: frame.ts - base_ts,
            direction,
            src_ip: frame.src_ip,
            dst_ip: frame.dst_ip,
            ip_len: frame.ip_len,
            transport: frame.transport,
            payload: frame.payload,
            app_name: None,
        });
    }
    let trace_duration = packets.last().map(|p| p.timestamp).unwrap_or(0.0);
    Ok(Capture { packets, trace_duration, base_timestamp: base_ts })
}

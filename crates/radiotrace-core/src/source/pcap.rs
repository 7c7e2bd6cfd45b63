//! PCAP/PCAPNG file source.
//!
//! The container format is sniffed from the leading magic bytes; legacy
//! captures carry one linktype in the file header, PCAPNG one per
//! interface description block.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use pcap_parser::{
    Block, LegacyPcapReader, Linktype, PcapBlockOwned, PcapNGReader, traits::PcapReaderIterator,
};

use super::{PacketEvent, PacketSource, SourceError};

const READER_BUFFER_SIZE: usize = 128 * 1024;
const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

pub struct PcapFileSource {
    format: Format,
}

impl std::fmt::Debug for PcapFileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcapFileSource").finish_non_exhaustive()
    }
}

enum Format {
    Legacy {
        reader: LegacyPcapReader<File>,
        linktype: Option<Linktype>,
    },
    Ng {
        reader: PcapNGReader<File>,
        linktypes: Vec<Linktype>,
    },
}

impl PcapFileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let mut file = File::open(path)?;
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        file.seek(SeekFrom::Start(0))?;

        let format = if magic == PCAPNG_MAGIC {
            let reader =
                PcapNGReader::new(READER_BUFFER_SIZE, file).map_err(|e| SourceError::Pcap {
                    context: "pcapng reader init",
                    message: e.to_string(),
                })?;
            Format::Ng { reader, linktypes: Vec::new() }
        } else {
            let reader =
                LegacyPcapReader::new(READER_BUFFER_SIZE, file).map_err(|e| SourceError::Pcap {
                    context: "pcap reader init",
                    message: e.to_string(),
                })?;
            Format::Legacy { reader, linktype: None }
        };
        Ok(Self { format })
    }
}

impl PacketSource for PcapFileSource {
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        loop {
            match &mut self.format {
                Format::Legacy { reader, linktype } => match reader.next() {
                    Ok((offset, block)) => {
                        let event = match block {
                            PcapBlockOwned::LegacyHeader(header) => {
                                *linktype = Some(header.network);
                                None
                            }
                            PcapBlockOwned::Legacy(packet) => Some(PacketEvent {
                                ts: Some(packet.ts_sec as f64 + packet.ts_usec as f64 * 1e-6),
                                linktype: linktype.unwrap_or(Linktype::ETHERNET),
                                data: packet.data.to_vec(),
                            }),
                            _ => None,
                        };
                        reader.consume(offset);
                        if event.is_some() {
                            return Ok(event);
                        }
                    }
                    Err(pcap_parser::PcapError::Eof) => return Ok(None),
                    Err(pcap_parser::PcapError::Incomplete(_)) => {
                        reader.refill().map_err(|e| SourceError::Pcap {
                            context: "pcap reader refill",
                            message: e.to_string(),
                        })?;
                    }
                    Err(e) => {
                        return Err(SourceError::Pcap {
                            context: "pcap reader next",
                            message: e.to_string(),
                        });
                    }
                },
                Format::Ng { reader, linktypes } => match reader.next() {
                    Ok((offset, block)) => {
                        let event = match block {
                            PcapBlockOwned::NG(Block::InterfaceDescription(interface)) => {
                                linktypes.push(interface.linktype);
                                None
                            }
                            PcapBlockOwned::NG(Block::EnhancedPacket(packet)) => {
                                let linktype = linktypes
                                    .get(packet.if_id as usize)
                                    .copied()
                                    .unwrap_or(Linktype::ETHERNET);
                                Some(PacketEvent {
                                    ts: Some(pcapng_ts_to_seconds(packet.ts_high, packet.ts_low)),
                                    linktype,
                                    data: packet.data.to_vec(),
                                })
                            }
                            _ => None,
                        };
                        reader.consume(offset);
                        if event.is_some() {
                            return Ok(event);
                        }
                    }
                    Err(pcap_parser::PcapError::Eof) => return Ok(None),
                    Err(pcap_parser::PcapError::Incomplete(_)) => {
                        reader.refill().map_err(|e| SourceError::Pcap {
                            context: "pcapng reader refill",
                            message: e.to_string(),
                        })?;
                    }
                    Err(e) => {
                        return Err(SourceError::Pcap {
                            context: "pcapng reader next",
                            message: e.to_string(),
                        });
                    }
                },
            }
        }
    }
}

/// PCAPNG high/low timestamp words to seconds (microsecond resolution).
fn pcapng_ts_to_seconds(ts_high: u32, ts_low: u32) -> f64 {
    let ts = ((ts_high as u64) << 32) | (ts_low as u64);
    ts as f64 * 1e-6
}

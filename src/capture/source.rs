//! Frame sources: a live network interface or a capture file.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pcap_parser::pcapng::Block;
use pcap_parser::traits::{PcapNGPacketBlock, PcapReaderIterator};
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError, PcapNGReader};
use pnet::datalink::{self, Channel, Config, DataLinkReceiver};

use crate::capture::error::CaptureError;
use crate::capture::packet::{LinkType, RawFrame};

const PCAP_BUFFER_SIZE: usize = 65536;
/// First four bytes of a pcapng section header block, in either byte order.
const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

/// Outcome of one read from a frame source.
#[derive(Debug)]
pub enum SourceEvent {
    Frame(RawFrame),
    /// Nothing arrived within the read timeout.
    Idle,
    /// The source is exhausted.
    End,
}

/// Producer of link-layer frames for the capture loop.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<SourceEvent, CaptureError>;
}

/// Frames read live from a network interface through the OS packet socket.
pub struct LiveSource {
    interface: String,
    rx: Box<dyn DataLinkReceiver>,
}

impl LiveSource {
    pub fn open(interface: &str, promiscuous: bool, read_timeout: Duration) -> Result<Self, CaptureError> {
        let iface = datalink::interfaces()
            .into_iter()
            .find(|i| i.name == interface)
            .ok_or_else(|| CaptureError::InterfaceNotFound(interface.to_string()))?;

        let config = Config {
            read_timeout: Some(read_timeout),
            promiscuous,
            ..Default::default()
        };
        match datalink::channel(&iface, config)? {
            Channel::Ethernet(_, rx) => {
                tracing::info!(interface = %interface, promiscuous, "Capture device opened");
                Ok(Self {
                    interface: interface.to_string(),
                    rx,
                })
            }
            _ => Err(CaptureError::UnsupportedChannel(interface.to_string())),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl FrameSource for LiveSource {
    fn next_frame(&mut self) -> Result<SourceEvent, CaptureError> {
        match self.rx.next() {
            Ok(data) => Ok(SourceEvent::Frame(RawFrame {
                link: LinkType::Ethernet,
                data: data.to_vec(),
                timestamp: Utc::now(),
            })),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(SourceEvent::Idle)
            }
            Err(e) => Err(CaptureError::Io(e)),
        }
    }
}

type BoxedRead = Box<dyn Read + Send>;

/// Concrete pcap-parser reader for the detected file format.
enum PcapReader {
    Legacy(LegacyPcapReader<BoxedRead>),
    Ng(PcapNGReader<BoxedRead>),
}

impl PcapReader {
    fn open(reader: BoxedRead) -> Result<Self, CaptureError> {
        let mut reader = BufReader::with_capacity(PCAP_BUFFER_SIZE, reader);
        let is_ng = reader.fill_buf()?.starts_with(&PCAPNG_MAGIC);
        let reader: BoxedRead = Box::new(reader);
        let opened = if is_ng {
            PcapNGReader::new(PCAP_BUFFER_SIZE, reader).map(Self::Ng)
        } else {
            LegacyPcapReader::new(PCAP_BUFFER_SIZE, reader).map(Self::Legacy)
        };
        opened.map_err(|e| CaptureError::Pcap(format!("{:?}", e)))
    }

    fn blocks(&mut self) -> &mut dyn PcapReaderIterator {
        match self {
            Self::Legacy(reader) => reader,
            Self::Ng(reader) => reader,
        }
    }
}

/// Frames replayed from a legacy pcap or pcapng file.
pub struct PcapFileSource {
    reader: PcapReader,
    /// Link type of the legacy header, or of each pcapng interface in order.
    links: Vec<Option<LinkType>>,
    frames: u64,
}

impl PcapFileSource {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Result<Self, CaptureError> {
        Ok(Self {
            reader: PcapReader::open(Box::new(reader))?,
            links: Vec::new(),
            frames: 0,
        })
    }

    /// Frames delivered so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn link(&self, interface: usize) -> Result<LinkType, CaptureError> {
        match self.links.get(interface) {
            Some(Some(link)) => Ok(*link),
            Some(None) | None => Err(CaptureError::Pcap(format!(
                "packet references unknown or unsupported interface {}",
                interface
            ))),
        }
    }
}

impl FrameSource for PcapFileSource {
    fn next_frame(&mut self) -> Result<SourceEvent, CaptureError> {
        loop {
            let frame = match self.reader.blocks().next() {
                Ok((offset, block)) => {
                    let frame = match block {
                        PcapBlockOwned::LegacyHeader(header) => {
                            let link = LinkType::from_linktype(header.network.0)
                                .ok_or(CaptureError::UnsupportedLinkType(header.network.0))?;
                            self.links = vec![Some(link)];
                            None
                        }
                        PcapBlockOwned::Legacy(packet) => Some((
                            0,
                            timestamp(i64::from(packet.ts_sec), packet.ts_usec),
                            packet.data.to_vec(),
                        )),
                        PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                            let link = LinkType::from_linktype(idb.linktype.0);
                            if link.is_none() {
                                tracing::warn!(linktype = idb.linktype.0, "Skipping interface with unsupported link type");
                            }
                            self.links.push(link);
                            None
                        }
                        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                            // Default pcapng resolution is microseconds.
                            let micros = (u64::from(epb.ts_high) << 32) | u64::from(epb.ts_low);
                            Some((
                                epb.if_id as usize,
                                timestamp((micros / 1_000_000) as i64, (micros % 1_000_000) as u32),
                                epb.packet_data().to_vec(),
                            ))
                        }
                        _ => None,
                    };
                    self.reader.blocks().consume(offset);
                    frame
                }
                Err(PcapError::Eof) => return Ok(SourceEvent::End),
                Err(PcapError::Incomplete(_)) => {
                    self.reader
                        .blocks()
                        .refill()
                        .map_err(|e| CaptureError::Pcap(format!("{:?}", e)))?;
                    continue;
                }
                Err(e) => return Err(CaptureError::Pcap(format!("{:?}", e))),
            };

            if let Some((interface, timestamp, data)) = frame {
                let link = match self.link(interface) {
                    Ok(link) => link,
                    Err(e) => {
                        tracing::debug!(error = %e, "Skipping frame");
                        continue;
                    }
                };
                self.frames += 1;
                return Ok(SourceEvent::Frame(RawFrame {
                    link,
                    data,
                    timestamp,
                }));
            }
        }
    }
}

fn timestamp(secs: i64, micros: u32) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, micros.saturating_mul(1000)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_pcap(linktype: u32, frames: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&65535u32.to_le_bytes());
        out.extend_from_slice(&linktype.to_le_bytes());
        for (i, frame) in frames.iter().enumerate() {
            out.extend_from_slice(&(1_700_000_000u32 + i as u32).to_le_bytes());
            out.extend_from_slice(&250_000u32.to_le_bytes());
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(frame);
        }
        out
    }

    #[test]
    fn reads_legacy_frames_then_end() {
        let bytes = legacy_pcap(101, &[b"\x45first", b"\x45second"]);
        let mut source = PcapFileSource::from_reader(std::io::Cursor::new(bytes)).unwrap();

        let SourceEvent::Frame(first) = source.next_frame().unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(first.link, LinkType::Raw);
        assert_eq!(first.data, b"\x45first");
        assert_eq!(first.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(first.timestamp.timestamp_subsec_micros(), 250_000);

        assert!(matches!(source.next_frame().unwrap(), SourceEvent::Frame(_)));
        assert!(matches!(source.next_frame().unwrap(), SourceEvent::End));
        assert_eq!(source.frames(), 2);
    }

    #[test]
    fn rejects_unsupported_link_type() {
        let bytes = legacy_pcap(147, &[b"x"]);
        let mut source = PcapFileSource::from_reader(std::io::Cursor::new(bytes)).unwrap();
        assert!(matches!(
            source.next_frame(),
            Err(CaptureError::UnsupportedLinkType(147))
        ));
    }

    fn pcapng(linktype: u16, frame: &[u8], micros: u64) -> Vec<u8> {
        let mut out = Vec::new();
        // Section header
        out.extend_from_slice(&0x0a0d_0d0au32.to_le_bytes());
        out.extend_from_slice(&28u32.to_le_bytes());
        out.extend_from_slice(&0x1a2b_3c4du32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(-1i64).to_le_bytes());
        out.extend_from_slice(&28u32.to_le_bytes());
        // Interface description
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&20u32.to_le_bytes());
        out.extend_from_slice(&linktype.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&65535u32.to_le_bytes());
        out.extend_from_slice(&20u32.to_le_bytes());
        // Enhanced packet
        let padded = (frame.len() + 3) / 4 * 4;
        let len = 32 + padded as u32;
        out.extend_from_slice(&6u32.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&((micros >> 32) as u32).to_le_bytes());
        out.extend_from_slice(&(micros as u32).to_le_bytes());
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        out.extend_from_slice(frame);
        out.resize(out.len() + padded - frame.len(), 0);
        out.extend_from_slice(&len.to_le_bytes());
        out
    }

    #[test]
    fn reads_pcapng_frames() {
        let bytes = pcapng(101, b"\x45ng", 1_700_000_000_500_000);
        let mut source = PcapFileSource::from_reader(std::io::Cursor::new(bytes)).unwrap();

        let SourceEvent::Frame(frame) = source.next_frame().unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.link, LinkType::Raw);
        assert_eq!(frame.data, b"\x45ng");
        assert_eq!(frame.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(frame.timestamp.timestamp_subsec_micros(), 500_000);
        assert!(matches!(source.next_frame().unwrap(), SourceEvent::End));
    }

    #[test]
    fn file_source_moves_to_a_blocking_thread() {
        fn assert_send<T: Send + 'static>(_: &T) {}

        let bytes = legacy_pcap(101, &[b"\x45first"]);
        let mut source = PcapFileSource::from_reader(std::io::Cursor::new(bytes)).unwrap();
        assert_send(&source);
        let boxed: Box<dyn FrameSource> = Box::new(PcapFileSource::from_reader(std::io::Cursor::new(
            legacy_pcap(101, &[]),
        ))
        .unwrap());
        drop(boxed);

        let frames = std::thread::spawn(move || {
            let mut frames = 0;
            while let SourceEvent::Frame(_) = source.next_frame().unwrap() {
                frames += 1;
            }
            frames
        })
        .join()
        .unwrap();
        assert_eq!(frames, 1);
    }

    #[test]
    fn garbage_file_is_an_error() {
        let result = PcapFileSource::from_reader(std::io::Cursor::new(b"definitely not a capture".to_vec()));
        assert!(result.is_err());
    }
}

//! Module to extract TCP segments from PCAP files written by the simulator.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Read},
    net::IpAddr,
    path::Path,
};

use etherparse::{InternetSlice, SlicedPacket, TransportSlice};
use flate2::bufread::GzDecoder;
use pcap_file::{pcap::PcapReader, DataLink};

use crate::segment::Segment;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Pcap error: {0}")]
    Pcap(#[from] pcap_file::PcapError),
    #[error("Unsupported link type {0:?}, expected Ethernet, raw IP or PPP.")]
    UnsupportedLinkType(DataLink),
}

/// How sequence and acknowledgment numbers are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SequenceNumbering {
    /// Report the numbers exactly as captured. ns-3 starts every connection at 0, so these are
    /// already relative.
    #[default]
    Absolute,
    /// Subtract the first sequence number observed in each direction of a connection, like
    /// wireshark's relative sequence numbers.
    Relative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Flow {
    src_ip: IpAddr,
    src_port: u16,
    dst_ip: IpAddr,
    dst_port: u16,
}

impl Flow {
    fn reversed(&self) -> Self {
        Self {
            src_ip: self.dst_ip,
            src_port: self.dst_port,
            dst_ip: self.src_ip,
            dst_port: self.src_port,
        }
    }
}

/// Restricts which TCP packets are turned into segments. An empty filter matches everything.
#[derive(Clone, Debug, Default)]
pub struct SegmentFilter {
    /// match packets where either the source or destination port is equal
    pub port: Option<u16>,
    /// match packets where either the source or destination address is equal
    pub host: Option<IpAddr>,
}

impl SegmentFilter {
    /// Create the most basic `SegmentFilter`
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder API: Assign port filter.
    pub fn port(&mut self, port: u16) -> &mut Self {
        self.port = Some(port);
        self
    }

    /// Builder API: Assign host filter.
    pub fn host(&mut self, host: IpAddr) -> &mut Self {
        self.host = Some(host);
        self
    }

    fn matches(&self, flow: &Flow) -> bool {
        self.port
            .map_or(true, |p| flow.src_port == p || flow.dst_port == p)
            && self
                .host
                .map_or(true, |h| flow.src_ip == h || flow.dst_ip == h)
    }
}

/// An iterator over all TCP segments in a PCAP file, in capture order.
pub struct SegmentReader {
    cap: PcapReader<Box<dyn Read>>,
    datalink: DataLink,
    filter: SegmentFilter,
    numbering: SequenceNumbering,
    initial_seqs: HashMap<Flow, u32>,
    last_timestamp: f64,
}

impl SegmentReader {
    /// Open a capture file. Files ending in `.gz` are decompressed on the fly.
    pub fn open(filename: impl AsRef<Path>) -> Result<Self, Error> {
        let filename = filename.as_ref();
        let bufreader = BufReader::new(File::open(filename)?);
        let reader: Box<dyn Read> = if filename.extension().is_some_and(|ext| ext == "gz") {
            Box::new(GzDecoder::new(bufreader))
        } else {
            Box::new(bufreader)
        };
        Self::new(reader)
    }

    /// Create a reader from any source of pcap bytes.
    pub fn new(reader: impl Read + 'static) -> Result<Self, Error> {
        let reader: Box<dyn Read> = Box::new(reader);
        let cap = PcapReader::new(reader)?;
        let datalink = cap.header().datalink;
        match datalink {
            DataLink::ETHERNET | DataLink::RAW | DataLink::IPV4 | DataLink::IPV6 | DataLink::PPP => {}
            other => return Err(Error::UnsupportedLinkType(other)),
        }
        log::debug!("Reading capture with link type {datalink:?}");

        Ok(Self {
            cap,
            datalink,
            filter: SegmentFilter::default(),
            numbering: SequenceNumbering::default(),
            initial_seqs: HashMap::new(),
            last_timestamp: f64::NEG_INFINITY,
        })
    }

    /// Only yield segments matching the filter.
    pub fn with_filter(mut self, filter: SegmentFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Choose how sequence numbers are reported.
    pub fn with_numbering(mut self, numbering: SequenceNumbering) -> Self {
        self.numbering = numbering;
        self
    }
}

fn slice(datalink: DataLink, data: &[u8]) -> Option<SlicedPacket<'_>> {
    match datalink {
        DataLink::ETHERNET => SlicedPacket::from_ethernet(data).ok(),
        DataLink::PPP => {
            // optional address and control bytes, then the 2 byte protocol field
            let header_len = if data.starts_with(&[0xff, 0x03]) { 4 } else { 2 };
            SlicedPacket::from_ip(data.get(header_len..)?).ok()
        }
        _ => SlicedPacket::from_ip(data).ok(),
    }
}

/// Rewrite the numbers relative to the first sequence number seen in each direction.
fn relative(
    initial_seqs: &mut HashMap<Flow, u32>,
    flow: Flow,
    seq: u32,
    ack: u32,
    has_ack: bool,
) -> (u32, u32) {
    let isn = *initial_seqs.entry(flow).or_insert(seq);
    let seq = seq.wrapping_sub(isn);
    let ack = match initial_seqs.get(&flow.reversed()) {
        Some(peer_isn) if has_ack => ack.wrapping_sub(*peer_isn),
        _ => ack,
    };
    (seq, ack)
}

impl Iterator for SegmentReader {
    type Item = Result<Segment, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let packet = match self.cap.next_packet()? {
                Ok(packet) => packet,
                Err(e) => return Some(Err(e.into())),
            };
            let timestamp = packet.timestamp.as_secs_f64();

            let Some(pkt) = slice(self.datalink, &packet.data) else {
                log::warn!("Skipping packet at {timestamp} that cannot be parsed");
                continue;
            };
            let (src_ip, dst_ip) = match &pkt.net {
                Some(InternetSlice::Ipv4(ip)) => (
                    IpAddr::V4(ip.header().source_addr()),
                    IpAddr::V4(ip.header().destination_addr()),
                ),
                Some(InternetSlice::Ipv6(ip)) => (
                    IpAddr::V6(ip.header().source_addr()),
                    IpAddr::V6(ip.header().destination_addr()),
                ),
                _ => {
                    log::trace!("Skipping non-IP packet at {timestamp}");
                    continue;
                }
            };
            let Some(TransportSlice::Tcp(tcp)) = &pkt.transport else {
                log::trace!("Skipping non-TCP packet at {timestamp}");
                continue;
            };

            let flow = Flow {
                src_ip,
                src_port: tcp.source_port(),
                dst_ip,
                dst_port: tcp.destination_port(),
            };
            if !self.filter.matches(&flow) {
                continue;
            }

            let (seq, ack) = match self.numbering {
                SequenceNumbering::Absolute => (tcp.sequence_number(), tcp.acknowledgment_number()),
                SequenceNumbering::Relative => relative(
                    &mut self.initial_seqs,
                    flow,
                    tcp.sequence_number(),
                    tcp.acknowledgment_number(),
                    tcp.ack(),
                ),
            };

            if timestamp < self.last_timestamp {
                log::warn!(
                    "Capture is not ordered by time: {timestamp} after {}",
                    self.last_timestamp
                );
            }
            self.last_timestamp = timestamp;

            return Some(Ok(Segment {
                seq,
                ack,
                timestamp,
                payload_len: tcp.payload().len(),
            }));
        }
    }
}

/// Read all TCP segments of a capture file.
pub fn read_segments(
    filename: impl AsRef<Path>,
    filter: SegmentFilter,
    numbering: SequenceNumbering,
) -> Result<Vec<Segment>, Error> {
    let filename = filename.as_ref();
    log::info!("Loading: {filename:?}");
    SegmentReader::open(filename)?
        .with_filter(filter)
        .with_numbering(numbering)
        .collect()
}

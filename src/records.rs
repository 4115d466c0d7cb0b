// NRTRACE: Post-Processing of 5G NR Simulation Traces into Diagnostic Charts
// Copyright (C) 2025 The NRTRACE authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Module defining record data types to deserialize the tab-separated simulator traces.
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::rtt::Segment;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Trace {0:?} does not exist.")]
    MissingTrace(PathBuf),
    #[error("Cannot read trace {path:?}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("Malformed segment in {path:?} on line {line}: missing field `{field}`")]
    MalformedSegment {
        path: PathBuf,
        line: u64,
        field: &'static str,
    },
    #[error("Malformed segment in {path:?} on line {line}: invalid value {value:?} of `{field}`")]
    InvalidSegmentField {
        path: PathBuf,
        line: u64,
        field: &'static str,
        value: String,
    },
}

/// UE positions, `mobilityPosition.txt`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MobilityRecord {
    #[serde(rename = "Time")]
    pub time: f64,
    #[serde(rename = "UE")]
    pub ue: u64,
    pub x: f64,
    pub y: f64,
}

/// Downlink control or data SINR, `DlCtrlSinr.txt` and `DlDataSinr.txt`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinrRecord {
    #[serde(rename = "Time")]
    pub time: f64,
    #[serde(rename = "RNTI")]
    pub rnti: u16,
    #[serde(rename = "SINR(dB)")]
    pub sinr: f64,
}

/// Received transport blocks, `RxPacketTrace.txt`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RxPacketRecord {
    #[serde(rename = "Time")]
    pub time: f64,
    pub direction: String,
    pub rnti: u16,
    #[serde(rename = "CQI")]
    pub cqi: f64,
    #[serde(rename = "TBler")]
    pub tbler: f64,
}

impl RxPacketRecord {
    pub fn is_downlink(&self) -> bool {
        self.direction == "DL"
    }
}

/// Downlink path loss, `DlPathlossTrace.txt`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PathlossRecord {
    #[serde(rename = "Time(sec)")]
    pub time: f64,
    #[serde(rename = "IMSI")]
    pub imsi: u64,
    #[serde(rename = "pathLoss(dB)")]
    pub path_loss: f64,
}

/// PDCP packets, `NrDlPdcpTxStats.txt` and `NrDlPdcpRxStats.txt`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PdcpRecord {
    #[serde(rename = "time(s)")]
    pub time: f64,
    pub rnti: u16,
    #[serde(rename = "packetSize")]
    pub packet_size: f64,
    /// only present in the receive trace
    #[serde(rename = "delay(s)", default)]
    pub delay: Option<f64>,
}

/// RLC buffer state, `RlcBufferStat_<ip>_.txt`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RlcBufferRecord {
    #[serde(rename = "Time")]
    pub time: f64,
    #[serde(rename = "PacketSize", default)]
    pub packet_size: f64,
    #[serde(rename = "dropSize", default)]
    pub drop_size: f64,
    #[serde(rename = "txBufferSize", default)]
    pub tx_buffer_size: f64,
    #[serde(rename = "NumOfBuffers", default)]
    pub num_of_buffers: f64,
}

impl RlcBufferRecord {
    /// Packets larger than an MTU are downlink data.
    pub fn is_downlink(&self) -> bool {
        self.packet_size > 1500.0
    }
}

/// Round trip time samples of the TCP socket, `tcp-delay.txt`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TcpDelayRecord {
    #[serde(rename = "Time")]
    pub time: f64,
    /// seconds
    pub rtt: f64,
}

/// Traced value changes, `tcp-cwnd-*.txt` and `tcp-inflight-*.txt`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TracedValueRecord {
    #[serde(rename = "Time")]
    pub time: f64,
    pub oldval: f64,
    pub newval: f64,
}

/// Received UDP packets, `UdpRecv_Node<n>.txt`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UdpRecvRecord {
    #[serde(rename = "Packet Sequence")]
    pub sequence: i64,
}

/// One line of a tshark field dump, e.g.
/// `tshark -r cap.pcap -Y tcp -T fields -E header=y -e frame.time_epoch -e tcp.seq -e tcp.ack -e tcp.len`
#[derive(Debug, Deserialize)]
struct SegmentDumpRecord {
    #[serde(rename = "frame.time_epoch")]
    time: Option<String>,
    #[serde(rename = "tcp.seq")]
    seq: Option<String>,
    #[serde(rename = "tcp.ack")]
    ack: Option<String>,
    #[serde(rename = "tcp.len")]
    len: Option<String>,
}

fn reader(path: &Path) -> Result<csv::Reader<fs::File>, Error> {
    if !path.exists() {
        return Err(Error::MissingTrace(path.to_path_buf()));
    }
    log::debug!("Loading: {path:?}");
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|source| Error::Csv {
            path: path.to_path_buf(),
            source,
        })
}

/// Read a tab-separated trace with a header row.
pub fn read_trace<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>, Error> {
    let path = path.as_ref();
    reader(path)?
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| Error::Csv {
            path: path.to_path_buf(),
            source,
        })
}

/// Parse one field of a segment dump line.
fn dump_field<T: FromStr>(
    path: &Path,
    line: u64,
    field: &'static str,
    value: Option<String>,
) -> Result<T, Error> {
    let value = value.ok_or_else(|| Error::MalformedSegment {
        path: path.to_path_buf(),
        line,
        field,
    })?;
    value.parse().map_err(|_| Error::InvalidSegmentField {
        path: path.to_path_buf(),
        line,
        field,
        value,
    })
}

/// Read segments from a tab-separated tshark field dump. Fails on the first line that misses one
/// of the four fields or carries a value that is not a number.
pub fn read_segment_dump(path: impl AsRef<Path>) -> Result<Vec<Segment>, Error> {
    let path = path.as_ref();
    let csv_error = |source| Error::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = reader(path)?;
    let headers = reader.headers().map_err(csv_error)?.clone();
    let mut segments = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let line = record.position().map_or(0, |p| p.line());
        let dump: SegmentDumpRecord = record.deserialize(Some(&headers)).map_err(csv_error)?;
        segments.push(Segment {
            seq: dump_field(path, line, "tcp.seq", dump.seq)?,
            ack: dump_field(path, line, "tcp.ack", dump.ack)?,
            timestamp: dump_field(path, line, "frame.time_epoch", dump.time)?,
            payload_len: dump_field(path, line, "tcp.len", dump.len)?,
        });
    }
    Ok(segments)
}

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
//! Reconstruction of per-segment round-trip times from a captured TCP exchange.
//!
//! The capture is assumed to contain a single flow between two endpoints with fixed roles: the
//! receiver always acknowledges with sequence number 1, and every data segment carries exactly
//! [`SEGMENT_SIZE`] bytes. An acknowledgment number is mapped back to the data segment it covers
//! by subtracting the segment size. Captures with differently sized segments produce wrong
//! matches; this is not a general TCP RTT estimator.
use std::{
    borrow::Borrow,
    collections::{BTreeMap, HashSet},
    io,
    path::Path,
};

use serde::Serialize;
use statrs::statistics::{Data, Max, Min, OrderStatistics};

pub use nrtrace_utils::Segment;

/// Payload size of every data segment in the simulated traffic.
pub const SEGMENT_SIZE: u32 = 1448;

/// Matches sends with their acknowledgments in a single pass over an ordered capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttReconstructor {
    segment_size: u32,
}

impl Default for RttReconstructor {
    fn default() -> Self {
        Self::new(SEGMENT_SIZE)
    }
}

impl RttReconstructor {
    pub fn new(segment_size: u32) -> Self {
        Self { segment_size }
    }

    pub fn segment_size(&self) -> u32 {
        self.segment_size
    }

    /// Compute the RTT of every segment. `segments` must be in capture order.
    pub fn reconstruct<I>(&self, segments: I) -> RttTable
    where
        I: IntoIterator,
        I::Item: Borrow<Segment>,
    {
        let mut table = RttTable::new(self.segment_size);

        for segment in segments {
            let segment = segment.borrow();

            let syn = segment.seq == 0;
            let syn_ack = segment.seq == 1 && segment.ack == 1 && segment.payload_len == 0;
            let dup_ack = table.acknowledged.contains(&segment.ack);
            if syn || syn_ack || dup_ack {
                continue;
            }

            // only the first send of a sequence number counts
            if !table.sent.contains_key(&segment.seq) {
                table.sent.insert(segment.seq, segment.timestamp);
                table.rtts.insert(segment.seq, None);
            }

            // the receiving side always acknowledges with sequence number 1
            if segment.seq != 1 {
                continue;
            }
            let Some(recovered) = segment.ack.checked_sub(self.segment_size) else {
                continue;
            };
            if let Some(sent) = table.sent.get(&recovered) {
                let rtt = (segment.timestamp - sent) * 1000.0;
                table.rtts.insert(recovered, Some(rtt));
                table.acknowledged.insert(segment.ack);
            }
        }

        log::debug!(
            "Reconstructed {} RTTs for {} sent segments",
            table.acknowledged.len(),
            table.sent.len()
        );

        table
    }
}

/// Result of [`RttReconstructor::reconstruct`].
#[derive(Debug, Clone, PartialEq)]
pub struct RttTable {
    segment_size: u32,
    /// first time each sequence number was observed
    sent: BTreeMap<u32, f64>,
    /// RTT in milliseconds, `None` until an acknowledgment was matched
    rtts: BTreeMap<u32, Option<f64>>,
    /// acknowledgment numbers already consumed by a match
    acknowledged: HashSet<u32>,
}

/// One row of the tab-separated RTT output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RttRow {
    pub seq: u32,
    pub packet_number: u32,
    /// RTT in milliseconds, `0` if the segment was never acknowledged.
    pub rtt_ms: f64,
}

/// Summary statistics over the resolved RTTs, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttSummary {
    pub resolved: usize,
    pub unresolved: usize,
    pub min: f64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub max: f64,
}

impl RttTable {
    fn new(segment_size: u32) -> Self {
        Self {
            segment_size,
            sent: BTreeMap::new(),
            rtts: BTreeMap::new(),
            acknowledged: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rtts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rtts.is_empty()
    }

    /// Returns `None` if the sequence number was never sent, and `Some(None)` if it was sent but
    /// never acknowledged.
    pub fn get(&self, seq: u32) -> Option<Option<f64>> {
        self.rtts.get(&seq).copied()
    }

    /// RTT in milliseconds of a resolved segment.
    pub fn rtt_ms(&self, seq: u32) -> Option<f64> {
        self.get(seq).flatten()
    }

    /// Time at which the sequence number was first observed.
    pub fn first_sent(&self, seq: u32) -> Option<f64> {
        self.sent.get(&seq).copied()
    }

    /// Whether an acknowledgment number was consumed by a match.
    pub fn is_acknowledged(&self, ack: u32) -> bool {
        self.acknowledged.contains(&ack)
    }

    /// Iterate over all sent sequence numbers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, Option<f64>)> + '_ {
        self.rtts.iter().map(|(seq, rtt)| (*seq, *rtt))
    }

    /// Iterate over all sequence numbers with a matched acknowledgment.
    pub fn resolved(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.rtts
            .iter()
            .filter_map(|(seq, rtt)| rtt.map(|rtt| (*seq, rtt)))
    }

    pub fn num_unresolved(&self) -> usize {
        self.rtts.values().filter(|rtt| rtt.is_none()).count()
    }

    /// The table with unresolved segments mapped to the sentinel `0`.
    pub fn with_sentinel(&self) -> BTreeMap<u32, f64> {
        self.rtts
            .iter()
            .map(|(seq, rtt)| (*seq, rtt.unwrap_or(0.0)))
            .collect()
    }

    /// Index of the data segment carrying `seq`, counting from 1.
    pub fn packet_number(&self, seq: u32) -> u32 {
        packet_number(seq, self.segment_size)
    }

    pub fn rows(&self) -> Vec<RttRow> {
        self.with_sentinel()
            .into_iter()
            .map(|(seq, rtt_ms)| RttRow {
                seq,
                packet_number: self.packet_number(seq),
                rtt_ms,
            })
            .collect()
    }

    /// Write the table as tab-separated values with a header row.
    pub fn write_tsv<W: io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);
        for row in self.rows() {
            csv.serialize(row)?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Write the table to a tab-separated file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), csv::Error> {
        let path = path.as_ref();
        log::debug!("Writing RTTs to {path:?}");
        self.write_tsv(std::fs::File::create(path)?)
    }

    /// Statistics over the resolved RTTs, or `None` if nothing was acknowledged.
    pub fn summary(&self) -> Option<RttSummary> {
        let values = self.resolved().map(|(_, rtt)| rtt).collect::<Vec<_>>();
        if values.is_empty() {
            return None;
        }
        let resolved = values.len();
        let mean = statrs::statistics::Statistics::mean(values.iter());
        let mut data = Data::new(values);
        Some(RttSummary {
            resolved,
            unresolved: self.num_unresolved(),
            min: data.min(),
            mean,
            median: data.median(),
            p95: data.percentile(95),
            max: data.max(),
        })
    }
}

/// `floor((seq - 1) / segment_size) + 1`
pub fn packet_number(seq: u32, segment_size: u32) -> u32 {
    seq.saturating_sub(1) / segment_size.max(1) + 1
}

#[cfg(test)]
mod test {
    use super::*;

    fn seg(seq: u32, ack: u32, timestamp: f64, payload_len: usize) -> Segment {
        Segment::new(seq, ack, timestamp, payload_len)
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn empty_capture() {
        let table = RttReconstructor::default().reconstruct(Vec::<Segment>::new());
        assert!(table.is_empty());
        assert!(table.with_sentinel().is_empty());
        assert_eq!(table.summary(), None);
    }

    #[test]
    fn handshake_is_skipped() {
        let table = RttReconstructor::default()
            .reconstruct([seg(0, 0, 0.0, 0), seg(1, 1, 0.01, 0), seg(0, 1449, 0.5, 0)]);
        assert_eq!(table.first_sent(0), None);
        assert_eq!(table.get(0), None);
        assert_eq!(table.get(1), None);
        assert!(table.is_empty());
    }

    #[test]
    fn keeps_first_send() {
        let table = RttReconstructor::default()
            .reconstruct([seg(1449, 1, 0.1, 1448), seg(1449, 1, 0.4, 1448)]);
        assert_eq!(table.first_sent(1449), Some(0.1));
        assert_eq!(table.get(1449), Some(None));
    }

    #[test]
    fn duplicate_ack_is_ignored() {
        let table = RttReconstructor::default().reconstruct([
            seg(1449, 1, 1.0, 1448),
            seg(1, 2897, 1.02, 0),
            seg(1, 2897, 1.5, 0),
        ]);
        assert_close(table.rtt_ms(1449).unwrap(), 20.0);
        assert!(table.is_acknowledged(2897));
    }

    #[test]
    fn unresolved_is_zero() {
        let table = RttReconstructor::default()
            .reconstruct([seg(1449, 1, 1.0, 1448), seg(2897, 1, 1.1, 1448), seg(1, 2897, 1.2, 0)]);
        assert_eq!(table.rtt_ms(2897), None);
        assert_eq!(table.with_sentinel()[&2897], 0.0);
        assert_eq!(table.num_unresolved(), 2);
        assert_close(table.rtt_ms(1449).unwrap(), 200.0);
    }

    #[test]
    fn end_to_end() {
        let table = RttReconstructor::default().reconstruct([
            seg(0, 0, 0.0, 0),
            seg(1, 1, 0.01, 0),
            seg(5, 1, 0.02, 1448),
            seg(1, 1453, 0.05, 0),
        ]);
        let resolved = table.resolved().collect::<Vec<_>>();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].0, 5);
        assert_close(resolved[0].1, 30.0);
        // the acknowledging segment is recorded as a send of its own
        assert_eq!(table.get(1), Some(None));
        assert_eq!(table.first_sent(5), Some(0.02));
    }

    #[test]
    fn small_ack_has_no_match() {
        let table = RttReconstructor::default().reconstruct([seg(7, 1, 0.0, 10), seg(1, 20, 0.1, 0)]);
        assert_eq!(table.rtt_ms(7), None);
        assert!(!table.is_acknowledged(20));
    }

    #[test]
    fn custom_segment_size() {
        let table = RttReconstructor::new(536).reconstruct([seg(537, 1, 2.0, 536), seg(1, 1073, 2.25, 0)]);
        assert_close(table.rtt_ms(537).unwrap(), 250.0);
        assert_eq!(table.packet_number(537), 2);
    }

    #[test]
    fn packet_numbers() {
        assert_eq!(packet_number(5, SEGMENT_SIZE), 1);
        assert_eq!(packet_number(1, SEGMENT_SIZE), 1);
        assert_eq!(packet_number(1449, SEGMENT_SIZE), 2);
        assert_eq!(packet_number(2897, SEGMENT_SIZE), 3);
    }

    #[test]
    fn tsv_output() {
        let table = RttReconstructor::default()
            .reconstruct([seg(1449, 1, 1.0, 1448), seg(1, 2897, 1.25, 0)]);
        let mut out = Vec::new();
        table.write_tsv(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "seq\tpacket_number\trtt_ms\n1\t1\t0.0\n1449\t2\t250.0\n"
        );
    }

    #[test]
    fn summary_statistics() {
        let table = RttReconstructor::default().reconstruct([
            seg(1449, 1, 1.0, 1448),
            seg(2897, 1, 1.0, 1448),
            seg(1, 2897, 1.5, 0),
            seg(1, 4345, 1.25, 0),
        ]);
        let summary = table.summary().unwrap();
        assert_eq!(summary.resolved, 2);
        assert_eq!(summary.unresolved, 1);
        assert_close(summary.min, 250.0);
        assert_close(summary.max, 500.0);
        assert_close(summary.mean, 375.0);
    }
}

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
//! TCP socket charts: smoothed RTT, congestion window, bytes in flight, and RTT per packet.

use std::path::PathBuf;

use itertools::Itertools;
use plotly::{
    common::Mode,
    layout::Axis,
    Layout, Plot, Scatter,
};

use nrtrace_utils::pcap_utils::{read_segments, SegmentFilter, SequenceNumbering};

use super::{ChartContext, Error};
use crate::{
    records::{read_trace, TcpDelayRecord, TracedValueRecord},
    resample::{mean_per_instant, unzip_buckets, Aggregation},
    rtt::{RttReconstructor, RttTable},
};

pub(super) fn rtt(ctx: &ChartContext) -> Result<PathBuf, Error> {
    let file = ctx.trace("tcp-delay.txt");
    let records: Vec<TcpDelayRecord> = read_trace(&file)?;
    let general = &ctx.config().general;
    let (start, end) = (general.app_start_time, general.sim_time - general.app_start_time);

    let samples = mean_per_instant(records.iter().map(|r| (r.time, r.rtt)))
        .into_iter()
        .filter(|(t, _)| *t >= start && *t <= end);
    let buckets = ctx.resampler().resample(samples, Aggregation::Mean);
    if buckets.is_empty() {
        return Err(Error::NoData(file));
    }
    let (t, rtt) = unzip_buckets(&buckets);
    let rtt = rtt.into_iter().map(|s| s * 1000.0).collect_vec();

    let mut plot = Plot::new();
    plot.add_trace(Scatter::new(t, rtt).name("RTT").mode(Mode::Lines));
    plot.set_layout(ctx.layout(
        format!("{} RTT", ctx.config().tcp_variant()),
        "Time [s]",
        "RTT [ms]",
    ));
    ctx.save(&plot, "RTT")
}

/// One chart per UE of a traced socket value, scaled by `scale`. UEs without samples are skipped.
fn traced_values(
    ctx: &ChartContext,
    trace: &str,
    name: &str,
    title: &str,
    unit: &str,
    scale: f64,
) -> Result<Vec<PathBuf>, Error> {
    let general = &ctx.config().general;
    let mut files = Vec::new();
    for ue in 0..general.ue_num {
        let file = ctx.trace(format!("{trace}-{}-{ue}.txt", general.server_id));
        let records: Vec<TracedValueRecord> = read_trace(&file)?;
        if records.is_empty() {
            log::warn!("No samples in {file:?}, skipped.");
            continue;
        }
        let (t, y): (Vec<f64>, Vec<f64>) = records
            .iter()
            .map(|r| (r.time, r.newval / scale))
            .unzip();

        let mut plot = Plot::new();
        plot.add_trace(Scatter::new(t, y).name(format!("UE {ue}")).mode(Mode::Lines));
        plot.set_layout(ctx.layout(
            format!("{} {title}", general.tcp_type_id),
            "Time [s]",
            unit,
        ));
        files.push(ctx.save(&plot, format!("{name}-{ue}"))?);
    }
    Ok(files)
}

pub(super) fn congestion_window(ctx: &ChartContext) -> Result<Vec<PathBuf>, Error> {
    traced_values(
        ctx,
        "tcp-cwnd",
        "Cwnd",
        "Congestion Window",
        "Bytes",
        1.0,
    )
}

pub(super) fn inflight(ctx: &ChartContext) -> Result<Vec<PathBuf>, Error> {
    let segment_size = ctx.config().general.segment_size;
    traced_values(
        ctx,
        "tcp-inflight",
        "Inflight",
        "inflight Bytes",
        "Segments",
        if segment_size > 0.0 { segment_size } else { 1.0 },
    )
}

/// Line of the resolved RTTs over the packet number. Unacknowledged segments are left out.
pub fn rtt_per_packet_plot(table: &RttTable) -> Plot {
    let (packets, rtts): (Vec<u32>, Vec<f64>) = table
        .resolved()
        .map(|(seq, rtt)| (table.packet_number(seq), rtt))
        .unzip();
    let mut plot = Plot::new();
    plot.add_trace(Scatter::new(packets, rtts).name("RTT").mode(Mode::Lines));
    plot.set_layout(
        Layout::new()
            .title("RTT per Packet")
            .x_axis(Axis::new().title("Packet Number"))
            .y_axis(Axis::new().title("RTT [ms]")),
    );
    plot
}

pub(super) fn rtt_per_packet(ctx: &ChartContext) -> Result<PathBuf, Error> {
    let segment_size = ctx.config().segment_size()?;
    let file = ctx.trace(&ctx.capture);
    let segments = read_segments(&file, SegmentFilter::new(), SequenceNumbering::Absolute)?;
    let table = RttReconstructor::new(segment_size).reconstruct(&segments);
    if table.is_empty() {
        return Err(Error::NoData(file));
    }
    if let Some(summary) = table.summary() {
        log::info!(
            "{} of {} segments acknowledged, median RTT {:.2}ms",
            summary.resolved,
            table.len(),
            summary.median
        );
    }

    let table_file = ctx.output("RttPerPacket", "tsv");
    table.save(&table_file).map_err(|source| Error::Table {
        path: table_file.clone(),
        source,
    })?;

    let mut plot = rtt_per_packet_plot(&table);
    plot.set_layout(ctx.layout("RTT per Packet", "Packet Number", "RTT [ms]"));
    ctx.save(&plot, "RttPerPacket")
}

#[cfg(test)]
mod test {
    use std::{fs, fs::File, time::Duration};

    use etherparse::PacketBuilder;
    use pcap_file::{
        pcap::{PcapHeader, PcapPacket, PcapWriter},
        DataLink,
    };

    use super::*;
    use crate::{charts::test::context, config::FlowType};

    /// Write a raw IPv4 capture of the given `(seq, ack, time, payload)` segments.
    fn write_capture(path: &std::path::Path, segments: &[(u32, u32, f64, usize)]) {
        let header = PcapHeader {
            datalink: DataLink::IPV4,
            ..Default::default()
        };
        let mut writer = PcapWriter::with_header(File::create(path).unwrap(), header).unwrap();
        for (seq, ack, time, len) in segments {
            let builder = PacketBuilder::ipv4([1, 0, 0, 2], [7, 0, 0, 2], 64)
                .tcp(49153, 1234, *seq, 65535)
                .ack(*ack);
            let payload = vec![0u8; *len];
            let mut data = Vec::new();
            builder.write(&mut data, &payload).unwrap();
            writer
                .write_packet(&PcapPacket::new(
                    Duration::from_secs_f64(*time),
                    data.len() as u32,
                    &data,
                ))
                .unwrap();
        }
    }

    #[test]
    fn rtt_window() {
        let ctx = context("tcp_rtt", FlowType::Tcp);
        fs::write(
            ctx.trace("tcp-delay.txt"),
            "Time\trtt\n0.1\t0.5\n0.6\t0.02\n0.6\t0.04\n9.8\t0.5\n",
        )
        .unwrap();
        assert!(rtt(&ctx).unwrap().ends_with("TcpCubic-Remote-100-RTT.html"));

        // nothing inside [AppStartTime, simTime - AppStartTime]
        fs::write(ctx.trace("tcp-delay.txt"), "Time\trtt\n0.1\t0.5\n").unwrap();
        assert!(matches!(rtt(&ctx), Err(Error::NoData(_))));
    }

    #[test]
    fn traced_values_per_ue() {
        let ctx = context("tcp_cwnd", FlowType::Tcp);
        fs::write(
            ctx.trace("tcp-cwnd-7-0.txt"),
            "Time\toldval\tnewval\n0.5\t0\t1448\n0.6\t1448\t2896\n",
        )
        .unwrap();
        fs::write(ctx.trace("tcp-inflight-7-0.txt"), "Time\toldval\tnewval\n").unwrap();

        let files = congestion_window(&ctx).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("TcpCubic-Remote-100-Cwnd-0.html"));
        assert!(inflight(&ctx).unwrap().is_empty());
    }

    #[test]
    fn rtt_per_packet_from_capture() {
        let ctx = context("tcp_rtt_per_packet", FlowType::Tcp).with_capture("capture.pcap");
        write_capture(
            &ctx.trace("capture.pcap"),
            &[
                (0, 0, 0.0, 0),
                (1, 1, 0.01, 0),
                (1, 1, 0.015, 1448),
                (1449, 1, 0.02, 1448),
                (1, 1449, 0.05, 0),
                (1, 2897, 0.07, 0),
            ],
        );
        let path = rtt_per_packet(&ctx).unwrap();
        assert!(path.ends_with("TcpCubic-Remote-100-RttPerPacket.html"));

        let table = fs::read_to_string(ctx.output("RttPerPacket", "tsv")).unwrap();
        let mut lines = table.lines();
        assert_eq!(lines.next(), Some("seq\tpacket_number\trtt_ms"));
        // the first data segment is sent with sequence number 1 as well
        for (seq, packet, expected) in [("1", "1", 35.0), ("1449", "2", 50.0)] {
            let row = lines.next().unwrap().split('\t').collect_vec();
            assert_eq!(row[..2], [seq, packet]);
            assert!((row[2].parse::<f64>().unwrap() - expected).abs() < 0.01);
        }
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn rtt_per_packet_needs_a_segment_size() {
        let mut ctx = context("tcp_no_segment_size", FlowType::Tcp).with_capture("capture.pcap");
        write_capture(&ctx.trace("capture.pcap"), &[(1, 1, 0.015, 1448), (1, 1449, 0.05, 0)]);
        ctx.config.general.segment_size = 0.0;
        assert!(matches!(
            rtt_per_packet(&ctx),
            Err(Error::Config(crate::config::Error::InvalidSegmentSize(_)))
        ));
        assert!(!ctx.output("RttPerPacket", "tsv").exists());
    }

    #[test]
    fn missing_capture() {
        let ctx = context("tcp_no_capture", FlowType::Tcp);
        assert!(matches!(rtt_per_packet(&ctx), Err(Error::Pcap(_))));
    }
}

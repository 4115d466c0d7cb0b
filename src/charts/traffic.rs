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
//! PDCP throughput, delay and RLC buffer charts.

use std::path::PathBuf;

use itertools::Itertools;
use plotly::{
    common::{AxisSide, Fill, Mode},
    layout::Axis,
    Plot, Scatter,
};

use super::{add_lines, ChartContext, Error};
use crate::{
    config::FlowType,
    records::{read_trace, PdcpRecord, RlcBufferRecord},
    resample::{group_by_key, mean_per_instant, unzip_buckets, Aggregation, Bucket},
    util::glob_in,
};

/// RLC buffer of the remote host towards the first UE.
const REMOTE_RLC_BUFFER: &str = "RlcBufferStat_1.0.0.2_.txt";
const RLC_BUFFER_PREFIX: &str = "RlcBufferStat_";
const RLC_BUFFER_SUFFIX: &str = "_.txt";

/// Throughput in Mb/s per RNTI.
fn throughput(ctx: &ChartContext, records: &[PdcpRecord]) -> Vec<(u16, Vec<(f64, f64)>)> {
    group_by_key(records, |r| r.rnti, |r| (r.time, r.packet_size))
        .into_iter()
        .map(|(rnti, samples)| (rnti, ctx.resampler().throughput(samples)))
        .collect()
}

fn throughput_range(series: &[(u16, Vec<(f64, f64)>)]) -> Vec<f64> {
    let max = series
        .iter()
        .flat_map(|(_, s)| s.iter().map(|(_, thr)| *thr))
        .fold(0.0, f64::max);
    vec![0.0, max * 1.1]
}

fn read_pdcp(ctx: &ChartContext, name: &str) -> Result<Vec<PdcpRecord>, Error> {
    let file = ctx.trace(name);
    let records: Vec<PdcpRecord> = read_trace(&file)?;
    if records.is_empty() {
        return Err(Error::NoData(file));
    }
    Ok(records)
}

pub(super) fn throughput_tx(ctx: &ChartContext) -> Result<PathBuf, Error> {
    let records = read_pdcp(ctx, "NrDlPdcpTxStats.txt")?;
    let series = throughput(ctx, &records);
    let range = throughput_range(&series);

    let mut plot = Plot::new();
    add_lines(&mut plot, series);
    plot.set_layout(
        ctx.layout(
            format!("{} Throughput TX", ctx.config().tcp_variant()),
            "Time [s]",
            "Throughput [Mb/s]",
        )
        .y_axis(Axis::new().title("Throughput [Mb/s]").range(range)),
    );
    ctx.save(&plot, "ThrTx")
}

/// Drop state and buffer occupancy of the downlink RLC buffer, as fractions of the configured
/// buffer size. Periods with drops show the occupancy in the drop series and zero in the
/// occupancy series.
pub(crate) fn rlc_drop_state(
    ctx: &ChartContext,
    records: &[RlcBufferRecord],
) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
    let downlink = records.iter().filter(|r| r.is_downlink()).collect_vec();
    let resampler = ctx.resampler();
    let drops = resampler.resample(
        downlink.iter().map(|r| (r.time, r.drop_size)),
        Aggregation::Sum,
    );
    let occupancy = resampler.resample(
        downlink.iter().map(|r| (r.time, r.tx_buffer_size)),
        Aggregation::Max,
    );
    let size = ctx.config().general.rlc_buffer;

    drops
        .iter()
        .zip(occupancy.iter())
        .map(|(drop, Bucket { start, value })| {
            let fill = match value {
                Some(v) if size > 0.0 => v / size,
                _ => 0.0,
            };
            if drop.value.unwrap_or(0.0) > 0.0 {
                ((*start, fill), (*start, 0.0))
            } else {
                ((*start, 0.0), (*start, fill))
            }
        })
        .unzip()
}

pub(super) fn throughput_rx(ctx: &ChartContext) -> Result<PathBuf, Error> {
    let records = read_pdcp(ctx, "NrDlPdcpRxStats.txt")?;
    let series = throughput(ctx, &records);
    let range = throughput_range(&series);

    let mut plot = Plot::new();
    add_lines(&mut plot, series);
    let mut layout = ctx
        .layout(
            format!("{} Throughput RX", ctx.config().tcp_variant()),
            "Time [s]",
            "Throughput [Mb/s]",
        )
        .y_axis(Axis::new().title("Throughput [Mb/s]").range(range));

    if ctx.config().general.flow_type == FlowType::Tcp {
        let rlc: Vec<RlcBufferRecord> = read_trace(ctx.trace(REMOTE_RLC_BUFFER))?;
        let (drops, occupancy) = rlc_drop_state(ctx, &rlc);
        for (name, color, samples) in [("RLC drops", "red", drops), ("RLC buffer", "green", occupancy)]
        {
            let (t, y): (Vec<f64>, Vec<f64>) = samples.into_iter().unzip();
            plot.add_trace(
                Scatter::new(t, y)
                    .name(name)
                    .mode(Mode::Lines)
                    .fill(Fill::ToZeroY)
                    .fill_color(color)
                    .opacity(0.2)
                    .y_axis("y2"),
            );
        }
        layout = layout.y_axis2(
            Axis::new()
                .title("RLC Buffer [%]")
                .overlaying("y")
                .side(AxisSide::Right)
                .range(vec![0.0, 4.0])
                .tick_values(vec![0.0, 0.5, 1.0])
                .tick_text(vec!["0".to_string(), "50".to_string(), "100".to_string()])
                .show_grid(false),
        );
    }

    plot.set_layout(layout);
    ctx.save(&plot, "ThrRx")
}

/// IP address encoded in an RLC buffer trace name, e.g. `RlcBufferStat_7.0.0.2_.txt`.
pub(crate) fn rlc_buffer_ip(name: &str) -> Option<&str> {
    name.strip_prefix(RLC_BUFFER_PREFIX)?
        .strip_suffix(RLC_BUFFER_SUFFIX)
}

pub(super) fn rlc_buffers(ctx: &ChartContext) -> Result<PathBuf, Error> {
    let pattern = format!("{RLC_BUFFER_PREFIX}*{RLC_BUFFER_SUFFIX}");
    let buffers = glob_in(ctx.trace_dir(), &pattern)?
        .into_iter()
        .filter_map(|path| {
            let ip = rlc_buffer_ip(path.file_name()?.to_str()?)?.to_string();
            Some((ip, path))
        })
        .sorted_by(|a, b| human_sort::compare(&a.0, &b.0))
        .collect_vec();
    if buffers.is_empty() {
        return Err(Error::NoData(ctx.trace(pattern)));
    }

    let mut plot = Plot::new();
    for (ip, path) in buffers {
        let records: Vec<RlcBufferRecord> = read_trace(&path)?;
        let (t, y): (Vec<f64>, Vec<f64>) =
            records.iter().map(|r| (r.time, r.num_of_buffers)).unzip();
        plot.add_trace(
            Scatter::new(t, y)
                .name(format!("IP: {ip}"))
                .mode(Mode::Lines)
                .fill(Fill::ToZeroY),
        );
    }
    plot.set_layout(ctx.layout(
        "RLC Buffers of UE(s) and Remote Host",
        "Time [s]",
        "Num. of packets",
    ));
    ctx.save(&plot, "RlcBuffers")
}

pub(super) fn delay(ctx: &ChartContext) -> Result<PathBuf, Error> {
    let file = ctx.trace("NrDlPdcpRxStats.txt");
    let records = read_pdcp(ctx, "NrDlPdcpRxStats.txt")?
        .into_iter()
        .filter(|r| r.delay.is_some())
        .collect_vec();
    if records.is_empty() {
        return Err(Error::NoData(file));
    }

    let mut plot = Plot::new();
    add_lines(
        &mut plot,
        group_by_key(&records, |r| r.rnti, |r| (r.time, r.delay.unwrap_or_default()))
            .into_iter()
            .map(|(rnti, samples)| {
                let buckets = ctx
                    .resampler()
                    .resample(mean_per_instant(samples), Aggregation::Mean);
                let (t, y) = unzip_buckets(&buckets);
                (rnti, t.into_iter().zip(y).collect_vec())
            }),
    );
    plot.set_layout(ctx.layout(
        format!("{} Delay RX", ctx.config().general.tcp_type_id),
        "Time [s]",
        "delay(s)",
    ));
    ctx.save(&plot, "Delay")
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;
    use crate::{charts::test::context, util::PathBufExt};

    const RLC_HEADER: &str = "Time\tPacketSize\tdropSize\ttxBufferSize\tNumOfBuffers\n";

    #[test]
    fn drop_state() {
        let mut ctx = context("traffic_drop_state", FlowType::Tcp);
        ctx.config.general.rlc_buffer = 1000.0;
        let records = vec![
            RlcBufferRecord {
                time: 0.01,
                packet_size: 1500.0,
                drop_size: 0.0,
                tx_buffer_size: 900.0,
                num_of_buffers: 1.0,
            },
            RlcBufferRecord {
                time: 0.02,
                packet_size: 1600.0,
                drop_size: 0.0,
                tx_buffer_size: 500.0,
                num_of_buffers: 1.0,
            },
            RlcBufferRecord {
                time: 0.21,
                packet_size: 1600.0,
                drop_size: 1600.0,
                tx_buffer_size: 1000.0,
                num_of_buffers: 2.0,
            },
        ];
        let (drops, occupancy) = rlc_drop_state(&ctx, &records);
        // the uplink record is ignored
        assert_eq!(drops, vec![(0.0, 0.0), (0.1, 0.0), (0.2, 1.0)]);
        assert_eq!(occupancy, vec![(0.0, 0.5), (0.1, 0.0), (0.2, 0.0)]);
    }

    #[test]
    fn buffer_ip() {
        assert_eq!(rlc_buffer_ip("RlcBufferStat_7.0.0.2_.txt"), Some("7.0.0.2"));
        assert_eq!(rlc_buffer_ip("RxPacketTrace.txt"), None);
    }

    #[test]
    fn draws_throughput_with_rlc_overlay() {
        let ctx = context("traffic_rx", FlowType::Tcp);
        let pdcp = "time(s)\tcellId\trnti\tlcid\tpacketSize\tdelay(s)\n\
                    0.51\t1\t1\t3\t1500\t0.004\n\
                    0.62\t1\t1\t3\t1500\t0.006\n";
        fs::write(ctx.trace("NrDlPdcpTxStats.txt"), pdcp).unwrap();
        fs::write(ctx.trace("NrDlPdcpRxStats.txt"), pdcp).unwrap();
        assert!(throughput_tx(&ctx).unwrap().exists());

        // the RX chart of a TCP run needs the remote RLC buffer
        assert!(throughput_rx(&ctx).is_err());
        fs::write(
            ctx.trace(REMOTE_RLC_BUFFER),
            format!("{RLC_HEADER}0.5\t1600\t0\t3000\t2\n0.6\t1600\t1600\t9000\t3\n"),
        )
        .unwrap();
        assert!(throughput_rx(&ctx).unwrap().exists());
        assert!(rlc_buffers(&ctx).unwrap().exists());
    }

    #[test]
    fn delay_of_udp_run() {
        let ctx = context("traffic_delay", FlowType::Udp);
        fs::write(
            ctx.trace("NrDlPdcpRxStats.txt"),
            "time(s)\tcellId\trnti\tlcid\tpacketSize\tdelay(s)\n0.51\t1\t1\t3\t1500\t0.004\n",
        )
        .unwrap();
        assert!(throughput_rx(&ctx).unwrap().exists());
        assert!(delay(&ctx).unwrap().ends_with("TcpCubic-Remote-100-Delay.html"));
    }

    #[test]
    fn rlc_buffers_below_brackets() {
        let mut ctx = context("traffic_buffers_brackets", FlowType::Udp);
        ctx.trace_dir = ctx.trace_dir.then("run[1]");
        fs::create_dir_all(ctx.trace_dir()).unwrap();
        fs::write(
            ctx.trace("RlcBufferStat_7.0.0.2_.txt"),
            format!("{RLC_HEADER}0.5\t1600\t0\t3000\t2\n"),
        )
        .unwrap();
        assert!(rlc_buffers(&ctx).unwrap().exists());
    }

    #[test]
    fn no_rlc_buffers() {
        let ctx = context("traffic_no_buffers", FlowType::Udp);
        assert!(matches!(rlc_buffers(&ctx), Err(Error::NoData(_))));
    }
}

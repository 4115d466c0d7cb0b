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
//! Mobility and radio link charts.

use std::path::PathBuf;

use itertools::Itertools;
use plotly::{
    common::{Marker, MarkerSymbol, Mode},
    layout::{Axis, AxisType, Shape, ShapeType},
    Plot, Scatter,
};

use super::{add_lines, padded_range, ChartContext, Error};
use crate::{
    records::{read_trace, MobilityRecord, PathlossRecord, RxPacketRecord, SinrRecord},
    resample::{group_by_key, mean_per_instant, unzip_buckets, Aggregation},
};

pub(super) fn mobility(ctx: &ChartContext) -> Result<PathBuf, Error> {
    let file = ctx.trace("mobilityPosition.txt");
    let records: Vec<MobilityRecord> = read_trace(&file)?;
    if records.is_empty() {
        return Err(Error::NoData(file));
    }
    let config = ctx.config();

    let mut plot = Plot::new();
    for (ue, positions) in group_by_key(&records, |r| r.ue, |r| (r.x, r.y)) {
        let (x, y): (Vec<f64>, Vec<f64>) = positions.into_iter().unzip();
        plot.add_trace(
            Scatter::new(x, y)
                .name(format!("UE {ue}"))
                .mode(Mode::Markers)
                .marker(Marker::new().size(4)),
        );
    }

    // final position of every UE
    let last = records
        .iter()
        .rev()
        .unique_by(|r| r.ue)
        .sorted_by_key(|r| r.ue)
        .collect_vec();
    plot.add_trace(
        Scatter::new(
            last.iter().map(|r| r.x).collect_vec(),
            last.iter().map(|r| r.y).collect_vec(),
        )
        .name("UE")
        .mode(Mode::Markers)
        .marker(Marker::new().symbol(MarkerSymbol::Star).size(14)),
    );

    let (gnb_x, gnb_y): (Vec<f64>, Vec<f64>) = config.gnb.positions().into_iter().unzip();
    plot.add_trace(
        Scatter::new(gnb_x, gnb_y)
            .name("gNb")
            .mode(Mode::Markers)
            .marker(Marker::new().symbol(MarkerSymbol::TriangleUp).size(16)),
    );

    let x_range = vec![
        records.iter().map(|r| r.x).fold(0.0, f64::min),
        records.iter().map(|r| r.x + 10.0).fold(100.0, f64::max),
    ];
    let y_range = vec![
        records.iter().map(|r| r.y).fold(0.0, f64::min),
        records.iter().map(|r| r.y + 10.0).fold(100.0, f64::max),
    ];
    let mut layout = ctx
        .layout("Mobility", "Distance [m]", "Distance [m]")
        .x_axis(Axis::new().title("Distance [m]").range(x_range))
        .y_axis(Axis::new().title("Distance [m]").range(y_range));
    if config.building.enabled() {
        for (x0, y0, x1, y1) in config.building.rectangles() {
            layout.add_shape(
                Shape::new()
                    .shape_type(ShapeType::Rect)
                    .x0(x0)
                    .y0(y0)
                    .x1(x1)
                    .y1(y1)
                    .fill_color("red")
                    .opacity(0.5),
            );
        }
    }
    plot.set_layout(layout);
    ctx.save(&plot, "Mobility")
}

pub(super) fn sinr_control(ctx: &ChartContext) -> Result<PathBuf, Error> {
    let file = ctx.trace("DlCtrlSinr.txt");
    let records: Vec<SinrRecord> = read_trace::<SinrRecord>(&file)?
        .into_iter()
        .filter(|r| r.rnti != 0)
        .collect();
    if records.is_empty() {
        return Err(Error::NoData(file));
    }

    let mut plot = Plot::new();
    add_lines(
        &mut plot,
        group_by_key(&records, |r| r.rnti, |r| (r.time, r.sinr)),
    );
    let range = padded_range(records.iter().map(|r| r.sinr), 15.0, 30.0);
    plot.set_layout(
        ctx.layout("SINR Control", "Time(s)", "SINR(dB)")
            .y_axis(Axis::new().title("SINR(dB)").range(range)),
    );
    ctx.save(&plot, "SinrCtrl")
}

pub(super) fn sinr_data(ctx: &ChartContext) -> Result<PathBuf, Error> {
    let file = ctx.trace("DlDataSinr.txt");
    let records: Vec<SinrRecord> = read_trace::<SinrRecord>(&file)?
        .into_iter()
        .filter(|r| r.rnti != 0)
        .collect();
    if records.is_empty() {
        return Err(Error::NoData(file));
    }

    let series = group_by_key(&records, |r| r.rnti, |r| (r.time, r.sinr))
        .into_iter()
        .map(|(rnti, samples)| {
            let buckets = ctx
                .resampler()
                .resample(mean_per_instant(samples), Aggregation::Mean);
            let (t, y) = unzip_buckets(&buckets);
            (rnti, t.into_iter().zip(y).collect_vec())
        })
        .collect_vec();
    let range = padded_range(
        series.iter().flat_map(|(_, s)| s.iter().map(|(_, y)| *y)),
        30.0,
        60.0,
    );

    let mut plot = Plot::new();
    add_lines(&mut plot, series);
    plot.set_layout(
        ctx.layout("SINR Data", "Time(s)", "SINR(dB)")
            .y_axis(Axis::new().title("SINR(dB)").range(range)),
    );
    ctx.save(&plot, "SinrData")
}

fn downlink_blocks(ctx: &ChartContext) -> Result<Vec<RxPacketRecord>, Error> {
    let file = ctx.trace("RxPacketTrace.txt");
    let records: Vec<RxPacketRecord> = read_trace::<RxPacketRecord>(&file)?
        .into_iter()
        .filter(|r| r.rnti != 0 && r.is_downlink())
        .collect();
    if records.is_empty() {
        return Err(Error::NoData(file));
    }
    Ok(records)
}

pub(super) fn cqi(ctx: &ChartContext) -> Result<PathBuf, Error> {
    let records = downlink_blocks(ctx)?;
    let mut plot = Plot::new();
    add_lines(&mut plot, group_by_key(&records, |r| r.rnti, |r| (r.time, r.cqi)));
    plot.set_layout(
        ctx.layout("CQI", "Time(s)", "CQI")
            .y_axis(Axis::new().title("CQI").range(vec![0.0, 16.0])),
    );
    ctx.save(&plot, "Cqi")
}

pub(super) fn bler(ctx: &ChartContext) -> Result<PathBuf, Error> {
    let records = downlink_blocks(ctx)?;
    let mut plot = Plot::new();
    add_lines(
        &mut plot,
        group_by_key(&records, |r| r.rnti, |r| (r.time, r.tbler))
            .into_iter()
            .map(|(rnti, samples)| {
                let buckets = ctx.resampler().resample(samples, Aggregation::Mean);
                let (t, y) = unzip_buckets(&buckets);
                (rnti, t.into_iter().zip(y).collect_vec())
            }),
    );
    plot.set_layout(
        ctx.layout("BLER", "Time(s)", "BLER")
            .y_axis(Axis::new().title("BLER").type_(AxisType::Log)),
    );
    ctx.save(&plot, "Bler")
}

pub(super) fn path_loss(ctx: &ChartContext) -> Result<PathBuf, Error> {
    let file = ctx.trace("DlPathlossTrace.txt");
    let records: Vec<PathlossRecord> = read_trace::<PathlossRecord>(&file)?
        .into_iter()
        .filter(|r| r.imsi != 0 && r.path_loss < 0.0)
        .collect();
    if records.is_empty() {
        return Err(Error::NoData(file));
    }
    let mut plot = Plot::new();
    add_lines(
        &mut plot,
        group_by_key(&records, |r| r.imsi, |r| (r.time, r.path_loss)),
    );
    plot.set_layout(ctx.layout("Path Loss", "Time(s)", "pathLoss(dB)"));
    ctx.save(&plot, "PathLoss")
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;
    use crate::{charts::test::context, config::FlowType};

    #[test]
    fn draws_mobility() {
        let ctx = context("radio_mobility", FlowType::Tcp);
        fs::write(
            ctx.trace("mobilityPosition.txt"),
            "Time\tUE\tx\ty\n0.1\t1\t10\t10\n0.2\t1\t12\t10\n0.1\t2\t40\t80\n",
        )
        .unwrap();
        let path = mobility(&ctx).unwrap();
        assert!(path.ends_with("TcpCubic-Remote-100-Mobility.html"));
        assert!(path.exists());
    }

    #[test]
    fn sinr_ignores_rnti_zero() {
        let ctx = context("radio_sinr", FlowType::Tcp);
        fs::write(
            ctx.trace("DlCtrlSinr.txt"),
            "Time\tCellId\tRNTI\tSINR(dB)\n0.1\t1\t0\t20\n",
        )
        .unwrap();
        assert!(matches!(sinr_control(&ctx), Err(Error::NoData(_))));

        fs::write(
            ctx.trace("DlDataSinr.txt"),
            "Time\tCellId\tRNTI\tSINR(dB)\n0.1\t1\t1\t40\n0.1\t1\t1\t42\n0.35\t1\t1\t44\n",
        )
        .unwrap();
        assert!(sinr_data(&ctx).unwrap().exists());
    }

    #[test]
    fn draws_rx_packet_charts() {
        let ctx = context("radio_rx", FlowType::Tcp);
        fs::write(
            ctx.trace("RxPacketTrace.txt"),
            "Time\tdirection\tframe\trnti\tCQI\tTBler\n\
             0.1\tDL\t1\t1\t15\t0.001\n\
             0.2\tUL\t2\t1\t0\t0.5\n\
             0.3\tDL\t3\t1\t12\t0.01\n",
        )
        .unwrap();
        assert!(cqi(&ctx).unwrap().ends_with("TcpCubic-Remote-100-Cqi.html"));
        assert!(bler(&ctx).unwrap().exists());
    }

    #[test]
    fn path_loss_keeps_negative_values() {
        let ctx = context("radio_pathloss", FlowType::Tcp);
        fs::write(
            ctx.trace("DlPathlossTrace.txt"),
            "Time(sec)\tcellId\tIMSI\tpathLoss(dB)\n0.1\t1\t1\t10\n",
        )
        .unwrap();
        assert!(matches!(path_loss(&ctx), Err(Error::NoData(_))));
    }
}

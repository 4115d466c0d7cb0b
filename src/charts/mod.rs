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
//! Diagnostic charts of one simulation run.
//!
//! Every chart reads one or more traces from the trace directory and writes one or more HTML
//! files next to them, named `<prefix><name>.html` (see [`SimulationConfig::prefix`]).

use std::{
    fs,
    path::{Path, PathBuf},
};

use plotly::{common::Mode, layout::Axis, Layout, Plot, Scatter};
use strum::IntoEnumIterator;

use crate::{
    config::{self, FlowType, SimulationConfig},
    records,
    resample::Resampler,
    util::{glob_in, PathBufExt},
};

mod radio;
mod tcp;
mod traffic;

pub use tcp::rtt_per_packet_plot;

/// Capture written by the simulator for the first UE.
pub const DEFAULT_CAPTURE: &str = "mypcapfile-5-1.pcap";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Records(#[from] records::Error),
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error(transparent)]
    Pcap(#[from] nrtrace_utils::pcap_utils::Error),
    #[error("Cannot write {path:?}: {source}")]
    Table { path: PathBuf, source: csv::Error },
    #[error("Nothing to plot from {0:?}")]
    NoData(PathBuf),
    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// All charts drawn for a simulation. Parsed from their display names, ignoring case.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Chart {
    Mobility,
    #[strum(serialize = "SINR Control")]
    SinrControl,
    #[strum(serialize = "SINR Data")]
    SinrData,
    #[strum(serialize = "CQI")]
    Cqi,
    #[strum(serialize = "BLER")]
    Bler,
    #[strum(serialize = "Path Loss")]
    PathLoss,
    #[strum(serialize = "Throughput TX")]
    ThroughputTx,
    #[strum(serialize = "Throughput RX")]
    ThroughputRx,
    #[strum(serialize = "RLC Buffers")]
    RlcBuffers,
    #[strum(serialize = "Delay RX")]
    Delay,
    #[strum(serialize = "RTT")]
    Rtt,
    #[strum(serialize = "Congestion Window")]
    CongestionWindow,
    #[strum(serialize = "Inflight Bytes")]
    Inflight,
    #[strum(serialize = "RTT per Packet")]
    RttPerPacket,
}

impl Chart {
    /// Charts to draw for the given traffic type, in drawing order.
    pub fn all_for(flow_type: FlowType) -> Vec<Chart> {
        Chart::iter().filter(|c| c.applies_to(flow_type)).collect()
    }

    pub fn applies_to(&self, flow_type: FlowType) -> bool {
        match self {
            Chart::Delay => flow_type == FlowType::Udp,
            Chart::Rtt | Chart::CongestionWindow | Chart::Inflight | Chart::RttPerPacket => {
                flow_type == FlowType::Tcp
            }
            _ => true,
        }
    }

    /// Draw the chart, returning the written files.
    pub fn draw(&self, ctx: &ChartContext) -> Result<Vec<PathBuf>, Error> {
        let file = match self {
            Chart::Mobility => radio::mobility(ctx)?,
            Chart::SinrControl => radio::sinr_control(ctx)?,
            Chart::SinrData => radio::sinr_data(ctx)?,
            Chart::Cqi => radio::cqi(ctx)?,
            Chart::Bler => radio::bler(ctx)?,
            Chart::PathLoss => radio::path_loss(ctx)?,
            Chart::ThroughputTx => traffic::throughput_tx(ctx)?,
            Chart::ThroughputRx => traffic::throughput_rx(ctx)?,
            Chart::RlcBuffers => traffic::rlc_buffers(ctx)?,
            Chart::Delay => traffic::delay(ctx)?,
            Chart::Rtt => tcp::rtt(ctx)?,
            Chart::CongestionWindow => return tcp::congestion_window(ctx),
            Chart::Inflight => return tcp::inflight(ctx),
            Chart::RttPerPacket => tcp::rtt_per_packet(ctx)?,
        };
        Ok(vec![file])
    }
}

/// Everything a chart needs to know about the simulation.
#[derive(Debug, Clone)]
pub struct ChartContext {
    trace_dir: PathBuf,
    config: SimulationConfig,
    resampler: Resampler,
    capture: String,
}

impl ChartContext {
    pub fn new(trace_dir: impl AsRef<Path>, config: SimulationConfig) -> Self {
        let resampler = Resampler::from_millis(config.general.resample_period);
        Self {
            trace_dir: trace_dir.as_ref().to_path_buf(),
            config,
            resampler,
            capture: DEFAULT_CAPTURE.to_string(),
        }
    }

    /// Use a different capture for the RTT per packet chart.
    pub fn with_capture(mut self, capture: impl Into<String>) -> Self {
        self.capture = capture.into();
        self
    }

    pub fn trace_dir(&self) -> &Path {
        &self.trace_dir
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn resampler(&self) -> &Resampler {
        &self.resampler
    }

    /// Path of a trace inside the trace directory.
    pub fn trace(&self, name: impl AsRef<Path>) -> PathBuf {
        self.trace_dir.as_path().then(name)
    }

    /// Path of a generated file inside the trace directory.
    pub fn output(&self, name: impl std::fmt::Display, extension: &str) -> PathBuf {
        self.trace_dir
            .as_path()
            .then(format!("{}{name}.{extension}", self.config.prefix()))
    }

    /// Layout with the chart title, the simulation subtitle, and axis labels.
    pub fn layout(&self, title: impl std::fmt::Display, x: &str, y: &str) -> Layout {
        Layout::new()
            .title(format!(
                "<b>{title}</b><br><sup>{}</sup>",
                self.config.subtitle()
            ))
            .x_axis(Axis::new().title(x))
            .y_axis(Axis::new().title(y))
    }

    /// Write the plot to `<prefix><name>.html`.
    pub fn save(&self, plot: &Plot, name: impl std::fmt::Display) -> Result<PathBuf, Error> {
        fs::create_dir_all(&self.trace_dir)?;
        let path = self.output(name, "html");
        log::debug!("Plotting {path:?}");
        plot.write_html(&path);
        Ok(path)
    }
}

/// Remove charts left over from a previous run with the same prefix.
pub fn remove_previous_charts(ctx: &ChartContext) -> Result<usize, Error> {
    let pattern = format!("{}*.html", glob::Pattern::escape(&ctx.config.prefix()));
    let mut removed = 0;
    for path in glob_in(&ctx.trace_dir, &pattern)? {
        log::trace!("Removing {path:?}");
        fs::remove_file(path)?;
        removed += 1;
    }
    Ok(removed)
}

/// Plot one line per key.
pub(crate) fn add_lines<K: std::fmt::Display>(
    plot: &mut Plot,
    groups: impl IntoIterator<Item = (K, Vec<(f64, f64)>)>,
) {
    for (key, samples) in groups {
        let (t, y): (Vec<f64>, Vec<f64>) = samples.into_iter().unzip();
        plot.add_trace(Scatter::new(t, y).name(key.to_string()).mode(Mode::Lines));
    }
}

/// `[min(low, data_min), max(high, data_max)]`, the axis range used by the radio charts.
pub(crate) fn padded_range(values: impl IntoIterator<Item = f64>, low: f64, high: f64) -> Vec<f64> {
    let (min, max) = values
        .into_iter()
        .fold((low, high), |(min, max), v| (min.min(v), max.max(v)));
    vec![min, max]
}

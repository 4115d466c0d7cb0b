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
use std::{error::Error, net::IpAddr, path::PathBuf};

use clap::Parser;

use nrtrace::{
    charts,
    records::read_segment_dump,
    rtt::{RttReconstructor, Segment, SEGMENT_SIZE},
    util::{self, PathBufExt},
};
use nrtrace_utils::pcap_utils::{read_segments, SegmentFilter, SequenceNumbering};

#[derive(Parser, Debug)]
#[command(about = "Reconstruct per-segment round-trip times from a TCP capture.", long_about = None)]
struct Args {
    /// Capture file (`.pcap` or `.pcap.gz`), or a tab-separated field dump with `--dump`.
    capture: PathBuf,
    /// Directory for the RTT table and chart, defaults to the directory of the capture.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Payload size of every data segment.
    #[arg(
        short,
        long,
        default_value_t = SEGMENT_SIZE,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    segment_size: u32,
    /// Only consider segments from or to this port.
    #[arg(short, long)]
    port: Option<u16>,
    /// Only consider segments from or to this host.
    #[arg(long)]
    host: Option<IpAddr>,
    /// Report sequence numbers relative to the first one of each direction.
    #[arg(short, long)]
    relative: bool,
    /// Read a `tshark -T fields` dump of `frame.time_epoch`, `tcp.seq`, `tcp.ack` and `tcp.len`.
    #[arg(short, long)]
    dump: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    util::init_logging();
    let args = Args::parse();

    let segments = util::timed("Reading segments", || -> Result<Vec<Segment>, Box<dyn Error>> {
        if args.dump {
            Ok(read_segment_dump(&args.capture)?)
        } else {
            let mut filter = SegmentFilter::new();
            if let Some(port) = args.port {
                filter.port(port);
            }
            if let Some(host) = args.host {
                filter.host(host);
            }
            let numbering = if args.relative {
                SequenceNumbering::Relative
            } else {
                SequenceNumbering::Absolute
            };
            Ok(read_segments(&args.capture, filter, numbering)?)
        }
    })?;
    log::info!("Read {} segments from {:?}", segments.len(), args.capture);

    let table = RttReconstructor::new(args.segment_size).reconstruct(&segments);
    match table.summary() {
        Some(s) => log::info!(
            "{} segments acknowledged, {} unresolved. RTT [ms]: min {:.3}, mean {:.3}, median {:.3}, p95 {:.3}, max {:.3}",
            s.resolved,
            s.unresolved,
            s.min,
            s.mean,
            s.median,
            s.p95,
            s.max
        ),
        None => log::warn!("No segment of {:?} was acknowledged", args.capture),
    }

    let output_dir = args
        .output_dir
        .clone()
        .or_else(|| args.capture.parent().map(PathBuf::from))
        .unwrap_or_default();
    std::fs::create_dir_all(&output_dir)?;
    let stem = args
        .capture
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "capture".to_string());

    let table_file = output_dir.as_path().then(format!("{stem}.rtt.tsv"));
    table.save(&table_file)?;
    log::info!("Written RTT table to {table_file:?}");

    let chart_file = output_dir.as_path().then(format!("{stem}.rtt.html"));
    charts::rtt_per_packet_plot(&table).write_html(&chart_file);
    log::info!("Written RTT chart to {chart_file:?}");

    Ok(())
}

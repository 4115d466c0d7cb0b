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
use std::{path::PathBuf, process};

use clap::Parser;

use nrtrace::{
    charts::{self, Chart, ChartContext},
    config::{FlowType, SimulationConfig, CONFIG_FILE},
    flows, util,
};

#[derive(Parser, Debug)]
#[command(about = "Draw the diagnostic charts of one simulation run.", long_about = None)]
struct Args {
    /// Directory with the traces written by the simulation.
    trace_dir: PathBuf,
    /// Simulation settings, defaults to `graph.json` inside the trace directory.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Capture used for the RTT per packet chart, relative to the trace directory.
    #[arg(long, default_value = charts::DEFAULT_CAPTURE)]
    capture: String,
    /// Draw only the given charts, e.g. `--only CQI --only BLER`.
    #[arg(long)]
    only: Vec<Chart>,
    /// Keep charts of a previous run.
    #[arg(long)]
    keep: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_logging();
    let args = Args::parse();

    if !args.trace_dir.is_dir() {
        log::error!("Could not read traces in {:?}!", args.trace_dir);
        process::exit(1)
    }
    let config_file = args
        .config
        .clone()
        .unwrap_or_else(|| args.trace_dir.join(CONFIG_FILE));
    let config = SimulationConfig::load(&config_file)?;
    let flow_type = config.general.flow_type;
    log::info!(
        "{flow_type} simulation with {}, {}",
        config.general.tcp_type_id,
        config.subtitle()
    );

    let ctx = ChartContext::new(&args.trace_dir, config).with_capture(args.capture);
    if !args.keep {
        let removed = charts::remove_previous_charts(&ctx)?;
        log::debug!("Removed {removed} charts of a previous run");
    }

    let mut failed = Vec::new();
    for chart in Chart::all_for(flow_type)
        .into_iter()
        .filter(|c| args.only.is_empty() || args.only.contains(c))
    {
        match util::timed(chart, || chart.draw(&ctx)) {
            Ok(files) => files.iter().for_each(|f| log::debug!("Written {f:?}")),
            Err(_) => failed.push(chart),
        }
    }

    if flow_type == FlowType::Udp {
        match flows::udp_loss(&args.trace_dir) {
            Ok(lost) => log::info!("Number of packets lost: {lost}"),
            Err(e) => log::warn!("Cannot compute the UDP packet loss: {e}"),
        }
    }

    if !failed.is_empty() {
        log::error!(
            "{} charts failed: {}",
            failed.len(),
            failed.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
        );
        process::exit(1)
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn only_known_charts() {
        let args =
            Args::try_parse_from(["graph", "traces", "--only", "CQI", "--only", "BLER"]).unwrap();
        assert_eq!(args.only, vec![Chart::Cqi, Chart::Bler]);
        assert!(Args::try_parse_from(["graph", "traces", "--only", "Nope"]).is_err());
    }
}

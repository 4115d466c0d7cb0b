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
use std::path::PathBuf;

use clap::Parser;

use nrtrace::{flows, util};

#[derive(Parser, Debug)]
#[command(about = "Compare flow throughput and delay across simulation campaigns.", long_about = None)]
struct Args {
    /// Directory searched for campaigns, i.e. folders with an `outputs` directory.
    root: PathBuf,
    /// Directory for the charts, defaults to the root.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_logging();
    let args = Args::parse();

    let campaigns = util::timed("Reading flow outputs", || flows::compare(&args.root))?;
    for campaign in &campaigns {
        log::info!(
            "Target BLER {}: {} throughput and {} delay samples from {:?}",
            campaign.label,
            campaign.stats.throughput.len(),
            campaign.stats.delay.len(),
            campaign.folder
        );
    }

    let output_dir = args.output_dir.unwrap_or(args.root);
    for file in util::timed("Comparison charts", || {
        flows::plot_comparison(&campaigns, &output_dir)
    })? {
        log::info!("Written {file:?}");
    }
    Ok(())
}

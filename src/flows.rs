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
//! Comparison of the flow monitor results of several simulation campaigns, and UDP packet loss.
use std::{
    fs,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use lazy_static::lazy_static;
use plotly::{box_plot::BoxMean, layout::Axis, BoxPlot, Layout, Plot};
use rayon::prelude::*;
use regex::Regex;

use crate::{
    config::{self, SimulationConfig, CONFIG_FILE},
    records::{self, read_trace, UdpRecvRecord},
    util::{glob_in, PathBufExt},
};

/// Directory marking a simulation campaign.
pub const OUTPUTS_DIR: &str = "outputs";
/// Flow monitor summary written per simulation.
pub const FLOW_OUTPUT: &str = "FlowOutput.txt";
/// Simulation whose settings label a campaign.
pub const LABEL_SIMULATION: &str = "SIM1";
/// Receiver trace of the first UE.
pub const UDP_RECV_TRACE: &str = "UdpRecv_Node1.txt";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid value {value:?} in {path:?} on line {line}")]
    Parse {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error(transparent)]
    Records(#[from] records::Error),
    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("No simulation campaign found below {0:?}")]
    NoCampaigns(PathBuf),
}

lazy_static! {
    static ref FLOW_LINE: Regex =
        Regex::new(r"Mean flow (?P<metric>throughput|delay): (?P<value>\S+)").unwrap();
}

/// Mean throughput (Mb/s) and delay (s) of every flow of a campaign.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowStats {
    pub throughput: Vec<f64>,
    pub delay: Vec<f64>,
}

impl FlowStats {
    fn extend(&mut self, other: FlowStats) {
        self.throughput.extend(other.throughput);
        self.delay.extend(other.delay);
    }
}

/// Flow results of one campaign, labelled by its target BLER.
#[derive(Debug, Clone, PartialEq)]
pub struct Campaign {
    pub folder: PathBuf,
    pub label: String,
    pub stats: FlowStats,
}

/// All folders below `root` (including `root` itself) that contain an `outputs` directory.
pub fn search_outputs_folders(root: impl AsRef<Path>) -> Result<Vec<PathBuf>, Error> {
    Ok(glob_in(root.as_ref(), &format!("**/{OUTPUTS_DIR}"))?
        .into_iter()
        .filter(|path| path.is_dir())
        .filter_map(|path| path.parent().map(Path::to_path_buf))
        .sorted()
        .dedup()
        .collect())
}

/// Parse the `Mean flow throughput` and `Mean flow delay` lines of a flow monitor summary.
pub fn read_flow_output(path: impl AsRef<Path>) -> Result<FlowStats, Error> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut stats = FlowStats::default();
    for (i, line) in content.lines().enumerate() {
        let Some(caps) = FLOW_LINE.captures(line) else {
            continue;
        };
        let value = &caps["value"];
        let value: f64 = value.parse().map_err(|_| Error::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            value: value.to_string(),
        })?;
        match &caps["metric"] {
            "throughput" => stats.throughput.push(value),
            _ => stats.delay.push(value),
        }
    }
    Ok(stats)
}

/// Collect the flow results of all simulations of a campaign folder.
pub fn read_campaign(folder: impl AsRef<Path>) -> Result<Campaign, Error> {
    let folder = folder.as_ref();
    let mut stats = FlowStats::default();
    for file in glob_in(folder, &format!("*/**/{FLOW_OUTPUT}"))?.into_iter().sorted() {
        log::trace!("Reading {file:?}");
        stats.extend(read_flow_output(&file)?);
    }

    let config = SimulationConfig::load(folder.then(LABEL_SIMULATION).then(CONFIG_FILE))?;
    let label = match config.general.bler_target {
        Some(label) => label,
        None => {
            let label = folder
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            log::warn!("No target BLER configured for {folder:?}, using {label:?}");
            label
        }
    };

    Ok(Campaign {
        folder: folder.to_path_buf(),
        label,
        stats,
    })
}

/// Read all campaigns below `root` in parallel, sorted by label.
pub fn compare(root: impl AsRef<Path>) -> Result<Vec<Campaign>, Error> {
    let root = root.as_ref();
    let folders = search_outputs_folders(root)?;
    if folders.is_empty() {
        return Err(Error::NoCampaigns(root.to_path_buf()));
    }
    log::info!("Found {} campaigns below {root:?}", folders.len());

    let mut campaigns = folders
        .into_par_iter()
        .map(|folder| read_campaign(&folder))
        .collect::<Result<Vec<_>, _>>()?;
    campaigns.sort_by(|a, b| human_sort::compare(&a.label, &b.label));
    Ok(campaigns)
}

fn comparison_plot(
    campaigns: &[Campaign],
    title: &str,
    y: &str,
    values: impl Fn(&FlowStats) -> &Vec<f64>,
) -> Plot {
    let mut plot = Plot::new();
    for campaign in campaigns {
        let trace = BoxPlot::<f64, f64>::new(values(&campaign.stats).clone())
            .name(&campaign.label)
            .box_mean(BoxMean::True);
        plot.add_trace(trace);
    }
    plot.set_layout(
        Layout::new()
            .title(format!(
                "<b>{title}</b><br><sup>Values of target BLER are changed.</sup>"
            ))
            .x_axis(Axis::new().title("Target BLER"))
            .y_axis(Axis::new().title(y)),
    );
    plot
}

/// Write the throughput and delay distributions of all campaigns into `output_dir`.
pub fn plot_comparison(
    campaigns: &[Campaign],
    output_dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>, Error> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir).map_err(|source| Error::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let throughput = output_dir.then("Thr-Comparison.html");
    log::debug!("Plotting {throughput:?}");
    comparison_plot(
        campaigns,
        "Comparison of throughput",
        "Throughput [Mb/s]",
        |s| &s.throughput,
    )
    .write_html(&throughput);

    let delay = output_dir.then("Delay-Comparison.html");
    log::debug!("Plotting {delay:?}");
    comparison_plot(campaigns, "Comparison of delay", "Delay [s]", |s| &s.delay)
        .write_html(&delay);

    Ok(vec![throughput, delay])
}

/// Number of packets missing from a sequence of received packet numbers.
pub fn lost_packets(sequence: &[i64]) -> i64 {
    sequence.iter().tuple_windows().map(|(a, b)| b - a - 1).sum()
}

/// Number of UDP packets lost on the way to the first UE of a simulation.
pub fn udp_loss(trace_dir: impl AsRef<Path>) -> Result<i64, Error> {
    let records: Vec<UdpRecvRecord> = read_trace(trace_dir.as_ref().then(UDP_RECV_TRACE))?;
    Ok(lost_packets(
        &records.iter().map(|r| r.sequence).collect_vec(),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::{test_dir, EXAMPLE_CONFIG};

    fn write(path: PathBuf, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn config_with_target(target: &str) -> String {
        let mut config: serde_json::Value = serde_json::from_str(EXAMPLE_CONFIG).unwrap();
        config["general"]["blerTarget"] = serde_json::Value::String(target.to_string());
        config.to_string()
    }

    #[test]
    fn parse_flow_output() {
        let dir = test_dir("flows_parse");
        let path = dir.join(FLOW_OUTPUT);
        write(
            path.clone(),
            "Flow 1 (1.0.0.2:49153 -> 7.0.0.2:1234) proto TCP\n\
             Mean flow throughput: 98.5\n\
             Mean flow delay: 0.012\n\
             Flow 2 (1.0.0.2:49154 -> 7.0.0.3:1234) proto TCP\n\
             Mean flow throughput: 12\n",
        );
        assert_eq!(
            read_flow_output(&path).unwrap(),
            FlowStats {
                throughput: vec![98.5, 12.0],
                delay: vec![0.012],
            }
        );

        write(path.clone(), "Mean flow delay: fast\n");
        assert!(matches!(
            read_flow_output(&path),
            Err(Error::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn compare_campaigns() {
        let root = test_dir("flows_compare");
        for (campaign, target, thr) in [("b", "0.1", "10"), ("a", "0.01", "20")] {
            let folder = root.join("runs").join(campaign);
            fs::create_dir_all(folder.join(OUTPUTS_DIR)).unwrap();
            write(
                folder.join(LABEL_SIMULATION).join(CONFIG_FILE),
                &config_with_target(target),
            );
            write(
                folder.join(LABEL_SIMULATION).join(FLOW_OUTPUT),
                &format!("Mean flow throughput: {thr}\nMean flow delay: 0.5\n"),
            );
            write(
                folder.join("SIM2").join("out").join(FLOW_OUTPUT),
                "Mean flow throughput: 1\n",
            );
        }

        assert_eq!(search_outputs_folders(&root).unwrap().len(), 2);
        let campaigns = compare(&root).unwrap();
        assert_eq!(
            campaigns.iter().map(|c| c.label.as_str()).collect_vec(),
            vec!["0.01", "0.1"]
        );
        assert_eq!(campaigns[0].stats.throughput, vec![20.0, 1.0]);
        assert_eq!(campaigns[0].stats.delay, vec![0.5]);

        let files = plot_comparison(&campaigns, &root).unwrap();
        assert!(files.iter().all(|f| f.exists()));
    }

    #[test]
    fn campaigns_below_brackets() {
        let root = test_dir("flows_brackets").join("sweep[1]");
        let folder = root.join("a");
        fs::create_dir_all(folder.join(OUTPUTS_DIR)).unwrap();
        write(
            folder.join(LABEL_SIMULATION).join(CONFIG_FILE),
            &config_with_target("0.1"),
        );
        write(
            folder.join(LABEL_SIMULATION).join(FLOW_OUTPUT),
            "Mean flow throughput: 10\n",
        );

        assert_eq!(search_outputs_folders(&root).unwrap(), vec![folder.clone()]);
        let campaigns = compare(&root).unwrap();
        assert_eq!(campaigns[0].stats.throughput, vec![10.0]);
    }

    #[test]
    fn no_campaigns() {
        let root = test_dir("flows_empty");
        assert!(matches!(compare(&root), Err(Error::NoCampaigns(_))));
    }

    #[test]
    fn udp_packet_loss() {
        assert_eq!(lost_packets(&[]), 0);
        assert_eq!(lost_packets(&[0, 1, 2, 5, 6, 9]), 4);

        let dir = test_dir("flows_udp");
        write(
            dir.join(UDP_RECV_TRACE),
            "Time\tPacket Sequence\n0.1\t0\n0.2\t1\n0.3\t3\n",
        );
        assert_eq!(udp_loss(&dir).unwrap(), 1);
    }
}

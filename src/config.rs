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
//! Simulation settings written next to the traces by the simulation script.
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// Name of the settings file inside a trace directory.
pub const CONFIG_FILE: &str = "graph.json";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot parse {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("SegmentSize must be a whole number of bytes, at least 1, got {0}")]
    InvalidSegmentSize(f64),
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, strum::Display,
)]
pub enum FlowType {
    #[serde(rename = "TCP")]
    #[strum(serialize = "TCP")]
    Tcp,
    #[serde(rename = "UDP")]
    #[strum(serialize = "UDP")]
    Udp,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    pub general: GeneralConfig,
    #[serde(rename = "gNb")]
    pub gnb: GnbConfig,
    #[serde(default)]
    pub building: BuildingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralConfig {
    pub flow_type: FlowType,
    /// e.g. `TcpCubic`
    pub tcp_type_id: String,
    /// milliseconds
    pub resample_period: u64,
    /// seconds
    pub sim_time: f64,
    /// seconds
    #[serde(rename = "AppStartTime")]
    pub app_start_time: f64,
    /// bytes
    pub rlc_buffer: f64,
    /// RLC buffer size as percentage of the bandwidth-delay product
    pub rlc_buffer_perc: u32,
    pub server_type: String,
    #[serde(rename = "serverID")]
    pub server_id: String,
    #[serde(rename = "UENum")]
    pub ue_num: u32,
    #[serde(rename = "SegmentSize")]
    pub segment_size: f64,
    /// Mb/s
    #[serde(default = "_one_thousand_f64")]
    pub data_rate: f64,
    #[serde(default)]
    pub bler_target: Option<String>,
}

const fn _one_thousand_f64() -> f64 {
    1_000.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GnbConfig {
    #[serde(rename = "gNbNum")]
    pub num: u32,
    #[serde(rename = "gNbX")]
    pub x: f64,
    #[serde(rename = "gNbY")]
    pub y: f64,
    /// distance between two gNbs along the y axis
    #[serde(rename = "gNbD")]
    pub distance: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingConfig {
    #[serde(default)]
    pub enable_buildings: u8,
    #[serde(default)]
    pub grid_width: u32,
    #[serde(rename = "buildN", default)]
    pub num: u32,
    #[serde(rename = "buildX", default)]
    pub x: f64,
    #[serde(rename = "buildY", default)]
    pub y: f64,
    #[serde(rename = "buildDx", default)]
    pub dx: f64,
    #[serde(rename = "buildDy", default)]
    pub dy: f64,
    #[serde(rename = "buildLx", default)]
    pub lx: f64,
    #[serde(rename = "buildLy", default)]
    pub ly: f64,
}

impl BuildingConfig {
    pub fn enabled(&self) -> bool {
        self.enable_buildings != 0
    }

    /// Corners `(x0, y0, x1, y1)` of all buildings, laid out row by row on a grid.
    pub fn rectangles(&self) -> Vec<(f64, f64, f64, f64)> {
        let width = self.grid_width.max(1);
        (0..self.num)
            .map(|b| {
                let (row, col) = (b / width, b % width);
                let x0 = self.x + (self.lx + self.dx) * col as f64;
                let y0 = self.y + (self.ly + self.dy) * row as f64;
                (x0, y0, x0 + self.lx, y0 + self.ly)
            })
            .collect()
    }
}

impl GnbConfig {
    /// Positions of all gNbs.
    pub fn positions(&self) -> Vec<(f64, f64)> {
        (0..self.num)
            .map(|g| (self.x, self.y + 5.0 + g as f64 * self.distance))
            .collect()
    }
}

impl SimulationConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        log::debug!("Loading: {path:?}");
        let serialized = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&serialized).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Name of the congestion control without the `ns3::` and `Tcp` prefixes.
    pub fn tcp_variant(&self) -> &str {
        let id = self.general.tcp_type_id.as_str();
        let id = id.strip_prefix("ns3::").unwrap_or(id);
        id.strip_prefix("Tcp").unwrap_or(id)
    }

    /// Payload size of every data segment in bytes.
    pub fn segment_size(&self) -> Result<u32, Error> {
        let size = self.general.segment_size;
        if size >= 1.0 && size <= u32::MAX as f64 && size.fract() == 0.0 {
            Ok(size as u32)
        } else {
            Err(Error::InvalidSegmentSize(size))
        }
    }

    /// Prefix for all generated file names.
    pub fn prefix(&self) -> String {
        format!(
            "{}-{}-{}-",
            self.general.tcp_type_id, self.general.server_type, self.general.rlc_buffer_perc
        )
    }

    pub fn subtitle(&self) -> String {
        format!(
            "{}% BDP - Server: {}",
            self.general.rlc_buffer_perc, self.general.server_type
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::EXAMPLE_CONFIG;

    #[test]
    fn parse_config() {
        let config: SimulationConfig = serde_json::from_str(EXAMPLE_CONFIG).unwrap();
        assert_eq!(config.general.flow_type, FlowType::Tcp);
        assert_eq!(config.general.data_rate, 1000.0);
        assert_eq!(config.general.bler_target, None);
        assert_eq!(config.prefix(), "TcpCubic-Remote-100-");
        assert_eq!(config.subtitle(), "100% BDP - Server: Remote");
        assert_eq!(config.tcp_variant(), "Cubic");
        assert_eq!(config.gnb.positions(), vec![(50.0, 15.0), (50.0, 35.0)]);
    }

    #[test]
    fn building_grid() {
        let config: SimulationConfig = serde_json::from_str(EXAMPLE_CONFIG).unwrap();
        assert!(config.building.enabled());
        assert_eq!(
            config.building.rectangles(),
            vec![
                (10.0, 20.0, 14.0, 23.0),
                (19.0, 20.0, 23.0, 23.0),
                (10.0, 29.0, 14.0, 32.0)
            ]
        );
    }

    #[test]
    fn segment_size() {
        let mut config: SimulationConfig = serde_json::from_str(EXAMPLE_CONFIG).unwrap();
        assert_eq!(config.segment_size().unwrap(), 1448);
        for size in [0.0, -1448.0, 0.5, f64::NAN, f64::INFINITY] {
            config.general.segment_size = size;
            assert!(matches!(
                config.segment_size(),
                Err(Error::InvalidSegmentSize(_))
            ));
        }
    }

    #[test]
    fn load_missing_file() {
        assert!(matches!(
            SimulationConfig::load("/nonexistent/graph.json"),
            Err(Error::Io { .. })
        ));
    }
}

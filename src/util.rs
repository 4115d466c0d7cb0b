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
//! Utility module collection of functions

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    time::Instant,
};

use log::LevelFilter;

/// log4rs configuration picked up from the working directory.
pub const LOG_CONFIG: &str = "log4rs.yml";

/// Initialize logging from `log4rs.yml` if present, or to the terminal otherwise (level `info`,
/// overridable with `RUST_LOG`).
pub fn init_logging() {
    if Path::new(LOG_CONFIG).exists() {
        match log4rs::init_file(LOG_CONFIG, Default::default()) {
            Ok(()) => return,
            Err(e) => eprintln!("Cannot load {LOG_CONFIG}: {e}"),
        }
    }
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let _ = builder.try_init();
}

/// Run `f`, logging how long it took, or the error it returned.
pub fn timed<T, E: Display>(name: impl Display, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
    log::info!("{name}...");
    let now = Instant::now();
    let result = f();
    match &result {
        Ok(_) => log::info!("{name}: processed in {:.2}s", now.elapsed().as_secs_f64()),
        Err(e) => log::error!("{name}: error while processing, skipped. {e}"),
    }
    result
}

pub trait PathBufExt: Sized {
    fn then(self, p: impl AsRef<Path>) -> PathBuf;
}

impl PathBufExt for PathBuf {
    fn then(mut self, p: impl AsRef<Path>) -> PathBuf {
        self.push(p);
        self
    }
}

impl PathBufExt for &Path {
    fn then(self, p: impl AsRef<Path>) -> PathBuf {
        let mut path = self.to_path_buf();
        path.push(p);
        path
    }
}

/// Paths below `dir` matching `pattern`. Only `pattern` is interpreted as a glob, `dir` is taken
/// literally. Unreadable entries are skipped with a warning.
pub fn glob_in(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, glob::PatternError> {
    let pattern = Path::new(&glob::Pattern::escape(&dir.to_string_lossy())).then(pattern);
    Ok(glob::glob(&pattern.to_string_lossy())?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Skipping {:?}: {}", e.path(), e.error());
                None
            }
        })
        .collect())
}

/// Fresh temporary directory for a test.
#[cfg(test)]
pub(crate) fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().then(format!("nrtrace_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[cfg(test)]
pub(crate) const EXAMPLE_CONFIG: &str = r#"{
    "general": {
        "flowType": "TCP",
        "tcpTypeId": "TcpCubic",
        "resamplePeriod": 100,
        "simTime": 10.0,
        "AppStartTime": 0.5,
        "rlcBuffer": 1000000,
        "rlcBufferPerc": 100,
        "serverType": "Remote",
        "serverID": "7",
        "UENum": 1,
        "SegmentSize": 1448
    },
    "gNb": { "gNbNum": 2, "gNbX": 50.0, "gNbY": 10.0, "gNbD": 20.0 },
    "building": {
        "enableBuildings": 1, "gridWidth": 2, "buildN": 3,
        "buildX": 10, "buildY": 20, "buildDx": 5, "buildDy": 6, "buildLx": 4, "buildLy": 3
    }
}"#;

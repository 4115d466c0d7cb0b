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
//! Library for post-processing the traces of 5G NR simulations: RTT reconstruction from packet
//! captures, time-bucketed resampling of simulator traces, and diagnostic charts.

pub mod charts;
pub mod config;
pub mod flows;
pub mod records;
pub mod resample;
pub mod rtt;
pub mod util;

pub use config::SimulationConfig;
pub use rtt::{RttReconstructor, RttTable, Segment};

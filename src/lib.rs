// titrate-eval: Trace Analysis for the Titrate Buffer-Management Evaluation
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
//! Library for parsing simulator traces and aggregating per-scheme statistics
//! of buffer-management experiments (Titrate vs. CoDel, PIE, static FIFO, DT).

/// Flow identifiers as they appear in the simulator traces.
pub type FlowId = u64;

/// Timestamps in the traces are integer nanoseconds.
pub type Nanos = i64;

pub mod experiments;
pub mod output;
pub mod records;
pub mod stats;
pub mod trace;
pub mod util;

pub mod prelude {
    pub use super::{
        experiments::{Cca, CcaMix, ExperimentConfig, FlowClass, Scheme},
        trace::{queue::QueueSeries, MalformedLine, TimeWindow, TraceError},
        FlowId, Nanos,
    };
}

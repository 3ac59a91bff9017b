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
//! Record data types for the intermediate result tables that the analysis
//! binaries exchange with the plotting stage.
//!
//! Each table row is a composite key followed by one value column per
//! measured quantity. Keys are typed; the table layer renders them to
//! columns, so no analysis ever assembles a key by string concatenation.

use serde::{Deserialize, Serialize};

use crate::experiments::{CcaMix, FlowClass, Scheme};

/// Composite key of a table row. Field order defines the column order.
pub trait TableKey {
    /// Rendered key columns, left to right.
    fn fields(&self) -> Vec<String>;
}

/// Key of the throughput and latency tables: one row per configuration axis
/// point and scheme, averaged over seeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemeKey {
    pub rtt_ms: u32,
    pub cca: CcaMix,
    pub flow_class: FlowClass,
    pub scheme: Scheme,
}

impl TableKey for SchemeKey {
    fn fields(&self) -> Vec<String> {
        vec![
            self.rtt_ms.to_string(),
            self.cca.to_string(),
            self.flow_class.to_string(),
            self.scheme.to_string(),
        ]
    }
}

/// Key of the burst-completion and drop tables: one row per web trace and
/// scheme.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BurstKey {
    pub webtrace: String,
    pub scheme: Scheme,
}

impl TableKey for BurstKey {
    fn fields(&self) -> Vec<String> {
        vec![self.webtrace.clone(), self.scheme.to_string()]
    }
}

/// Key of the per-flow summary: algorithm under test, burst size, and flow
/// count. The algorithm stays a free-form string since the per-flow testbed
/// runs include variants outside [`Scheme`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerFlowKey {
    pub algorithm: String,
    pub burst: usize,
    pub flow_count: usize,
}

impl TableKey for PerFlowKey {
    fn fields(&self) -> Vec<String> {
        vec![
            self.algorithm.clone(),
            self.burst.to_string(),
            self.flow_count.to_string(),
        ]
    }
}

/// Aggregated per-flow metrics of one testbed setting, written to
/// `summary.json`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerFlowSummary {
    /// Mean flow completion time over the setting's traces, seconds.
    pub mean_fct_s: f64,
    /// 90th-percentile flow completion time, seconds.
    pub p90_fct_s: f64,
    /// Largest smoothed RTT seen by any flow, milliseconds.
    pub max_rtt_ms: f64,
    /// Accumulated duration with RTT above the violation threshold, ms.
    pub rtt_violation_ms: f64,
    /// Largest application frame delay, milliseconds.
    pub max_app_delay_ms: f64,
    /// Fraction of traces that hit a retransmission timeout.
    pub rto_fraction: f64,
}

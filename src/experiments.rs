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
//! Experiment configuration axes and the layout of collected data on disk.
//!
//! Every analysis iterates a cartesian product of configuration axes and
//! loads traces from `<data>/<config>/<scheme>/`, where `<config>` is the
//! canonical configuration name (see [`ExperimentConfig`]). The exact ns-3
//! log-directory hierarchy of the simulation runs is flattened into this
//! layout by the collection scripts and is not reproduced here.

use std::{fmt, path::PathBuf};

use itertools::iproduct;
use serde::{Deserialize, Serialize};

/// Buffer-management schemes under comparison.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumIter,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Titrate,
    /// Titrate with probing only, no waiting room.
    #[strum(serialize = "p")]
    #[serde(rename = "p")]
    ProbeOnly,
    Codel,
    Pie,
    Static,
    /// Dynamic thresholds with alpha = 1.
    Dt1,
}

/// Congestion-control mix driving the traffic of a configuration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumIter,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CcaMix {
    Cubic,
    Bbr,
    RealMix,
}

/// Congestion-control algorithms of individual flows, in the numeric
/// encoding used by the simulator (`code % 10` forward, `code / 10`
/// backward).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumIter,
    strum_macros::EnumString,
)]
pub enum Cca {
    Cubic,
    Bbr,
    Copa,
    LinuxReno,
}

impl Cca {
    fn from_index(i: u32) -> Option<Self> {
        match i {
            0 => Some(Self::Cubic),
            1 => Some(Self::Bbr),
            2 => Some(Self::Copa),
            3 => Some(Self::LinuxReno),
            _ => None,
        }
    }

    /// Decode a two-digit CCA code into the (forward, backward) pair.
    pub fn decode_pair(code: u32) -> Option<(Self, Self)> {
        Some((Self::from_index(code % 10)?, Self::from_index(code / 10)?))
    }
}

/// Flow-count class of a configuration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumIter,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FlowClass {
    Small,
    Large,
}

/// One point of the configuration space. Its `Display` form is the canonical
/// configuration directory name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub cca: CcaMix,
    pub flow_class: FlowClass,
    pub rtt_ms: u32,
    pub seed: u32,
}

impl fmt::Display for ExperimentConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "cca{}_nf{}_rtt{}_cseed{}",
            self.cca, self.flow_class, self.rtt_ms, self.seed
        )
    }
}

impl ExperimentConfig {
    /// Directory holding one scheme's traces for this configuration.
    pub fn trace_dir(&self, data_root: impl Into<PathBuf>, scheme: Scheme) -> PathBuf {
        let mut path = data_root.into();
        path.push(self.to_string());
        path.push(scheme.to_string());
        path
    }
}

/// Iterate the cartesian product of the configuration axes.
pub fn iterate_configs<'a>(
    ccas: &'a [CcaMix],
    flow_classes: &'a [FlowClass],
    rtts_ms: &'a [u32],
    seeds: std::ops::Range<u32>,
) -> impl Iterator<Item = ExperimentConfig> + 'a {
    iproduct!(ccas, flow_classes, rtts_ms, seeds).map(|(&cca, &flow_class, &rtt_ms, seed)| {
        ExperimentConfig {
            cca,
            flow_class,
            rtt_ms,
            seed,
        }
    })
}

/// Bandwidth-delay product in bytes for a round-trip time and link rate.
pub fn bdp_bytes(rtt_ms: u32, link_mbps: u32) -> u64 {
    (rtt_ms as f64 / 1000.0 * link_mbps as f64 * 1e6 / 8.0) as u64
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn scheme_names_round_trip() {
        for scheme in Scheme::iter() {
            assert_eq!(Scheme::from_str(&scheme.to_string()).unwrap(), scheme);
        }
        assert_eq!(Scheme::ProbeOnly.to_string(), "p");
        assert_eq!(Scheme::from_str("dt1").unwrap(), Scheme::Dt1);
    }

    #[test]
    fn config_name() {
        let config = ExperimentConfig {
            cca: CcaMix::RealMix,
            flow_class: FlowClass::Small,
            rtt_ms: 300,
            seed: 4,
        };
        assert_eq!(config.to_string(), "ccarealmix_nfsmall_rtt300_cseed4");
        assert_eq!(
            config.trace_dir("/data", Scheme::Codel),
            PathBuf::from("/data/ccarealmix_nfsmall_rtt300_cseed4/codel")
        );
    }

    #[test]
    fn cca_pair_decoding() {
        assert_eq!(Cca::decode_pair(0), Some((Cca::Cubic, Cca::Cubic)));
        assert_eq!(Cca::decode_pair(12), Some((Cca::Copa, Cca::Bbr)));
        assert_eq!(Cca::decode_pair(31), Some((Cca::Bbr, Cca::LinuxReno)));
        assert_eq!(Cca::decode_pair(45), None);
    }

    #[test]
    fn config_iteration_covers_product() {
        let configs: Vec<_> = iterate_configs(
            &[CcaMix::Cubic, CcaMix::Bbr],
            &[FlowClass::Small],
            &[50, 300],
            0..3,
        )
        .collect();
        assert_eq!(configs.len(), 2 * 1 * 2 * 3);
    }

    #[test]
    fn bdp() {
        // 300 ms at 1000 Mbps
        assert_eq!(bdp_bytes(300, 1000), 37_500_000);
    }
}

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
//! Reader for the flow-monitor XML report and grouping of its flow records
//! into web-trace bursts.
//!
//! Flows come in forward/backward pairs: even ids carry the payload, the odd
//! id right after is the reverse direction whose losses are attributed to the
//! forward flow. Which flows belong to which burst is not in the report
//! itself; a side-channel configuration file declares the expected flow count
//! per burst and a running counter assigns the forward flows in order.

use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    trace::{token, TraceError},
    Nanos,
};

/// Root of the flow-monitor report. Classifier and probe sections are not
/// needed for the analysis and are ignored.
#[derive(Debug, Deserialize)]
pub struct FlowMonitor {
    #[serde(rename = "FlowStats")]
    pub flow_stats: FlowStats,
}

#[derive(Debug, Deserialize)]
pub struct FlowStats {
    #[serde(rename = "Flow", default)]
    pub flows: Vec<FlowStat>,
}

/// One flow record. Time attributes in the report carry a two-character unit
/// suffix (`ns`) and a float payload; they are truncated to integer
/// nanoseconds on read.
#[derive(Debug, Deserialize)]
pub struct FlowStat {
    #[serde(rename = "@flowId")]
    pub flow_id: u64,
    #[serde(rename = "@timeFirstTxPacket", deserialize_with = "deserialize_time_ns")]
    pub first_tx_ns: Nanos,
    #[serde(rename = "@timeLastRxPacket", deserialize_with = "deserialize_time_ns")]
    pub last_rx_ns: Nanos,
    #[serde(rename = "@lostPackets")]
    pub lost_packets: u64,
}

fn deserialize_time_ns<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Nanos, D::Error> {
    let buf = String::deserialize(deserializer)?;
    parse_time_ns(&buf).map_err(serde::de::Error::custom)
}

/// Strip the two-character unit suffix and truncate to integer nanoseconds
/// (`"+1.25e+09ns"` -> `1250000000`).
pub fn parse_time_ns(raw: &str) -> Result<Nanos, String> {
    // the cut must land on a char boundary, so a non-ASCII suffix is an
    // error rather than a panic
    let value = raw
        .len()
        .checked_sub(2)
        .and_then(|cut| raw.get(..cut))
        .ok_or_else(|| format!("time attribute lacks a unit suffix: {raw:?}"))?;
    value
        .parse::<f64>()
        .map(|t| t as Nanos)
        .map_err(|e| format!("cannot parse time attribute {raw:?}: {e}"))
}

/// Parse a flow-monitor report from disk.
pub fn read_flow_monitor(path: impl AsRef<Path>) -> Result<FlowMonitor, TraceError> {
    let xml = fs::read_to_string(path.as_ref())?;
    Ok(quick_xml::de::from_str(&xml)?)
}

/// Read the side-channel burst-size configuration: one line per burst with
/// `index tokenSkip expectedCount`.
pub fn read_burst_sizes(path: impl AsRef<Path>) -> Result<BTreeMap<usize, usize>, TraceError> {
    let raw = fs::read_to_string(path.as_ref())?;
    let mut sizes = BTreeMap::new();
    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let tokens = line.split_whitespace().collect::<Vec<_>>();
        let index: usize = token(&tokens, 0, line_no + 1)?;
        let expected: usize = token(&tokens, 2, line_no + 1)?;
        sizes.insert(index, expected);
    }
    Ok(sizes)
}

/// One flow of a burst, with the paired backward flow's losses already added.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BurstFlow {
    pub start_ns: Nanos,
    pub end_ns: Nanos,
    pub lost_packets: u64,
}

/// A contiguous run of forward flows assigned to the same web-trace burst.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FlowGroup {
    pub burst_index: usize,
    pub flows: Vec<BurstFlow>,
}

impl FlowGroup {
    /// Earliest start and latest end over the burst's flows.
    pub fn span_ns(&self) -> Option<(Nanos, Nanos)> {
        let start = self.flows.iter().map(|f| f.start_ns).min()?;
        let end = self.flows.iter().map(|f| f.end_ns).max()?;
        Some((start, end))
    }

    pub fn total_lost(&self) -> u64 {
        self.flows.iter().map(|f| f.lost_packets).sum()
    }
}

/// Group the report's flows into bursts.
///
/// `flow_id_start..flow_id_end` indexes into the report's flow list in file
/// order, stepping by 2 over the forward/backward pairs. A burst is closed
/// once it holds the expected flow count from `burst_sizes`; the final
/// in-progress burst is flushed even when short.
pub fn group_bursts(
    monitor: &FlowMonitor,
    burst_sizes: &BTreeMap<usize, usize>,
    flow_id_start: usize,
    flow_id_end: usize,
) -> Result<Vec<FlowGroup>, TraceError> {
    let flows = &monitor.flow_stats.flows;
    let mut groups = Vec::new();
    let mut current = FlowGroup::default();

    for id in (flow_id_start..flow_id_end).step_by(2) {
        let fwd = flows.get(id).ok_or(TraceError::MissingFlow(id))?;
        let back = flows.get(id + 1).ok_or(TraceError::MissingFlow(id + 1))?;
        let expected = *burst_sizes
            .get(&current.burst_index)
            .ok_or(TraceError::MissingBurstSize(current.burst_index))?;

        if current.flows.len() >= expected {
            let next_index = current.burst_index + 1;
            groups.push(std::mem::replace(
                &mut current,
                FlowGroup {
                    burst_index: next_index,
                    flows: Vec::new(),
                },
            ));
        }

        if fwd.last_rx_ns < fwd.first_tx_ns {
            log::warn!(
                "Flow {} ends ({}) before it starts ({})",
                fwd.flow_id,
                fwd.last_rx_ns,
                fwd.first_tx_ns
            );
        }

        current.flows.push(BurstFlow {
            start_ns: fwd.first_tx_ns,
            end_ns: fwd.last_rx_ns,
            lost_packets: fwd.lost_packets + back.lost_packets,
        });
    }

    groups.push(current);
    Ok(groups)
}

#[cfg(test)]
mod test {
    use super::*;

    fn report(n_pairs: usize) -> FlowMonitor {
        // pair i: forward flow starts at i*1000, ends at i*1000 + 500,
        // loses i packets; backward flow loses 1 packet
        let flows = (0..n_pairs)
            .flat_map(|i| {
                [
                    FlowStat {
                        flow_id: (2 * i) as u64 + 1,
                        first_tx_ns: i as Nanos * 1000,
                        last_rx_ns: i as Nanos * 1000 + 500,
                        lost_packets: i as u64,
                    },
                    FlowStat {
                        flow_id: (2 * i) as u64 + 2,
                        first_tx_ns: i as Nanos * 1000,
                        last_rx_ns: i as Nanos * 1000 + 100,
                        lost_packets: 1,
                    },
                ]
            })
            .collect();
        FlowMonitor {
            flow_stats: FlowStats { flows },
        }
    }

    #[test]
    fn parse_report_xml() {
        let xml = r#"<?xml version="1.0" ?>
<FlowMonitor>
  <FlowStats>
    <Flow flowId="1" timeFirstTxPacket="+0.0ns" timeLastRxPacket="+1.25e+09ns" lostPackets="3" rxPackets="100"/>
    <Flow flowId="2" timeFirstTxPacket="+1034190000.0ns" timeLastRxPacket="+2.0e+09ns" lostPackets="0" rxPackets="42"/>
  </FlowStats>
  <Ipv4FlowClassifier/>
</FlowMonitor>"#;
        let monitor: FlowMonitor = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(monitor.flow_stats.flows.len(), 2);
        assert_eq!(monitor.flow_stats.flows[0].first_tx_ns, 0);
        assert_eq!(monitor.flow_stats.flows[0].last_rx_ns, 1_250_000_000);
        assert_eq!(monitor.flow_stats.flows[0].lost_packets, 3);
        assert_eq!(monitor.flow_stats.flows[1].first_tx_ns, 1_034_190_000);
    }

    #[test]
    fn time_suffix_truncates() {
        assert_eq!(parse_time_ns("+123.9ns").unwrap(), 123);
        assert_eq!(parse_time_ns("+1.5e+03ns").unwrap(), 1500);
        assert!(parse_time_ns("ns").is_err());
        assert!(parse_time_ns("abcns").is_err());
        assert!(parse_time_ns("x").is_err());
        // multi-byte unit suffixes must error, not panic on the byte cut
        assert!(parse_time_ns("+123µs").is_err());
        assert!(parse_time_ns("1€").is_err());
    }

    #[test]
    fn two_bursts_with_partial_flush() {
        // expected counts [2, 1]; forward ids 0, 2, 4
        let sizes = BTreeMap::from([(0, 2), (1, 1)]);
        let groups = group_bursts(&report(3), &sizes, 0, 6).unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].burst_index, 0);
        assert_eq!(groups[0].flows.len(), 2);
        assert_eq!(groups[1].burst_index, 1);
        assert_eq!(groups[1].flows.len(), 1);

        // backward losses folded into the forward flow
        assert_eq!(groups[0].flows[0].lost_packets, 1);
        assert_eq!(groups[0].flows[1].lost_packets, 2);
        assert_eq!(groups[1].flows[0].lost_packets, 3);

        assert_eq!(groups[0].span_ns(), Some((0, 1500)));
        assert_eq!(groups[1].span_ns(), Some((2000, 2500)));
    }

    #[test]
    fn flow_count_is_conserved() {
        let sizes = BTreeMap::from([(0, 3), (1, 3), (2, 3)]);
        let groups = group_bursts(&report(7), &sizes, 0, 14).unwrap();
        let total: usize = groups.iter().map(|g| g.flows.len()).sum();
        assert_eq!(total, 7);
        // final burst is a partial flush
        assert_eq!(groups.last().unwrap().flows.len(), 1);
    }

    #[test]
    fn missing_burst_size_is_an_error() {
        let sizes = BTreeMap::from([(0, 1)]);
        // second burst has no configured size
        assert!(matches!(
            group_bursts(&report(3), &sizes, 0, 6),
            Err(TraceError::MissingBurstSize(1))
        ));
    }

    #[test]
    fn out_of_range_flow_is_an_error() {
        let sizes = BTreeMap::from([(0, 10)]);
        assert!(matches!(
            group_bursts(&report(2), &sizes, 0, 6),
            Err(TraceError::MissingFlow(4))
        ));
    }
}

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
//! Processors for the per-flow event traces: bandwidth/RTT samples, flow
//! completion events, and application frame events. All three share the
//! "group lines by flow id" pattern with an explicit per-flow state record
//! initialized on the flow's first line.
//!
//! Empty-input policy (see DESIGN.md): the windowed bandwidth average is
//! defined as `0` when no sample falls into the window; FCT and app-delay
//! summaries expose `Option` accessors that return `None` on empty input.

use std::{
    collections::{btree_map::Entry, BTreeMap},
    fs,
    path::Path,
};

use serde::Serialize;

use crate::{
    trace::{token, MalformedLine, TimeWindow, TraceError},
    FlowId, Nanos,
};

/// RTT samples above this value count towards the violation duration.
pub const RTT_VIOLATION_THRESHOLD: i64 = 200;
/// Value of the optional 13th column flagging a retransmission timeout.
pub const RTO_SENTINEL: i64 = 4;
/// Frame delays above this value count as late.
pub const APP_DELAY_THRESHOLD: i64 = 190;
/// Weight of one late frame in the late duration (frame interval).
pub const APP_LATE_FRAME_WEIGHT: i64 = 20;

/// Running state of one flow in the bandwidth trace, created from the flow's
/// first sample (which initializes counters without contributing statistics).
#[derive(Clone, Debug)]
struct BwFlowState {
    last_ts: Nanos,
    /// Smoothed sampling interval, `interval += (delta - interval) >> 3`.
    /// Integer arithmetic throughout; the violation duration below must stay
    /// integral.
    interval: i64,
    max_rtt: i64,
    rtt_violations: i64,
    bw_sum: i64,
    bw_count: u64,
    rto_count: u64,
    series: Vec<(Nanos, i64)>,
}

impl BwFlowState {
    fn first(ts: Nanos, rtt: i64) -> Self {
        Self {
            last_ts: ts,
            interval: 0,
            max_rtt: rtt,
            rtt_violations: 0,
            bw_sum: 0,
            bw_count: 0,
            rto_count: 0,
            series: Vec::new(),
        }
    }

    fn observe(&mut self, ts: Nanos, bw: i64, rtt: i64, window: TimeWindow, is_rto: bool) {
        let delta = ts - self.last_ts;
        self.interval += (delta - self.interval) >> 3;
        self.last_ts = ts;

        if rtt > self.max_rtt {
            self.max_rtt = rtt;
        }
        if rtt > RTT_VIOLATION_THRESHOLD {
            self.rtt_violations += 1;
        }
        if window.contains(ts) {
            self.bw_sum += bw;
            self.bw_count += 1;
            self.series.push((ts, bw));
        }
        if is_rto {
            self.rto_count += 1;
        }
    }
}

/// Aggregates of one flow in the bandwidth trace.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BwFlowSummary {
    pub max_rtt: i64,
    /// Number of RTT-violating samples scaled by the smoothed sampling
    /// interval.
    pub rtt_violation_dur: i64,
    /// Average bandwidth over the samples inside the window, `0.0` if none.
    pub avg_bandwidth: f64,
    pub rto_count: u64,
    /// Raw `(time, bandwidth)` samples inside the window, for plotting.
    pub series: Vec<(Nanos, i64)>,
}

/// Process a bandwidth/RTT trace. Token layout per line:
/// `timestamp _ flowid _ bandwidth _ rtt ...`, with an optional 13th column
/// whose sentinel value flags an RTO (only checked on lines with more than 7
/// tokens).
pub fn process_bandwidth_trace(
    path: impl AsRef<Path>,
    window: TimeWindow,
    on_malformed: MalformedLine,
) -> Result<BTreeMap<FlowId, BwFlowSummary>, TraceError> {
    let raw = fs::read_to_string(path.as_ref())?;
    let mut flows: BTreeMap<FlowId, BwFlowState> = BTreeMap::new();

    for (line_no, line) in nonempty_lines(&raw) {
        let parsed = (|| {
            let tokens = line.split_whitespace().collect::<Vec<_>>();
            let ts: Nanos = token(&tokens, 0, line_no)?;
            let flow: FlowId = token(&tokens, 2, line_no)?;
            let bw: i64 = token(&tokens, 4, line_no)?;
            let rtt: i64 = token(&tokens, 6, line_no)?;
            let is_rto = tokens.len() > 7 && token::<i64>(&tokens, 12, line_no)? == RTO_SENTINEL;
            Ok((ts, flow, bw, rtt, is_rto))
        })();
        let (ts, flow, bw, rtt, is_rto) = match parsed {
            Ok(x) => x,
            Err(e) => match on_malformed {
                MalformedLine::Fail => return Err(e),
                MalformedLine::Skip => {
                    log::debug!("{}: {e}", path.as_ref().display());
                    continue;
                }
            },
        };

        match flows.entry(flow) {
            // the first sample only initializes the flow's state
            Entry::Vacant(e) => {
                e.insert(BwFlowState::first(ts, rtt));
            }
            Entry::Occupied(mut e) => e.get_mut().observe(ts, bw, rtt, window, is_rto),
        }
    }

    Ok(flows
        .into_iter()
        .map(|(flow, state)| {
            let avg_bandwidth = if state.bw_count > 0 {
                state.bw_sum as f64 / state.bw_count as f64
            } else {
                0.0
            };
            (
                flow,
                BwFlowSummary {
                    max_rtt: state.max_rtt,
                    rtt_violation_dur: state.rtt_violations * state.interval,
                    avg_bandwidth,
                    rto_count: state.rto_count,
                    series: state.series,
                },
            )
        })
        .collect())
}

/// First-seen and last-seen timestamp of one flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FlowSpan {
    pub first_ns: Nanos,
    pub last_ns: Nanos,
}

impl FlowSpan {
    pub fn fct_ns(&self) -> Nanos {
        self.last_ns - self.first_ns
    }
}

/// Flow completion times of one trace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FctSummary {
    pub per_flow: BTreeMap<FlowId, FlowSpan>,
}

impl FctSummary {
    pub fn fcts(&self) -> Vec<Nanos> {
        self.per_flow.values().map(FlowSpan::fct_ns).collect()
    }

    pub fn mean_fct_ns(&self) -> Option<f64> {
        crate::stats::mean_i64(&self.fcts())
    }

    pub fn max_fct_ns(&self) -> Option<Nanos> {
        self.per_flow.values().map(FlowSpan::fct_ns).max()
    }

    /// Latest flow start, lower bound of the common measurement window.
    pub fn latest_start_ns(&self) -> Option<Nanos> {
        self.per_flow.values().map(|s| s.first_ns).max()
    }

    /// Earliest flow end, upper bound of the common measurement window.
    pub fn earliest_end_ns(&self) -> Option<Nanos> {
        self.per_flow.values().map(|s| s.last_ns).min()
    }
}

/// Process a flow-completion trace: per flow, the first and last observed
/// timestamp. Token layout per line: `timestamp _ flowid ...`.
pub fn process_fct_trace(
    path: impl AsRef<Path>,
    on_malformed: MalformedLine,
) -> Result<FctSummary, TraceError> {
    let raw = fs::read_to_string(path.as_ref())?;
    let mut summary = FctSummary::default();

    for (line_no, line) in nonempty_lines(&raw) {
        let parsed = (|| {
            let tokens = line.split_whitespace().collect::<Vec<_>>();
            let ts: Nanos = token(&tokens, 0, line_no)?;
            let flow: FlowId = token(&tokens, 2, line_no)?;
            Ok((ts, flow))
        })();
        let (ts, flow) = match parsed {
            Ok(x) => x,
            Err(e) => match on_malformed {
                MalformedLine::Fail => return Err(e),
                MalformedLine::Skip => {
                    log::debug!("{}: {e}", path.as_ref().display());
                    continue;
                }
            },
        };

        summary
            .per_flow
            .entry(flow)
            .and_modify(|span| span.last_ns = ts)
            .or_insert(FlowSpan {
                first_ns: ts,
                last_ns: ts,
            });
    }

    Ok(summary)
}

/// Frame delays of one flow within the analysis window.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AppFlowSummary {
    /// Decode delay per qualifying frame, in frame-id order.
    pub delays: Vec<i64>,
}

impl AppFlowSummary {
    pub fn max_delay(&self) -> Option<i64> {
        self.delays.iter().copied().max()
    }

    pub fn avg_delay(&self) -> Option<f64> {
        crate::stats::mean_i64(&self.delays)
    }

    /// Count of late frames weighted by the frame interval.
    pub fn late_duration(&self) -> i64 {
        self.delays.iter().filter(|&&d| d > APP_DELAY_THRESHOLD).count() as i64
            * APP_LATE_FRAME_WEIGHT
    }
}

#[derive(Clone, Debug, Default)]
struct AppFlowState {
    send: BTreeMap<u64, Nanos>,
    decode: BTreeMap<u64, Nanos>,
}

/// Process an application frame trace. Token layout per line:
/// `timestamp _ flowid action _ frameid`, where `action` is `Send`, `Decode`,
/// or `Discard`. A frame qualifies when its decode (or discard) timestamp
/// falls in the half-open window `[start, start + duration)`.
pub fn process_app_trace(
    path: impl AsRef<Path>,
    start: Nanos,
    duration: Nanos,
    on_malformed: MalformedLine,
) -> Result<BTreeMap<FlowId, AppFlowSummary>, TraceError> {
    let raw = fs::read_to_string(path.as_ref())?;
    let mut flows: BTreeMap<FlowId, AppFlowState> = BTreeMap::new();

    for (line_no, line) in nonempty_lines(&raw) {
        let parsed = (|| {
            let tokens = line.split_whitespace().collect::<Vec<_>>();
            let ts: Nanos = token(&tokens, 0, line_no)?;
            let flow: FlowId = token(&tokens, 2, line_no)?;
            let action: String = token(&tokens, 3, line_no)?;
            let frame: u64 = token(&tokens, 5, line_no)?;
            Ok((ts, flow, action, frame))
        })();
        let (ts, flow, action, frame) = match parsed {
            Ok(x) => x,
            Err(e) => match on_malformed {
                MalformedLine::Fail => return Err(e),
                MalformedLine::Skip => {
                    log::debug!("{}: {e}", path.as_ref().display());
                    continue;
                }
            },
        };

        let state = flows.entry(flow).or_default();
        match action.as_str() {
            "Send" => {
                state.send.insert(frame, ts);
            }
            "Decode" | "Discard" => {
                state.decode.insert(frame, ts);
            }
            // other frame events (e.g. "Recv") carry no delay information
            _ => {}
        }
    }

    Ok(flows
        .into_iter()
        .map(|(flow, state)| {
            let mut summary = AppFlowSummary::default();
            for (frame, &decode_ts) in &state.decode {
                if decode_ts < start || decode_ts >= start + duration {
                    continue;
                }
                match state.send.get(frame) {
                    Some(&send_ts) => summary.delays.push(decode_ts - send_ts),
                    // decoded frame without a send record; dropped rather
                    // than crashing the whole analysis
                    None => log::warn!("Flow {flow}: frame {frame} decoded but never sent"),
                }
            }
            (flow, summary)
        })
        .collect())
}

fn nonempty_lines(raw: &str) -> impl Iterator<Item = (usize, &str)> {
    raw.lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l))
        .filter(|(_, l)| !l.trim().is_empty())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::trace::testutil::TempTrace;

    #[test]
    fn bandwidth_windowed_average() {
        // flow 7: first line initializes only; two samples inside the
        // window, one outside
        let trace = TempTrace::new(
            "bw",
            "\
0 x 7 x 100 x 50
1000 x 7 x 200 x 60
2000 x 7 x 400 x 70
9000 x 7 x 999 x 80
",
        );
        let flows = process_bandwidth_trace(
            &trace.0,
            TimeWindow::new(500, 2500),
            MalformedLine::Fail,
        )
        .unwrap();
        let s = &flows[&7];
        assert_eq!(s.avg_bandwidth, 300.0);
        assert_eq!(s.series, vec![(1000, 200), (2000, 400)]);
        assert_eq!(s.max_rtt, 80);
        assert_eq!(s.rto_count, 0);
    }

    #[test]
    fn bandwidth_empty_window_is_zero() {
        let trace = TempTrace::new(
            "bw",
            "\
0 x 1 x 100 x 50
1000 x 1 x 200 x 60
",
        );
        let flows = process_bandwidth_trace(
            &trace.0,
            TimeWindow::new(5000, 9000),
            MalformedLine::Fail,
        )
        .unwrap();
        assert_eq!(flows[&1].avg_bandwidth, 0.0);
        assert!(flows[&1].series.is_empty());
    }

    #[test]
    fn interval_smoothing_is_integral() {
        // deltas of 800 per sample: interval converges from below through
        // repeated `interval += (delta - interval) >> 3`
        let mut content = String::new();
        for i in 0..4 {
            content.push_str(&format!("{} x 3 x 10 x 300\n", i * 800));
        }
        let trace = TempTrace::new("bw", &content);
        let flows =
            process_bandwidth_trace(&trace.0, TimeWindow::new(0, i64::MAX), MalformedLine::Fail)
                .unwrap();
        // interval: 0 -> 100 -> 187 -> 263; three violating samples (>200)
        assert_eq!(flows[&3].rtt_violation_dur, 3 * 263);
    }

    #[test]
    fn rto_flag_needs_full_line() {
        let trace = TempTrace::new(
            "bw",
            "\
0 x 5 x 100 x 50
1000 x 5 x 100 x 50 a b c d e 4
2000 x 5 x 100 x 50 a b c d e 2
",
        );
        let flows =
            process_bandwidth_trace(&trace.0, TimeWindow::new(0, i64::MAX), MalformedLine::Fail)
                .unwrap();
        assert_eq!(flows[&5].rto_count, 1);
    }

    #[test]
    fn malformed_bandwidth_line_policies() {
        let trace = TempTrace::new(
            "bw",
            "\
0 x 1 x 100 x 50
not-a-number x 1 x 100 x 50
2000 x 1 x 300 x 50
",
        );
        assert!(process_bandwidth_trace(
            &trace.0,
            TimeWindow::new(0, i64::MAX),
            MalformedLine::Fail
        )
        .is_err());
        let flows =
            process_bandwidth_trace(&trace.0, TimeWindow::new(0, i64::MAX), MalformedLine::Skip)
                .unwrap();
        assert_eq!(flows[&1].series, vec![(2000, 300)]);
    }

    #[test]
    fn fct_first_and_last_seen() {
        let trace = TempTrace::new(
            "fct",
            "\
100 x 1 data
200 x 2 data
300 x 1 data
900 x 2 data
500 x 1 data
",
        );
        let summary = process_fct_trace(&trace.0, MalformedLine::Fail).unwrap();
        assert_eq!(summary.per_flow[&1].fct_ns(), 400);
        assert_eq!(summary.per_flow[&2].fct_ns(), 700);
        assert_eq!(summary.fcts(), vec![400, 700]);
        assert_eq!(summary.mean_fct_ns(), Some(550.0));
        assert_eq!(summary.max_fct_ns(), Some(700));
        assert_eq!(summary.latest_start_ns(), Some(200));
        assert_eq!(summary.earliest_end_ns(), Some(500));
    }

    #[test]
    fn fct_empty_trace() {
        let trace = TempTrace::new("fct", "");
        let summary = process_fct_trace(&trace.0, MalformedLine::Fail).unwrap();
        assert!(summary.per_flow.is_empty());
        assert_eq!(summary.mean_fct_ns(), None);
        assert_eq!(summary.max_fct_ns(), None);
    }

    #[test]
    fn app_delays_in_window() {
        let trace = TempTrace::new(
            "app",
            "\
14000 x 1 Send x 0
14100 x 1 Decode x 0
14200 x 1 Send x 1
14500 x 1 Discard x 1
17000 x 1 Send x 2
18500 x 1 Decode x 2
",
        );
        let flows = process_app_trace(&trace.0, 14000, 5000, MalformedLine::Fail).unwrap();
        let s = &flows[&1];
        // frame 0: 100, frame 1: 300 (discard counts), frame 2: 1500 -> late
        assert_eq!(s.delays, vec![100, 300, 1500]);
        assert_eq!(s.max_delay(), Some(1500));
        assert_eq!(s.late_duration(), 2 * APP_LATE_FRAME_WEIGHT);
    }

    #[test]
    fn app_window_is_half_open() {
        let trace = TempTrace::new(
            "app",
            "\
0 x 1 Send x 0
1000 x 1 Decode x 0
500 x 1 Send x 1
2000 x 1 Decode x 1
",
        );
        // [1000, 2000): frame 0 inside, frame 1 exactly at the end -> out
        let flows = process_app_trace(&trace.0, 1000, 1000, MalformedLine::Fail).unwrap();
        assert_eq!(flows[&1].delays, vec![1000]);
    }

    #[test]
    fn app_flow_without_qualifying_frames() {
        let trace = TempTrace::new(
            "app",
            "\
0 x 1 Send x 0
100 x 1 Decode x 0
",
        );
        let flows = process_app_trace(&trace.0, 5000, 1000, MalformedLine::Fail).unwrap();
        let s = &flows[&1];
        assert!(s.delays.is_empty());
        assert_eq!(s.max_delay(), None);
        assert_eq!(s.avg_delay(), None);
        assert_eq!(s.late_duration(), 0);
    }
}

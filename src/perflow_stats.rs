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
//! Per-flow analysis over the bandwidth/FCT/application trace triples of the
//! burst experiments: per `(algorithm, burst size, flow count)`, the mean and
//! p90 flow completion time, RTT extremes, application frame delays, and the
//! fraction of traces that hit a retransmission timeout.
//!
//! A trace with an RTO restarts its flows from slow start, so its other
//! metrics measure recovery rather than steady-state behavior; such traces
//! only contribute to the RTO fraction.

use std::{collections::BTreeMap, fs, path::PathBuf};

use clap::Parser;
use itertools::{iproduct, Itertools};
use rayon::prelude::*;

use titrate_eval::{
    output,
    prelude::*,
    records::{PerFlowKey, PerFlowSummary, TableKey},
    stats,
    trace::perflow,
    util::{self, PathBufExt},
};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Overwrite the input path for data.
    #[arg(short, long, default_value = "./data/")]
    data_path: String,
    /// Overwrite the output path for the result tables.
    #[arg(short, long, default_value = "./results/")]
    output_path: String,
    /// Algorithms under test (free-form testbed variant names).
    #[arg(long, value_delimiter = ',', required = true)]
    algorithms: Vec<String>,
    /// Burst sizes in packets.
    #[arg(long, value_delimiter = ',', default_values_t = vec![15_000])]
    bursts: Vec<usize>,
    /// Flow counts.
    #[arg(long, value_delimiter = ',', default_values_t = vec![50])]
    flow_counts: Vec<usize>,
    /// Number of trace ids per setting.
    #[arg(long, default_value_t = 50)]
    traces: usize,
    /// Stem of the workload trace file names.
    #[arg(long, default_value = "maxwell_10.0_0.02")]
    workload: String,
    /// Start of the bandwidth measurement window, nanoseconds.
    #[arg(long, default_value_t = 0)]
    bw_window_start: i64,
    /// End of the bandwidth measurement window, nanoseconds.
    #[arg(long, default_value_t = i64::MAX)]
    bw_window_end: i64,
    /// Start of the application-delay window, milliseconds.
    #[arg(long, default_value_t = 0)]
    app_window_start: i64,
    /// Duration of the application-delay window, milliseconds.
    #[arg(long, default_value_t = 200_000)]
    app_window_duration: i64,
    /// Jointly trim per-trace outliers before averaging.
    #[arg(long)]
    trim_outliers: bool,
    /// Drop lines that do not match the trace schema instead of aborting.
    #[arg(long)]
    skip_malformed: bool,
}

/// Metrics of one non-RTO trace.
#[derive(Clone, Copy, Debug)]
struct TraceMetrics {
    mean_fct_ms: f64,
    p90_fct_ms: f64,
    max_rtt_ms: f64,
    rtt_violation_ms: f64,
    max_app_delay_ms: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_logging();

    let args = Args::parse();
    let data_path = PathBuf::from(&args.data_path);
    let output_path = PathBuf::from(&args.output_path);
    fs::create_dir_all(&output_path)?;

    let settings = iproduct!(&args.algorithms, &args.bursts, &args.flow_counts).collect_vec();

    let summaries = settings
        .into_par_iter()
        .map(|(algorithm, &burst, &flow_count)| {
            let summary = process_setting(&args, &data_path, algorithm, burst, flow_count)?;
            let key = PerFlowKey {
                algorithm: algorithm.clone(),
                burst,
                flow_count,
            };
            Ok((key, summary))
        })
        .collect::<Result<Vec<_>, TraceError>>()?;

    // one table per metric, plus the full summary as json
    let metric_rows = |f: fn(&PerFlowSummary) -> f64| {
        summaries
            .iter()
            .map(|(key, summary)| (key.clone(), vec![f(summary)]))
            .collect_vec()
    };
    output::write_table(
        output_path.clone().then("data_avgfct.txt"),
        &metric_rows(|s| s.mean_fct_s),
    )?;
    output::write_table(
        output_path.clone().then("data_p90fct.txt"),
        &metric_rows(|s| s.p90_fct_s),
    )?;
    output::write_table(
        output_path.clone().then("data_maxrtt.txt"),
        &metric_rows(|s| s.max_rtt_ms),
    )?;
    output::write_table(
        output_path.clone().then("data_rttdur.txt"),
        &metric_rows(|s| s.rtt_violation_ms),
    )?;
    output::write_table(
        output_path.clone().then("data_maxapp.txt"),
        &metric_rows(|s| s.max_app_delay_ms),
    )?;
    output::write_table(
        output_path.clone().then("data_rtonum.txt"),
        &metric_rows(|s| s.rto_fraction),
    )?;

    let json = serde_json::to_string_pretty(
        &summaries
            .iter()
            .map(|(key, summary)| (key.fields().join("_"), summary))
            .collect::<BTreeMap<_, _>>(),
    )?;
    fs::write(output_path.then("summary.json"), json)?;

    Ok(())
}

fn process_setting(
    args: &Args,
    data_path: &PathBuf,
    algorithm: &str,
    burst: usize,
    flow_count: usize,
) -> Result<PerFlowSummary, TraceError> {
    let on_malformed = if args.skip_malformed {
        MalformedLine::Skip
    } else {
        MalformedLine::Fail
    };
    let window = TimeWindow::new(args.bw_window_start, args.bw_window_end);

    let mut metrics: Vec<TraceMetrics> = Vec::new();
    let mut rto_traces = 0usize;
    for trace_id in 0..args.traces {
        let file = |prefix: &str| {
            data_path.clone().then(format!(
                "{prefix}_{algorithm}_{}_{trace_id}.pitree-trace_{flow_count}_1_{burst}.tr",
                args.workload
            ))
        };
        let bw_path = file("bwCopa");
        let fct_path = file("fctCopa");
        let app_path = file("appCopa");
        if !bw_path.exists() || !fct_path.exists() || !app_path.exists() {
            log::warn!("{algorithm}/{burst}/{flow_count}: trace {trace_id} missing, omitting");
            continue;
        }

        let bw = perflow::process_bandwidth_trace(&bw_path, window, on_malformed)?;
        if bw.values().any(|flow| flow.rto_count > 0) {
            rto_traces += 1;
            continue;
        }

        let fct = perflow::process_fct_trace(&fct_path, on_malformed)?;
        let app = perflow::process_app_trace(
            &app_path,
            args.app_window_start,
            args.app_window_duration,
            on_malformed,
        )?;

        let fcts_ms = fct.fcts().iter().map(|&f| f as f64 / 1e6).collect_vec();
        metrics.push(TraceMetrics {
            mean_fct_ms: stats::mean(&fcts_ms).unwrap_or(0.0),
            p90_fct_ms: stats::rank_percentile(&fcts_ms, 0.9).unwrap_or(0.0),
            max_rtt_ms: bw.values().map(|f| f.max_rtt).max().unwrap_or(0) as f64,
            rtt_violation_ms: bw.values().map(|f| f.rtt_violation_dur).max().unwrap_or(0) as f64,
            max_app_delay_ms: app
                .values()
                .filter_map(|f| f.max_delay())
                .max()
                .unwrap_or(0) as f64,
        });
    }

    let mut columns = vec![
        metrics.iter().map(|m| m.mean_fct_ms).collect_vec(),
        metrics.iter().map(|m| m.p90_fct_ms).collect_vec(),
        metrics.iter().map(|m| m.max_rtt_ms).collect_vec(),
        metrics.iter().map(|m| m.rtt_violation_ms).collect_vec(),
        metrics.iter().map(|m| m.max_app_delay_ms).collect_vec(),
    ];
    if args.trim_outliers {
        columns = stats::remove_outliers(&columns);
    }

    let avg = |c: &[f64]| stats::mean(c).unwrap_or(0.0);
    Ok(PerFlowSummary {
        mean_fct_s: avg(&columns[0]) / 1e3,
        p90_fct_s: avg(&columns[1]) / 1e3,
        max_rtt_ms: avg(&columns[2]),
        rtt_violation_ms: avg(&columns[3]),
        max_app_delay_ms: avg(&columns[4]),
        rto_fraction: rto_traces as f64 / args.traces as f64,
    })
}

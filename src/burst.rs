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
//! Web-burst analysis: per `(web trace, scheme)`, the burst completion times
//! and packet drops over all seeds. The burst completion time is the span
//! from the first packet sent to the last packet received over the burst's
//! flows, minus the average queueing latency of the bottleneck queue (a
//! burst cannot complete faster than the standing queue drains).

use std::{fs, path::PathBuf};

use clap::Parser;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use rayon::prelude::*;

use titrate_eval::{
    output,
    prelude::*,
    records::BurstKey,
    stats,
    trace::{
        flow_monitor,
        queue::{self, QueueLayout},
    },
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
    /// Web-trace ids driving the burst workload.
    #[arg(long, value_delimiter = ',', default_values_t = vec![26, 141])]
    webtraces: Vec<usize>,
    /// Buffer-management schemes to compare.
    #[arg(long, value_delimiter = ',', default_values_t = vec![
        Scheme::Titrate, Scheme::ProbeOnly, Scheme::Codel, Scheme::Pie, Scheme::Static,
    ])]
    schemes: Vec<Scheme>,
    /// Congestion-control mix of the burst experiments.
    #[arg(long, default_value_t = CcaMix::RealMix)]
    cca: CcaMix,
    /// Flow-count class of the burst experiments.
    #[arg(long, default_value_t = FlowClass::Small)]
    flow_class: FlowClass,
    /// Bottleneck round-trip time in milliseconds.
    #[arg(long, default_value_t = 300)]
    rtt: u32,
    /// Number of configuration seeds per web trace.
    #[arg(long, default_value_t = 10)]
    seeds: u32,
    /// Expected sample count; shorter traces are reported.
    #[arg(long, default_value_t = 20_000)]
    min_samples: usize,
    /// Bottleneck link rate in Mbps, for the queueing-delay conversion.
    #[arg(long, default_value_t = 1000)]
    link_mbps: u32,
    /// Number of switch ports in the queue trace.
    #[arg(long, default_value_t = 1)]
    num_ports: usize,
    /// Number of queues per port in the queue trace.
    #[arg(long, default_value_t = 2)]
    num_queues: usize,
    /// Port of the bottleneck queue.
    #[arg(long, default_value_t = 0)]
    port: usize,
    /// Queue of the bottleneck queue.
    #[arg(long, default_value_t = 1)]
    queue: usize,
    /// Drop lines that do not match the trace schema instead of aborting.
    #[arg(long)]
    skip_malformed: bool,
}

/// Burst completion times (seconds) and drop counts of one seed.
#[derive(Debug, Default)]
struct SeedResult {
    bcts: Vec<f64>,
    drops: Vec<f64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_logging();

    let args = Args::parse();
    let data_path = PathBuf::from(&args.data_path);
    let output_path = PathBuf::from(&args.output_path);
    fs::create_dir_all(&output_path)?;

    let layout = QueueLayout::new(args.num_ports, args.num_queues);
    let on_malformed = if args.skip_malformed {
        MalformedLine::Skip
    } else {
        MalformedLine::Fail
    };

    let cells = args
        .webtraces
        .iter()
        .cartesian_product(&args.schemes)
        .collect_vec();

    let rows = cells
        .into_par_iter()
        .map(|(&wtid, &scheme)| {
            let mut result = SeedResult::default();
            for seed in 0..args.seeds {
                let config = ExperimentConfig {
                    cca: args.cca,
                    flow_class: args.flow_class,
                    rtt_ms: args.rtt,
                    seed,
                };
                let name = format!("wt{wtid}_{config}");
                match process_seed(&args, &data_path, &name, scheme, layout, on_malformed)? {
                    Some(seed_result) => {
                        result.bcts.extend(seed_result.bcts);
                        result.drops.extend(seed_result.drops);
                    }
                    None => log::warn!("wt{wtid}/{scheme}: omitting seed {seed}"),
                }
            }
            // sorted for the CDF plots
            result.bcts.sort_by_key(|v| OrderedFloat(*v));
            result.drops.sort_by_key(|v| OrderedFloat(*v));
            let key = BurstKey {
                webtrace: format!("wt{wtid}"),
                scheme,
            };
            Ok((key, result))
        })
        .collect::<Result<Vec<_>, TraceError>>()?;

    let (bct_rows, drop_rows): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .map(|(key, result)| ((key.clone(), result.bcts), (key, result.drops)))
        .unzip();

    output::write_table(output_path.clone().then("data_bct.txt"), &bct_rows)?;
    output::write_table(output_path.then("data_ndrop.txt"), &drop_rows)?;

    Ok(())
}

/// Process one seed of one `(web trace, scheme)` cell. Returns `None` when an
/// input file is missing; the seed is then omitted and the run continues.
fn process_seed(
    args: &Args,
    data_path: &PathBuf,
    name: &str,
    scheme: Scheme,
    layout: QueueLayout,
    on_malformed: MalformedLine,
) -> Result<Option<SeedResult>, TraceError> {
    let trace_dir = data_path.clone().then(name).then(scheme.to_string());
    let tor = trace_dir.clone().then("tor.tr");
    let xml = trace_dir.then("flowmonitor.xml");
    let conf = data_path
        .clone()
        .then("configurations")
        .then(format!("{name}.conf"));
    let nfconf = data_path
        .clone()
        .then("nfconfigurations")
        .then(format!("{name}.conf"));

    for path in [&tor, &xml, &conf, &nfconf] {
        if !path.exists() {
            log::warn!("{}: not found", path.display());
            return Ok(None);
        }
    }

    // flow-id range of the burst flows: the long-lived flows come first,
    // each flow contributing a forward/backward pair
    let total_flows = read_first_token(&conf, 0)?;
    let burst_flows = read_first_token(&nfconf, 2)?;
    let flow_start = (total_flows - burst_flows) * 2;
    let flow_end = total_flows * 2;

    let series = queue::read_queue_trace(&tor, layout, args.port, args.queue, on_malformed)?;
    series.check_length(args.min_samples, name);
    let Some(avg_qlen) = stats::mean_i64(&series.qlen) else {
        log::warn!("{}: empty queue trace", tor.display());
        return Ok(None);
    };
    let avg_qlat_ns = stats::queueing_delay_ns(avg_qlen, args.link_mbps as f64);

    let monitor = flow_monitor::read_flow_monitor(&xml)?;
    let burst_sizes = flow_monitor::read_burst_sizes(&nfconf)?;
    let groups = flow_monitor::group_bursts(&monitor, &burst_sizes, flow_start, flow_end)?;

    let mut result = SeedResult::default();
    for group in &groups {
        let Some((start_ns, end_ns)) = group.span_ns() else {
            continue;
        };
        result
            .bcts
            .push(((end_ns - start_ns) as f64 - avg_qlat_ns) / 1e9);
        result.drops.push(group.total_lost() as f64);
    }
    Ok(Some(result))
}

/// Read token `idx` of the first line of a side-channel config file.
fn read_first_token(path: &PathBuf, idx: usize) -> Result<usize, TraceError> {
    let raw = fs::read_to_string(path)?;
    let line = raw.lines().next().ok_or(TraceError::Malformed {
        line: 1,
        reason: "empty config file".to_string(),
    })?;
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    tokens
        .get(idx)
        .and_then(|t| t.parse().ok())
        .ok_or(TraceError::Malformed {
            line: 1,
            reason: format!("cannot parse token {idx}"),
        })
}

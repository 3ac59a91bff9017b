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
//! Throughput/latency analysis: per `(rtt, cca, flow class, scheme)`, the
//! average bottleneck throughput and the average queueing latency over the
//! measurement window, one column per seed. Produces the two tables behind
//! the throughput-vs-latency figures.

use std::{fs, path::PathBuf};

use clap::Parser;
use itertools::{iproduct, Itertools};
use rayon::prelude::*;

use titrate_eval::{
    output,
    prelude::*,
    records::SchemeKey,
    stats,
    trace::queue::{self, QueueLayout},
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
    /// Buffer-management schemes to compare.
    #[arg(long, value_delimiter = ',', default_values_t = vec![
        Scheme::Titrate, Scheme::Codel, Scheme::Pie, Scheme::Static,
    ])]
    schemes: Vec<Scheme>,
    /// Congestion-control mixes to include.
    #[arg(long, value_delimiter = ',', default_values_t = vec![
        CcaMix::Cubic, CcaMix::Bbr, CcaMix::RealMix,
    ])]
    ccas: Vec<CcaMix>,
    /// Bottleneck round-trip times in milliseconds.
    #[arg(long, value_delimiter = ',', default_values_t = vec![50, 300])]
    rtts: Vec<u32>,
    /// Number of configuration seeds per axis point.
    #[arg(long, default_value_t = 5)]
    seeds: u32,
    /// First trace sample of the measurement window.
    #[arg(long, default_value_t = 0)]
    window_start: usize,
    /// One past the last trace sample of the measurement window.
    #[arg(long, default_value_t = 200_000)]
    window_end: usize,
    /// Expected sample count; shorter traces are reported.
    #[arg(long, default_value_t = 200_000)]
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

    // one table row per (rtt, cca, flow class, scheme), seeds as columns
    let axis = iproduct!(
        &args.rtts,
        &args.ccas,
        [FlowClass::Small, FlowClass::Large],
        &args.schemes
    )
    .collect_vec();

    let rows = axis
        .into_par_iter()
        .map(|(&rtt_ms, &cca, flow_class, &scheme)| {
            let mut thpts = Vec::new();
            let mut lats = Vec::new();
            for seed in 0..args.seeds {
                let config = ExperimentConfig {
                    cca,
                    flow_class,
                    rtt_ms,
                    seed,
                };
                let trace = config.trace_dir(&data_path, scheme).then("tor.tr");
                if !trace.exists() {
                    log::warn!("{}: not found, omitting seed {seed}", trace.display());
                    continue;
                }
                let series =
                    queue::read_queue_trace(&trace, layout, args.port, args.queue, on_malformed)?;
                series.check_length(args.min_samples, &format!("{config}/{scheme}"));

                let end = args.window_end.min(series.len());
                let (Some(avg_thpt), Some(avg_qlen)) = (
                    stats::windowed_mean(&series.thpt, args.window_start, end),
                    stats::windowed_mean_i64(&series.qlen, args.window_start, end),
                ) else {
                    log::warn!("{}: empty measurement window, omitting", trace.display());
                    continue;
                };
                thpts.push(avg_thpt);
                lats.push(stats::queueing_delay_ms(avg_qlen, args.link_mbps as f64));
            }
            let key = SchemeKey {
                rtt_ms,
                cca,
                flow_class,
                scheme,
            };
            Ok((key, thpts, lats))
        })
        .collect::<Result<Vec<_>, TraceError>>()?;

    let (thpt_rows, lat_rows): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .map(|(key, thpts, lats)| ((key, thpts), (key, lats)))
        .unzip();

    output::write_table(output_path.clone().then("data_throughput.txt"), &thpt_rows)?;
    output::write_table(output_path.then("data_latency.txt"), &lat_rows)?;

    Ok(())
}

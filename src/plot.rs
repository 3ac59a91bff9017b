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
//! Renders figures from the intermediate result tables: burst-completion
//! CDFs, throughput/latency box plots, the per-flow delay-vs-FCT scatter,
//! and the switch telemetry time series.

use std::{collections::BTreeMap, fs, path::PathBuf, process};

use clap::{Parser, ValueEnum};
use itertools::Itertools;
use plotly::{common::Mode, BoxPlot, Scatter};
use serde::Serialize;

use titrate_eval::{
    output,
    records::PerFlowSummary,
    stats,
    trace::telemetry,
    util::{self, PathBufExt},
};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Overwrite the input path for the result tables.
    #[arg(short, long, default_value = "./results/")]
    data_path: String,
    /// Overwrite the output path for plots.
    #[arg(short, long, default_value = "./plots/")]
    output_path: String,
    /// Type of plot to generate.
    #[arg(short, long, value_enum)]
    plot_type: Plot,
    /// Directory holding the testbed telemetry CSVs (`telemetry*.csv`).
    #[arg(long, default_value = "./results/")]
    telemetry: String,
    /// Last second of telemetry shown.
    #[arg(long, default_value_t = 30.0)]
    telemetry_horizon: f64,
}

#[derive(ValueEnum, Clone, Debug, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
enum Plot {
    /// CDF of burst completion times per web trace and scheme.
    #[default]
    Bct,
    /// Throughput and queueing-latency box plots over the seeds.
    ThptLat,
    /// Application delay vs. flow completion time per algorithm.
    PerFlow,
    /// Buffer occupancy and threshold of the testbed switch over time.
    Telemetry,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_logging();

    let args = Args::parse();
    let plot_dir = PathBuf::from(&args.output_path);
    fs::create_dir_all(&plot_dir)?;

    let data_path = PathBuf::from(&args.data_path);
    if !data_path.exists() {
        log::error!("Could not read data in {data_path:?}!");
        process::exit(1)
    }

    match args.plot_type {
        Plot::Bct => plot_bct_cdf(&data_path, &plot_dir)?,
        Plot::ThptLat => plot_thpt_lat(&data_path, &plot_dir)?,
        Plot::PerFlow => plot_perflow(&data_path, &plot_dir)?,
        Plot::Telemetry => plot_telemetry(&args, &plot_dir)?,
    }
    Ok(())
}

/// One CDF line per `(web trace, scheme)` row of the burst table.
fn plot_bct_cdf(
    data_path: &PathBuf,
    plot_dir: &PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let rows = output::read_table(data_path.clone().then("data_bct.txt"), 2)?;

    let mut plot = plotly::Plot::new();
    for row in rows {
        let name = row.key.join("/");
        let (xs, ys): (Vec<f64>, Vec<f64>) = stats::cdf(&row.values).into_iter().unzip();
        let trace = Scatter::new(xs, ys).name(&name).mode(Mode::Lines);
        plot.add_trace(trace);
    }

    let out = plot_dir.clone().then("bct_cdf.html");
    log::debug!("Plotting {out:?}");
    plot.write_html(out);
    Ok(())
}

/// Box plots over the per-seed averages, one figure for throughput and one
/// for queueing latency.
fn plot_thpt_lat(
    data_path: &PathBuf,
    plot_dir: &PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    for (table, figure) in [
        ("data_throughput.txt", "throughput.html"),
        ("data_latency.txt", "latency.html"),
    ] {
        let rows = output::read_table(data_path.clone().then(table), 4)?;

        let mut plot = plotly::Plot::new();
        for (name, values) in rows
            .into_iter()
            .map(|row| (row.key.join("/"), row.values))
            .sorted_by(|a, b| human_sort::compare(&a.0, &b.0))
        {
            let trace = BoxPlot::<f64, f64>::new(values).name(&name);
            plot.add_trace(trace);
        }

        let out = plot_dir.clone().then(figure);
        log::debug!("Plotting {out:?}");
        plot.write_html(out);
    }
    Ok(())
}

/// Scatter of the worst application delay against the mean flow completion
/// time, one marker per tested algorithm setting.
fn plot_perflow(
    data_path: &PathBuf,
    plot_dir: &PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(data_path.clone().then("summary.json"))?;
    let summaries: BTreeMap<String, PerFlowSummary> = serde_json::from_str(&raw)?;

    let mut plot = plotly::Plot::new();
    for (name, summary) in summaries {
        let trace = Scatter::new(vec![summary.max_app_delay_ms], vec![summary.mean_fct_s])
            .name(&name)
            .mode(Mode::Markers);
        plot.add_trace(trace);
    }

    let out = plot_dir.clone().then("perflow.html");
    log::debug!("Plotting {out:?}");
    plot.write_html(out);
    Ok(())
}

/// Time series of the switch buffer occupancy, its filtered average, and the
/// current threshold, all in MTU units. One figure per telemetry file (the
/// testbed writes one per tested algorithm).
fn plot_telemetry(args: &Args, plot_dir: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let files = util::glob_traces(&args.telemetry, "telemetry*.csv")?;
    if files.is_empty() {
        log::error!("No telemetry CSVs found in {}!", args.telemetry);
        process::exit(1)
    }

    for file in files {
        let records = telemetry::read_telemetry(&file)?;
        let shown = records
            .iter()
            .filter(|r| r.time_s() <= args.telemetry_horizon)
            .collect_vec();
        let time = shown.iter().map(|r| r.time_s()).collect_vec();

        let mut plot = plotly::Plot::new();
        for (name, values) in [
            (
                "buffer",
                shown.iter().map(|r| r.buffer_mtu()).collect_vec(),
            ),
            (
                "filtered avg",
                shown.iter().map(|r| r.filtered_avg_mtu()).collect_vec(),
            ),
            (
                "threshold",
                shown.iter().map(|r| r.threshold_mtu).collect_vec(),
            ),
        ] {
            let trace = Scatter::new(time.clone(), values)
                .name(name)
                .mode(Mode::Lines);
            plot.add_trace(trace);
        }

        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "telemetry".to_string());
        let out = plot_dir.clone().then(format!("{stem}.html"));
        log::debug!("Plotting {out:?}");
        plot.write_html(out);
    }
    Ok(())
}

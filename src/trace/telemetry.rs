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
//! Reader for the testbed switch telemetry CSV. The switch agent sometimes
//! restarts mid-run, so a file may lack the header row and may contain
//! partially written rows; both are tolerated.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{trace::TraceError, Nanos};

/// Bits per MTU-sized frame, for converting queue occupancy to MTU units.
pub const MTU_BITS: f64 = 1500.0 * 8.0;

/// One telemetry row of the testbed switch agent.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct TelemetryRecord {
    #[serde(rename = "ElapsedTimeNs")]
    pub elapsed_ns: Nanos,
    #[serde(rename = "TotalZeroBufferNs")]
    pub total_zero_buffer_ns: i64,
    #[serde(rename = "Throughput")]
    pub throughput: f64,
    #[serde(rename = "LastUpdateNs")]
    pub last_update_ns: i64,
    #[serde(rename = "CurrentThresholdMtu")]
    pub threshold_mtu: f64,
    #[serde(rename = "SsthreshMtu")]
    pub ssthresh_mtu: f64,
    #[serde(rename = "CurrentBufferBits")]
    pub buffer_bits: f64,
    #[serde(rename = "SimpleAvgBits")]
    pub simple_avg_bits: f64,
    #[serde(rename = "FilteredAvgBits")]
    pub filtered_avg_bits: f64,
    #[serde(rename = "BufferPercentage")]
    pub buffer_pct: f64,
}

impl TelemetryRecord {
    pub fn time_s(&self) -> f64 {
        self.elapsed_ns as f64 / 1e9
    }

    pub fn buffer_mtu(&self) -> f64 {
        self.buffer_bits / MTU_BITS
    }

    pub fn filtered_avg_mtu(&self) -> f64 {
        self.filtered_avg_bits / MTU_BITS
    }
}

/// Read a telemetry CSV, detecting whether the header row is present.
/// Partially written rows are dropped with a debug log.
pub fn read_telemetry(path: impl AsRef<Path>) -> Result<Vec<TelemetryRecord>, TraceError> {
    let raw = fs::read_to_string(path.as_ref())?;
    let has_headers = raw
        .lines()
        .next()
        .map(|l| l.starts_with("ElapsedTimeNs"))
        .unwrap_or(false);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let mut records = Vec::new();
    for (row, record) in rdr.deserialize().enumerate() {
        match record {
            Ok(r) => records.push(r),
            Err(e) => log::debug!("{}: dropping row {row}: {e}", path.as_ref().display()),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::trace::testutil::TempTrace;

    const HEADER: &str = "ElapsedTimeNs,TotalZeroBufferNs,Throughput,LastUpdateNs,\
CurrentThresholdMtu,SsthreshMtu,CurrentBufferBits,SimpleAvgBits,FilteredAvgBits,BufferPercentage";

    #[test]
    fn with_and_without_header() {
        let row = "1000000000,0,9.5,999,40.0,80.0,120000.0,60000.0,60000.0,12.5";

        let with = TempTrace::new("telemetry", &format!("{HEADER}\n{row}\n"));
        let records = read_telemetry(&with.0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].elapsed_ns, 1_000_000_000);
        assert_eq!(records[0].time_s(), 1.0);
        assert_eq!(records[0].buffer_mtu(), 10.0);

        let without = TempTrace::new("telemetry", &format!("{row}\n"));
        assert_eq!(read_telemetry(&without.0).unwrap(), records);
    }

    #[test]
    fn drops_partial_rows() {
        let content = format!(
            "{HEADER}\n1,0,1.0,0,1.0,1.0,1.0,1.0,1.0,1.0\n2,0,garbage\n3,0,1.0,0,1.0,1.0,1.0,1.0,1.0,1.0\n"
        );
        let trace = TempTrace::new("telemetry", &content);
        let records = read_telemetry(&trace.0).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].elapsed_ns, 3);
    }
}

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
//! Reader for the fixed-column queue-statistics trace (`tor.tr`).
//!
//! The first line is a header and the last line a trailer, both skipped. Each
//! interior line carries a timestamp, a sequence number, the overall buffer
//! occupancy in percent, and then one 5-tuple of counters per `(port, queue)`
//! pair: `{queueLength, throughput, sent, drop, threshold}`. The switch
//! occasionally crashes mid-write and leaves a null-byte-prefixed line behind;
//! such lines are dropped without affecting their neighbors.

use std::{fs, path::Path};

use crate::{
    trace::{token, MalformedLine, TraceError},
    Nanos,
};

/// Leading per-line columns before the per-queue tuples (timestamp, sequence
/// number, buffer percentage).
pub const FIXED_COLUMNS: usize = 3;
/// Counters recorded per `(port, queue)` pair on every line.
pub const FIELDS_PER_QUEUE: usize = 5;

/// Shape of one queue trace: how many ports the switch has and how many
/// queues each port carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueLayout {
    pub num_ports: usize,
    pub num_queues: usize,
}

impl QueueLayout {
    pub fn new(num_ports: usize, num_queues: usize) -> Self {
        Self {
            num_ports,
            num_queues,
        }
    }

    /// Number of `(port, queue)` series interleaved on each line.
    pub fn num_series(&self) -> usize {
        self.num_ports * self.num_queues
    }

    /// Expected token count of a data line under this layout.
    pub fn tokens_per_line(&self) -> usize {
        FIXED_COLUMNS + FIELDS_PER_QUEUE * self.num_series()
    }

    /// Flat index of a `(port, queue)` pair into the interleaved tuples.
    pub fn flat_index(&self, port: usize, queue: usize) -> usize {
        port * self.num_queues + queue
    }
}

/// Parallel time series of one selected `(port, queue)` pair. All six vectors
/// always have equal length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueSeries {
    pub time: Vec<Nanos>,
    /// Queue length in bytes.
    pub qlen: Vec<i64>,
    /// Cumulative sent counter.
    pub sent: Vec<i64>,
    /// Throughput in bits per second.
    pub thpt: Vec<f64>,
    /// Cumulative drop counter.
    pub drop: Vec<i64>,
    /// Buffer threshold in bytes (only meaningful for threshold-driven
    /// schemes; static schemes log a constant).
    pub thres: Vec<i64>,
}

impl QueueSeries {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Warn if the trace ended early (simulation crash or truncated copy).
    /// The short series is kept; skew is the caller's responsibility.
    pub fn check_length(&self, min_samples: usize, context: &str) {
        if self.len() < min_samples {
            log::warn!(
                "Short trace for {context}: {} samples, expected at least {min_samples}",
                self.len()
            );
        }
    }
}

/// Read the queue trace at `path` and extract the series of the selected
/// `(port, queue)` pair.
///
/// Every data line is validated against the declared schema (token count and
/// field types) so that a layout mismatch fails with a line number instead of
/// silently misaligning columns; `on_malformed` decides whether such lines
/// abort the read or are dropped.
pub fn read_queue_trace(
    path: impl AsRef<Path>,
    layout: QueueLayout,
    port: usize,
    queue: usize,
    on_malformed: MalformedLine,
) -> Result<QueueSeries, TraceError> {
    let raw = fs::read_to_string(path.as_ref())?;
    let lines = raw.lines().collect::<Vec<_>>();
    let idx = layout.flat_index(port, queue);
    assert!(
        idx < layout.num_series(),
        "({port}, {queue}) out of range for {layout:?}"
    );

    let mut series = QueueSeries::default();
    if lines.len() <= 2 {
        return Ok(series);
    }

    // skip the header and the trailer line
    for (line_no, line) in lines[1..lines.len() - 1].iter().enumerate() {
        // corrupted write, always dropped
        if line.starts_with('\0') {
            continue;
        }
        match parse_line(line, layout, idx, line_no + 2) {
            Ok((time, qlen, thpt, sent, drop, thres)) => {
                series.time.push(time);
                series.qlen.push(qlen);
                series.thpt.push(thpt);
                series.sent.push(sent);
                series.drop.push(drop);
                series.thres.push(thres);
            }
            Err(e) => match on_malformed {
                MalformedLine::Fail => return Err(e),
                MalformedLine::Skip => log::debug!("{}: {e}", path.as_ref().display()),
            },
        }
    }

    Ok(series)
}

fn parse_line(
    line: &str,
    layout: QueueLayout,
    idx: usize,
    line_no: usize,
) -> Result<(Nanos, i64, f64, i64, i64, i64), TraceError> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    if tokens.len() != layout.tokens_per_line() {
        return Err(TraceError::Malformed {
            line: line_no,
            reason: format!(
                "expected {} tokens for {layout:?}, got {}",
                layout.tokens_per_line(),
                tokens.len()
            ),
        });
    }

    let time = token(&tokens, 0, line_no)?;
    // buffer percentage, validated but not part of the per-queue series
    let _buffer_pct: f64 = token(&tokens, 2, line_no)?;

    let base = FIXED_COLUMNS + idx * FIELDS_PER_QUEUE;
    let qlen = token(&tokens, base, line_no)?;
    let thpt = token(&tokens, base + 1, line_no)?;
    let sent = token(&tokens, base + 2, line_no)?;
    let drop = token(&tokens, base + 3, line_no)?;
    let thres = token(&tokens, base + 4, line_no)?;
    Ok((time, qlen, thpt, sent, drop, thres))
}

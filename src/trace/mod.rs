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
//! Parsers for the trace formats produced by the simulator: the fixed-column
//! queue-statistics log, the flow-monitor XML report, the per-flow event
//! traces, and the testbed switch telemetry CSV.

use std::str::FromStr;

use crate::Nanos;

pub mod flow_monitor;
pub mod perflow;
pub mod queue;
pub mod telemetry;

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML Error: {0}")]
    Xml(#[from] quick_xml::DeError),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Malformed line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("No flow record with index {0} in the flow-monitor report")]
    MissingFlow(usize),
    #[error("No expected flow count configured for burst {0}")]
    MissingBurstSize(usize),
}

/// What to do with a line that does not match the declared schema. Lines with
/// a null-byte prefix are write corruptions and always skipped; this policy
/// covers everything else (wrong token count, unparsable field).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MalformedLine {
    /// Abort parsing with [`TraceError::Malformed`].
    #[default]
    Fail,
    /// Drop the line and keep going.
    Skip,
}

/// Closed time interval `[start_ns, end_ns]` selecting trace samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ns: Nanos,
    pub end_ns: Nanos,
}

impl TimeWindow {
    pub fn new(start_ns: Nanos, end_ns: Nanos) -> Self {
        Self { start_ns, end_ns }
    }

    pub fn contains(&self, t: Nanos) -> bool {
        t >= self.start_ns && t <= self.end_ns
    }
}

/// Parse the token at `idx` into `T`, reporting the 1-based line number on
/// failure. All line-oriented parsers address fields through this so that a
/// format drift fails with a position instead of silently misaligning.
pub(crate) fn token<T: FromStr>(
    tokens: &[&str],
    idx: usize,
    line: usize,
) -> Result<T, TraceError> {
    let raw = tokens.get(idx).ok_or_else(|| TraceError::Malformed {
        line,
        reason: format!("expected at least {} tokens, got {}", idx + 1, tokens.len()),
    })?;
    raw.parse().map_err(|_| TraceError::Malformed {
        line,
        reason: format!("cannot parse token {idx} ({raw:?})"),
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::{
        fs,
        io::Write,
        path::PathBuf,
        sync::atomic::{AtomicUsize, Ordering},
    };

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    /// Writes trace content to a unique temp file, removed on drop.
    pub struct TempTrace(pub PathBuf);

    impl TempTrace {
        pub fn new(tag: &str, content: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "titrate-{tag}-{}-{}.tr",
                std::process::id(),
                COUNTER.fetch_add(1, Ordering::SeqCst)
            ));
            let mut f = fs::File::create(&path).unwrap();
            f.write_all(content.as_bytes()).unwrap();
            Self(path)
        }
    }

    impl Drop for TempTrace {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.0);
        }
    }
}

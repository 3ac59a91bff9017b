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
//! Space-delimited intermediate tables: key columns rendered from a
//! [`TableKey`], followed by one float column per measured quantity.
//!
//! The tables are headerless and whitespace-aligned with existing pgfplots
//! tooling, hence the space delimiter and the flexible row widths.

use std::{fs, path::Path};

use thiserror::Error;

use crate::records::TableKey;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Cannot access table file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot encode table row: {0}")]
    Csv(#[from] csv::Error),
    #[error("Table line {line}: cannot parse value {value:?}")]
    BadValue { line: usize, value: String },
}

/// Write a table, one row per `(key, values)` pair.
pub fn write_table<K: TableKey>(
    path: impl AsRef<Path>,
    rows: &[(K, Vec<f64>)],
) -> Result<(), TableError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .flexible(true)
        .from_path(path.as_ref())?;
    for (key, values) in rows {
        let mut record = key.fields();
        record.extend(values.iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// One parsed table row: the key columns as written, the remaining columns
/// parsed as floats.
#[derive(Clone, Debug, PartialEq)]
pub struct TableRow {
    pub key: Vec<String>,
    pub values: Vec<f64>,
}

/// Read a table back, splitting each row after `key_width` key columns.
pub fn read_table(path: impl AsRef<Path>, key_width: usize) -> Result<Vec<TableRow>, TableError> {
    let raw = fs::read_to_string(path.as_ref())?;
    let mut rows = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let columns: Vec<&str> = line.split_whitespace().collect();
        let (key, values) = columns.split_at(key_width.min(columns.len()));
        let values = values
            .iter()
            .map(|v| {
                v.parse::<f64>().map_err(|_| TableError::BadValue {
                    line: line_no + 1,
                    value: v.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(TableRow {
            key: key.iter().map(|k| k.to_string()).collect(),
            values,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        experiments::{CcaMix, FlowClass, Scheme},
        records::{BurstKey, SchemeKey},
        trace::testutil::TempTrace,
    };

    #[test]
    fn write_then_read() {
        let rows = vec![
            (
                SchemeKey {
                    rtt_ms: 50,
                    cca: CcaMix::Cubic,
                    flow_class: FlowClass::Small,
                    scheme: Scheme::Titrate,
                },
                vec![812.5, 1.75],
            ),
            (
                SchemeKey {
                    rtt_ms: 300,
                    cca: CcaMix::Bbr,
                    flow_class: FlowClass::Large,
                    scheme: Scheme::Codel,
                },
                vec![640.0, 12.0],
            ),
        ];
        let file = TempTrace::new("table", "");
        write_table(&file.0, &rows).unwrap();

        let back = read_table(&file.0, 4).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].key, vec!["50", "cubic", "small", "titrate"]);
        assert_eq!(back[0].values, vec![812.5, 1.75]);
        assert_eq!(back[1].key, vec!["300", "bbr", "large", "codel"]);
        assert_eq!(back[1].values, vec![640.0, 12.0]);
    }

    #[test]
    fn ragged_rows_are_allowed() {
        let rows = vec![
            (
                BurstKey {
                    webtrace: "w0".to_string(),
                    scheme: Scheme::Pie,
                },
                vec![1.0, 2.0, 3.0],
            ),
            (
                BurstKey {
                    webtrace: "w1".to_string(),
                    scheme: Scheme::Pie,
                },
                vec![4.0],
            ),
        ];
        let file = TempTrace::new("table", "");
        write_table(&file.0, &rows).unwrap();

        let back = read_table(&file.0, 2).unwrap();
        assert_eq!(back[0].values, vec![1.0, 2.0, 3.0]);
        assert_eq!(back[1].values, vec![4.0]);
    }

    #[test]
    fn bad_value_is_reported_with_line() {
        let file = TempTrace::new("table", "w0 pie 1.0\nw1 pie oops\n");
        match read_table(&file.0, 2) {
            Err(TableError::BadValue { line, value }) => {
                assert_eq!(line, 2);
                assert_eq!(value, "oops");
            }
            other => panic!("expected BadValue, got {other:?}"),
        }
    }
}

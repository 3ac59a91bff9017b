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
//! Statistical aggregation over parsed series: windowed means, rank
//! percentiles, outlier-trimmed filtering, CDF construction, and the unit
//! conversions shared by the analyses.

use lazy_static::lazy_static;
use ordered_float::OrderedFloat;
use statrs::distribution::{ContinuousCDF, Normal};

lazy_static! {
    /// Two-sided 99% quantile of the standard normal, the cutoff for
    /// outlier trimming.
    static ref OUTLIER_Z: f64 = Normal::new(0.0, 1.0).unwrap().inverse_cdf(0.995);
}

pub fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

pub fn mean_i64(values: &[i64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<i64>() as f64 / values.len() as f64)
}

/// Mean over `values[start..end]`, `None` when the range is empty or exceeds
/// the series.
pub fn windowed_mean(values: &[f64], start: usize, end: usize) -> Option<f64> {
    (start < end && end <= values.len()).then(|| mean(&values[start..end]))?
}

pub fn windowed_mean_i64(values: &[i64], start: usize, end: usize) -> Option<f64> {
    (start < end && end <= values.len()).then(|| mean_i64(&values[start..end]))?
}

/// Value at rank `floor(q * N)` (1-indexed, clamped to the first element) of
/// the sorted sequence. `q` must be in `(0, 1]`.
pub fn rank_percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by_key(|v| OrderedFloat(*v));
    let rank = ((sorted.len() as f64 * q) as usize).max(1);
    Some(sorted[rank - 1])
}

/// Population standard deviation (no Bessel correction, matching the
/// trimming cutoff's derivation).
fn population_std(values: &[f64], mean: f64) -> f64 {
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Trim outliers jointly over parallel series: an index survives only if
/// *every* series' value at that index lies within `mean ± z·std` of its own
/// series, with `z` the two-sided 99% normal quantile. All series must have
/// equal length; the same index set is retained across all of them.
pub fn remove_outliers(series: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(first) = series.first() else {
        return Vec::new();
    };
    let n = first.len();
    assert!(
        series.iter().all(|s| s.len() == n),
        "parallel series must have equal lengths"
    );
    if n == 0 {
        return series.to_vec();
    }

    let mut keep = vec![true; n];
    for data in series {
        let m = mean(data).unwrap();
        let cutoff = *OUTLIER_Z * population_std(data, m);
        for (i, v) in data.iter().enumerate() {
            keep[i] &= (*v >= m - cutoff) && (*v <= m + cutoff);
        }
    }

    series
        .iter()
        .map(|data| {
            data.iter()
                .zip(&keep)
                .filter_map(|(v, k)| k.then_some(*v))
                .collect()
        })
        .collect()
}

/// Step CDF of a sequence: sorted values paired with `rank / N`, rank
/// starting at 1 so the last point is exactly `1.0`.
pub fn cdf(values: &[f64]) -> Vec<(f64, f64)> {
    let mut sorted = values.to_vec();
    sorted.sort_by_key(|v| OrderedFloat(*v));
    let n = sorted.len();
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, v)| (v, (i + 1) as f64 / n as f64))
        .collect()
}

pub fn bytes_to_mb(bytes: f64) -> f64 {
    bytes / 1e6
}

pub fn nanos_to_secs(ns: i64) -> f64 {
    ns as f64 / 1e9
}

/// Queueing delay in milliseconds of an average backlog drained at the given
/// link rate.
pub fn queueing_delay_ms(avg_qlen_bytes: f64, link_mbps: f64) -> f64 {
    bytes_to_mb(avg_qlen_bytes) / (link_mbps / 8.0 / 1000.0)
}

/// Queueing delay in nanoseconds of an average backlog drained at the given
/// link rate.
pub fn queueing_delay_ns(avg_qlen_bytes: f64, link_mbps: f64) -> f64 {
    bytes_to_mb(avg_qlen_bytes) / (link_mbps / 8.0) * 1e9
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn means() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(mean_i64(&[2, 4]), Some(3.0));
        assert_eq!(windowed_mean(&[1.0, 2.0, 3.0, 4.0], 1, 3), Some(2.5));
        assert_eq!(windowed_mean(&[1.0, 2.0], 1, 3), None);
        assert_eq!(windowed_mean(&[1.0, 2.0], 1, 1), None);
    }

    #[test]
    fn percentile_rank_is_one_indexed() {
        let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        // rank floor(10 * 0.9) = 9 -> ninth smallest
        assert_eq!(rank_percentile(&values, 0.9), Some(9.0));
        assert_eq!(rank_percentile(&values, 1.0), Some(10.0));
        // rank clamps to the first element for tiny q
        assert_eq!(rank_percentile(&values, 0.01), Some(1.0));
        assert_eq!(rank_percentile(&[], 0.9), None);
    }

    #[test]
    fn cdf_ranks() {
        let points = cdf(&[3.0, 1.0, 2.0, 4.0]);
        assert_eq!(
            points,
            vec![(1.0, 0.25), (2.0, 0.5), (3.0, 0.75), (4.0, 1.0)]
        );
        // re-sorting the x-values reproduces the sorted input
        let xs: Vec<f64> = points.iter().map(|(x, _)| *x).collect();
        let mut resorted = xs.clone();
        resorted.sort_by(f64::total_cmp);
        assert_eq!(xs, resorted);
    }

    #[test]
    fn outlier_trim_drops_joint_indices() {
        // index 5 is a spike in the first series only; the same index must
        // disappear from both
        let a = vec![1.0, 1.1, 0.9, 1.0, 1.05, 100.0, 0.95, 1.0];
        let b = vec![2.0, 2.1, 1.9, 2.0, 2.05, 2.0, 1.95, 2.0];
        let trimmed = remove_outliers(&[a, b]);
        assert_eq!(trimmed[0].len(), 7);
        assert_eq!(trimmed[1].len(), 7);
        assert!(!trimmed[0].contains(&100.0));
        assert_eq!(trimmed[1], vec![2.0, 2.1, 1.9, 2.0, 2.05, 1.95, 2.0]);
    }

    #[test]
    fn outlier_trim_is_idempotent() {
        let a = vec![1.0, 1.1, 0.9, 1.0, 1.05, 100.0, 0.95, 1.0];
        let b = vec![2.0, 2.1, 1.9, 2.0, 2.05, 2.0, 1.95, 2.0];
        let once = remove_outliers(&[a, b]);
        let twice = remove_outliers(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn outlier_trim_empty_input() {
        assert!(remove_outliers(&[]).is_empty());
        let trimmed = remove_outliers(&[vec![], vec![]]);
        assert_eq!(trimmed, vec![Vec::<f64>::new(), Vec::new()]);
    }

    #[test]
    fn unit_conversions() {
        assert_eq!(bytes_to_mb(2_500_000.0), 2.5);
        assert_eq!(nanos_to_secs(1_500_000_000), 1.5);
        // 1 MB backlog on a 1000 Mbps link drains in 8 ms
        assert_eq!(queueing_delay_ms(1e6, 1000.0), 8.0);
        assert_eq!(queueing_delay_ns(1e6, 1000.0), 8e6);
    }
}

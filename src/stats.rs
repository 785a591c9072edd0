//! Pure statistics over the raw sample sequence of a histogram metric.
//!
//! The store keeps every histogram sample it sees inside a flush window, so
//! percentiles here are exact rank statistics over the real data, not sketch
//! approximations. All functions are total over non-empty input and return
//! `None` for empty input.

use metric::AggregateKind;
use std::cmp;
use std::cmp::Ordering;

/// Rank-select the `p`th percentile from an ascending-sorted slice.
///
/// The index is `ceil(p * n) - 1`, clamped into `[0, n - 1]`, so `p` outside
/// `[0, 1]` degrades to the smallest or largest sample rather than failing.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let idx = (p * n as f64).ceil() as i64 - 1;
    let idx = cmp::min(cmp::max(idx, 0), (n - 1) as i64);
    Some(sorted[idx as usize])
}

/// Compute a closed-form statistic over the raw sample multiset. The samples
/// need not be sorted; order cannot affect any aggregate.
pub fn aggregate(kind: AggregateKind, samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let val = match kind {
        AggregateKind::Count => samples.len() as f64,
        AggregateKind::Sum => samples.iter().sum(),
        AggregateKind::Max => samples
            .iter()
            .cloned()
            .fold(::std::f64::NEG_INFINITY, f64::max),
        AggregateKind::Min => samples.iter().cloned().fold(::std::f64::INFINITY, f64::min),
        AggregateKind::Avg => {
            let sum: f64 = samples.iter().sum();
            sum / samples.len() as f64
        }
        AggregateKind::Median => median(samples),
    };
    Some(val)
}

/// Numerically sort a copy of the samples, ascending.
pub fn sorted(samples: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

// Middle sorted element for odd lengths. For even lengths this takes the
// lower-middle element rather than interpolating between the two middle
// elements.
fn median(samples: &[f64]) -> f64 {
    let sorted = sorted(samples);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        sorted[mid - 1]
    } else {
        sorted[mid]
    }
}

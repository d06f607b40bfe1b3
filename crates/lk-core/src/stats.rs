//! Descriptive statistics over bout and interbout durations.

use serde::Serialize;

/// Summary statistics of a numeric sample.
///
/// Every field other than `count` and `sum` is `None` for an empty sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatSummary {
    pub count: usize,
    pub sum: f64,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// `maximum - minimum`.
    pub span: Option<f64>,
    pub mean: Option<f64>,
    pub quartile25: Option<f64>,
    pub median: Option<f64>,
    pub quartile75: Option<f64>,
    /// Interquartile range, `quartile75 - quartile25`.
    pub iqr: Option<f64>,
}

impl StatSummary {
    /// Summarizes a sample of values. Order does not matter.
    #[expect(clippy::cast_precision_loss, reason = "sample sizes stay far below 2^52")]
    pub fn from_values(values: &[f64]) -> Self {
        let sum: f64 = values.iter().sum();
        if values.is_empty() {
            return Self {
                count: 0,
                sum,
                minimum: None,
                maximum: None,
                span: None,
                mean: None,
                quartile25: None,
                median: None,
                quartile75: None,
                iqr: None,
            };
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let minimum = sorted[0];
        let maximum = sorted[sorted.len() - 1];
        let q25 = percentile(&sorted, 25.0);
        let q50 = percentile(&sorted, 50.0);
        let q75 = percentile(&sorted, 75.0);

        Self {
            count: sorted.len(),
            sum,
            minimum: Some(minimum),
            maximum: Some(maximum),
            span: Some(maximum - minimum),
            mean: Some(sum / sorted.len() as f64),
            quartile25: Some(q25),
            median: Some(q50),
            quartile75: Some(q75),
            iqr: Some(q75 - q25),
        }
    }

    /// Summarizes millisecond durations.
    #[expect(
        clippy::cast_precision_loss,
        reason = "millisecond durations stay far below 2^52"
    )]
    pub fn from_durations(durations_ms: &[i64]) -> Self {
        let values: Vec<f64> = durations_ms.iter().map(|&ms| ms as f64).collect();
        Self::from_values(&values)
    }

    /// `(minimum, maximum)` when the sample is non-empty.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.minimum.zip(self.maximum)
    }
}

/// Compute the `p`-th percentile of a **sorted** slice using linear
/// interpolation between closest ranks.
///
/// Returns `0.0` for an empty slice.
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "rank is a non-negative index bounded by the slice length"
)]
pub fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }
    let len = sorted_data.len();
    if len == 1 {
        return sorted_data[0];
    }
    let rank = (p / 100.0) * (len as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted_data[lo];
    }
    let frac = rank - lo as f64;
    sorted_data[lo] + frac * (sorted_data[hi] - sorted_data[lo])
}

#[cfg(test)]
#[expect(
    clippy::float_cmp,
    reason = "inputs are small integers with exact float results"
)]
mod tests {
    use super::*;

    #[test]
    fn empty_sample_has_no_statistics() {
        let s = StatSummary::from_values(&[]);
        assert_eq!(s.count, 0);
        assert_eq!(s.sum, 0.0);
        assert!(s.minimum.is_none());
        assert!(s.maximum.is_none());
        assert!(s.span.is_none());
        assert!(s.mean.is_none());
        assert!(s.quartile25.is_none());
        assert!(s.median.is_none());
        assert!(s.quartile75.is_none());
        assert!(s.iqr.is_none());
        assert!(s.min_max().is_none());
    }

    #[test]
    fn single_value_collapses_everything() {
        let s = StatSummary::from_values(&[42.0]);
        assert_eq!(s.count, 1);
        assert_eq!(s.minimum, Some(42.0));
        assert_eq!(s.maximum, Some(42.0));
        assert_eq!(s.mean, Some(42.0));
        assert_eq!(s.median, Some(42.0));
        assert_eq!(s.iqr, Some(0.0));
        assert_eq!(s.span, Some(0.0));
    }

    #[test]
    fn quartiles_interpolate_linearly() {
        // Unsorted on purpose
        let s = StatSummary::from_durations(&[4, 1, 3, 2]);
        assert_eq!(s.count, 4);
        assert_eq!(s.sum, 10.0);
        assert_eq!(s.min_max(), Some((1.0, 4.0)));
        assert_eq!(s.mean, Some(2.5));
        assert_eq!(s.quartile25, Some(1.75));
        assert_eq!(s.median, Some(2.5));
        assert_eq!(s.quartile75, Some(3.25));
        assert_eq!(s.iqr, Some(1.5));
    }

    #[test]
    fn odd_length_median_is_middle_value() {
        let s = StatSummary::from_durations(&[100, 300, 200, 500, 400]);
        assert_eq!(s.median, Some(300.0));
        assert_eq!(s.quartile25, Some(200.0));
        assert_eq!(s.quartile75, Some(400.0));
    }

    #[test]
    fn percentile_handles_edges() {
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[7.0], 90.0), 7.0);
        assert_eq!(percentile(&[1.0, 2.0, 3.0], 0.0), 1.0);
        assert_eq!(percentile(&[1.0, 2.0, 3.0], 100.0), 3.0);
    }
}

//! Windowed statistics over a raw series.

use serde::Serialize;

use crate::{
    consol_fun::ConsolFun,
    util::{nan_max, nan_min},
};

/// Scalar statistics computed over one query window. Fields default to NaN
/// and stay NaN when the window holds no usable data.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Aggregates {
    pub first: f64,
    pub last: f64,
    pub min: f64,
    pub max: f64,
    pub average: f64,
    pub total: f64,
    pub stdev: f64,
    pub lsl_slope: f64,
    pub lsl_int: f64,
    pub lsl_correl: f64,
}

impl Default for Aggregates {
    fn default() -> Self {
        Self {
            first: f64::NAN,
            last: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            average: f64::NAN,
            total: f64::NAN,
            stdev: f64::NAN,
            lsl_slope: f64::NAN,
            lsl_int: f64::NAN,
            lsl_correl: f64::NAN,
        }
    }
}

impl Aggregates {
    /// The statistic matching a consolidation function.
    pub fn value_for(&self, consol_fun: ConsolFun) -> f64 {
        match consol_fun {
            ConsolFun::Average => self.average,
            ConsolFun::Min => self.min,
            ConsolFun::Max => self.max,
            ConsolFun::Last => self.last,
            ConsolFun::First => self.first,
            ConsolFun::Total => self.total,
        }
    }
}

/// Nearest-rank selection over an ascending, NaN-free slice: drop the top
/// `ceil(count * (100 - percentile) / 100)` entries and take the new
/// maximum. Fewer than two usable values give NaN.
pub(crate) fn nearest_rank_sorted(sorted: &[f64], percentile: f64) -> f64 {
    let count = sorted.len();
    if count < 2 {
        return f64::NAN;
    }

    let dropped = (count as f64 * (100.0 - percentile) / 100.0).ceil() as usize;
    let count = count.saturating_sub(dropped);
    if count > 0 {
        sorted[count - 1]
    } else {
        f64::NAN
    }
}

/// Computes [Aggregates] and percentiles over a raw `(timestamps, values)`
/// series, using the same half-open bucket semantics as the normalizer:
/// the bucket at timestamp `t` covers `(t - step, t]`.
pub struct Aggregator<'a> {
    timestamps: &'a [f64],
    values: &'a [f64],
    step: f64,
}

impl<'a> Aggregator<'a> {
    pub fn new(timestamps: &'a [f64], values: &'a [f64]) -> Self {
        debug_assert_eq!(timestamps.len(), values.len());

        let step = if timestamps.len() >= 2 {
            timestamps[1] - timestamps[0]
        } else {
            f64::NAN
        };

        Self {
            timestamps,
            values,
            step,
        }
    }

    /// Overlap of bucket `i` with `[t_start, t_end]`, in seconds.
    fn overlap(&self, i: usize, t_start: f64, t_end: f64) -> f64 {
        let left = (self.timestamps[i] - self.step).max(t_start);
        let right = self.timestamps[i].min(t_end);
        right - left
    }

    pub fn get_aggregates(&self, t_start: i64, t_end: i64) -> Aggregates {
        let mut agg = Aggregates::default();
        if self.timestamps.len() < 2 {
            return agg;
        }

        let (t_start, t_end) = (t_start as f64, t_end as f64);
        let mut covered_seconds = 0.0;
        let mut first_found = false;

        for (i, &value) in self.values.iter().enumerate() {
            let delta = self.overlap(i, t_start, t_end);
            if delta <= 0.0 || value.is_nan() {
                continue;
            }

            if !first_found {
                agg.first = value;
                first_found = true;
            }
            // A partial trailing bucket only sets `last` when no full
            // bucket preceded it.
            if delta >= self.step || agg.last.is_nan() {
                agg.last = value;
            }
            agg.min = nan_min(agg.min, value);
            agg.max = nan_max(agg.max, value);
            agg.total = if agg.total.is_nan() {
                delta * value
            } else {
                agg.total + delta * value
            };
            covered_seconds += delta;
        }

        if covered_seconds > 0.0 {
            agg.average = agg.total / covered_seconds;

            let mut stdev_sum = 0.0;
            let (mut sum_x, mut sum_xx, mut sum_xy) = (0.0, 0.0, 0.0);
            let (mut sum_y, mut sum_yy) = (0.0, 0.0);
            let mut count = 0.0;

            for (i, &value) in self.values.iter().enumerate() {
                let delta = self.overlap(i, t_start, t_end);
                if delta <= 0.0 || value.is_nan() {
                    continue;
                }

                stdev_sum += (delta * value - agg.average).powi(2);
                // The bucket step, not elapsed time, feeds the regression
                // abscissa.
                sum_x += self.step;
                sum_xx += self.step * self.step;
                sum_xy += self.step * value;
                sum_y += value;
                sum_yy += value * value;
                count += 1.0;
            }

            agg.stdev = (stdev_sum / covered_seconds).sqrt();
            agg.lsl_slope = (count * sum_xy - sum_x * sum_y) / (count * sum_xx - sum_x * sum_x);
            agg.lsl_int = (sum_y - agg.lsl_slope * sum_x) / count;
            agg.lsl_correl = (sum_xy - sum_x * sum_y / count)
                / ((sum_xx - sum_x * sum_x / count) * (sum_yy - sum_y * sum_y / count)).sqrt();
        }

        agg
    }

    /// Nearest-rank percentile over the buckets overlapping the window.
    pub fn get_percentile(&self, t_start: i64, t_end: i64, percentile: f64) -> f64 {
        if self.timestamps.len() < 2 {
            return f64::NAN;
        }

        let (t_start, t_end) = (t_start as f64, t_end as f64);
        let mut selected: Vec<f64> = self
            .values
            .iter()
            .enumerate()
            .filter(|&(i, value)| !value.is_nan() && self.overlap(i, t_start, t_end) > 0.0)
            .map(|(_, &value)| value)
            .collect();

        selected.sort_by(f64::total_cmp);
        nearest_rank_sorted(&selected, percentile)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TIMESTAMPS: [f64; 4] = [300.0, 600.0, 900.0, 1200.0];
    const VALUES: [f64; 4] = [10.0, 20.0, 30.0, 40.0];

    #[test]
    fn full_window() {
        let agg = Aggregator::new(&TIMESTAMPS, &VALUES).get_aggregates(0, 1200);

        assert_eq!(agg.first, 10.0);
        assert_eq!(agg.last, 40.0);
        assert_eq!(agg.min, 10.0);
        assert_eq!(agg.max, 40.0);
        assert_eq!(agg.total, 300.0 * (10.0 + 20.0 + 30.0 + 40.0));
        assert_eq!(agg.average, 25.0);
    }

    #[test]
    fn sub_window_excludes_zero_overlap() {
        // Bucket (0, 300] ends exactly at the window start, bucket
        // (900, 1200] starts exactly at the window end; both are excluded.
        let agg = Aggregator::new(&TIMESTAMPS, &VALUES).get_aggregates(300, 900);

        assert_eq!(agg.first, 20.0);
        assert_eq!(agg.last, 30.0);
        assert_eq!(agg.min, 20.0);
        assert_eq!(agg.max, 30.0);
        assert_eq!(agg.average, 25.0);
    }

    #[test]
    fn partial_trailing_bucket_keeps_last() {
        // (900, 1200] overlaps only 150s of [0, 1050]: not a full bucket,
        // so `last` stays on the full bucket before it.
        let agg = Aggregator::new(&TIMESTAMPS, &VALUES).get_aggregates(0, 1050);

        assert_eq!(agg.last, 30.0);
        assert_eq!(agg.max, 40.0);
        assert_eq!(agg.total, 300.0 * (10.0 + 20.0 + 30.0) + 150.0 * 40.0);
    }

    #[test]
    fn partial_only_bucket_sets_last() {
        let agg = Aggregator::new(&TIMESTAMPS, &VALUES).get_aggregates(950, 1150);

        assert_eq!(agg.first, 40.0);
        assert_eq!(agg.last, 40.0);
    }

    #[test]
    fn nan_buckets_reduce_coverage() {
        let values = [10.0, f64::NAN, 30.0, 40.0];
        let agg = Aggregator::new(&TIMESTAMPS, &values).get_aggregates(0, 1200);

        assert_eq!(agg.total, 300.0 * (10.0 + 30.0 + 40.0));
        assert_eq!(agg.average, agg.total / 900.0);
    }

    #[test]
    fn empty_window_is_nan() {
        let agg = Aggregator::new(&TIMESTAMPS, &[f64::NAN; 4]).get_aggregates(0, 1200);

        assert!(agg.first.is_nan());
        assert!(agg.average.is_nan());
        assert!(agg.stdev.is_nan());
    }

    #[test]
    fn stdev_uses_weighted_deviation() {
        let agg = Aggregator::new(&TIMESTAMPS, &VALUES).get_aggregates(0, 1200);

        // The deviation is taken from the time-weighted contribution
        // (delta * value), not the bare value.
        let expected = ((300.0f64 * 10.0 - 25.0).powi(2)
            + (300.0f64 * 20.0 - 25.0).powi(2)
            + (300.0f64 * 30.0 - 25.0).powi(2)
            + (300.0f64 * 40.0 - 25.0).powi(2))
            / 1200.0;
        assert_eq!(agg.stdev, expected.sqrt());
    }

    #[test]
    fn trend_is_degenerate_for_constant_step() {
        // Every bucket feeds the same abscissa (the step), so the
        // regression denominator vanishes for uniformly stepped series.
        let agg = Aggregator::new(&TIMESTAMPS, &VALUES).get_aggregates(0, 1200);

        assert!(agg.lsl_slope.is_nan());
        assert!(agg.lsl_int.is_nan());
        assert!(agg.lsl_correl.is_nan());
    }

    #[test]
    fn idempotent() {
        let aggregator = Aggregator::new(&TIMESTAMPS, &VALUES);
        let a = aggregator.get_aggregates(100, 1100);
        let b = aggregator.get_aggregates(100, 1100);

        assert_eq!(format!("{a:?}"), format!("{b:?}"));
    }

    #[test]
    fn percentile_nearest_rank() {
        let timestamps = [300.0, 600.0, 900.0, 1200.0, 1500.0];
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let aggregator = Aggregator::new(&timestamps, &values);

        // ceil(5 * 50/100) = 3 dropped from the top, new maximum is 2.
        assert_eq!(aggregator.get_percentile(0, 1500, 50.0), 2.0);
        // ceil(5 * 5/100) = 1 dropped, new maximum is 4.
        assert_eq!(aggregator.get_percentile(0, 1500, 95.0), 4.0);
        assert_eq!(aggregator.get_percentile(0, 1500, 100.0), 5.0);
        assert!(aggregator.get_percentile(0, 1500, 0.0).is_nan());
    }

    #[test]
    fn percentile_needs_two_values() {
        let timestamps = [300.0, 600.0, 900.0];
        let values = [1.0, f64::NAN, f64::NAN];
        let aggregator = Aggregator::new(&timestamps, &values);

        assert!(aggregator.get_percentile(0, 900, 50.0).is_nan());
    }

    #[test]
    fn degenerate_series_is_nan() {
        let agg = Aggregator::new(&[300.0], &[1.0]).get_aggregates(0, 1200);
        assert!(agg.average.is_nan());
    }
}

//! Feature engineering for the water-level forecaster
//!
//! Turns an ascending daily series into calendar + lag feature rows.

use tracing::debug;

use crate::domain::{FeatureRow, Observation, LAG_DEPTH};
use crate::error::{ForecastError, Result};

/// Lag shifts used as predictors, in feature order.
pub const LAGS: [usize; 3] = [1, 3, 6];

/// Builds [`FeatureRow`]s from raw observations.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeaturePipeline;

impl FeaturePipeline {
    pub fn new() -> Self {
        Self
    }

    /// Derive year/month/day and lag1/lag3/lag6 for every row whose lags are defined.
    ///
    /// The first [`LAG_DEPTH`] observations only serve as lag history, so a
    /// series of `n > 6` observations yields `n - 6` rows and anything shorter
    /// yields none.
    pub fn build(&self, observations: &[Observation]) -> Result<Vec<FeatureRow>> {
        validate_series(observations)?;

        if observations.len() <= LAG_DEPTH {
            debug!(
                rows = observations.len(),
                "series shorter than lag depth, no feature rows"
            );
            return Ok(Vec::new());
        }

        let values: Vec<f64> = observations.iter().map(|o| o.value).collect();
        let [lag1, lag3, lag6] = LAGS.map(|shift| create_lag_feature(&values, shift));

        let rows = observations
            .iter()
            .enumerate()
            .filter_map(|(i, obs)| {
                Some(FeatureRow::new(
                    obs.date,
                    lag1[i]?,
                    lag3[i]?,
                    lag6[i]?,
                    Some(obs.value),
                ))
            })
            .collect::<Vec<_>>();

        debug!(input = observations.len(), output = rows.len(), "built feature rows");
        Ok(rows)
    }
}

/// Shift `values` forward by `shift` positions; leading positions are undefined.
pub fn create_lag_feature(values: &[f64], shift: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| i.checked_sub(shift).map(|j| values[j]))
        .collect()
}

/// Dates must be strictly ascending and every value finite.
pub fn validate_series(observations: &[Observation]) -> Result<()> {
    if let Some(bad) = observations.iter().find(|o| !o.value.is_finite()) {
        return Err(ForecastError::Data(format!(
            "non-finite target value on {}",
            bad.date
        )));
    }

    if let Some(pair) = observations.windows(2).find(|w| w[1].date <= w[0].date) {
        return Err(ForecastError::Data(format!(
            "dates must be strictly ascending: {} is followed by {}",
            pair[0].date, pair[1].date
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use rstest::rstest;

    fn daily_series(values: &[f64]) -> Vec<Observation> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        start
            .iter_days()
            .zip(values.iter())
            .map(|(date, &value)| Observation::new(date, value))
            .collect()
    }

    #[test]
    fn test_create_lag_feature() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let lagged = create_lag_feature(&values, 2);

        assert_eq!(lagged, vec![None, None, Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_build_lags_and_calendar() {
        let values: Vec<f64> = (0..10).map(|v| v as f64 * 10.0).collect();
        let rows = FeaturePipeline::new().build(&daily_series(&values)).unwrap();

        assert_eq!(rows.len(), 4);
        let first = rows[0];
        // first surviving row is 2020-01-07, target 60
        assert_eq!((first.year, first.month, first.day), (2020, 1, 7));
        assert_eq!(first.target, Some(60.0));
        assert_eq!(first.lag1, 50.0);
        assert_eq!(first.lag3, 30.0);
        assert_eq!(first.lag6, 0.0);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(6)]
    fn test_short_series_is_empty(#[case] len: usize) {
        let values = vec![1.0; len];
        let rows = FeaturePipeline::new().build(&daily_series(&values)).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_unordered_dates_rejected() {
        let mut series = daily_series(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        series.swap(3, 4);

        let err = FeaturePipeline::new().build(&series).unwrap_err();
        assert!(matches!(err, ForecastError::Data(_)));
    }

    #[test]
    fn test_duplicate_dates_rejected() {
        let mut series = daily_series(&[1.0; 8]);
        series[5].date = series[4].date;

        assert!(matches!(
            FeaturePipeline::new().build(&series),
            Err(ForecastError::Data(_))
        ));
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let series = daily_series(&[1.0, 2.0, f64::NAN, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert!(matches!(
            FeaturePipeline::new().build(&series),
            Err(ForecastError::Data(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_row_count_and_lag_invariant(values in prop::collection::vec(-100.0f64..100.0, 0..80)) {
            let rows = FeaturePipeline::new().build(&daily_series(&values)).unwrap();

            let expected = values.len().saturating_sub(LAG_DEPTH);
            prop_assert_eq!(rows.len(), expected);

            for (k, row) in rows.iter().enumerate() {
                let i = k + LAG_DEPTH;
                prop_assert_eq!(row.target, Some(values[i]));
                prop_assert_eq!(row.lag1, values[i - 1]);
                prop_assert_eq!(row.lag3, values[i - 3]);
                prop_assert_eq!(row.lag6, values[i - 6]);
            }
        }
    }
}

use std::sync::Arc;

use chrono::NaiveDate;

use crate::forecasting::orchestrator::days_after;
use crate::forecasting::stores::ForecastStore;
use crate::forecasting::ForecastError;
use crate::ml::{generate_forecast, FittedSarima};
use crate::models::ForecastRow;

/// Turns a fitted model into dated forecast rows and stores them.
#[derive(Clone)]
pub struct Forecaster {
    store: Arc<dyn ForecastStore>,
    confidence: f64,
}

impl Forecaster {
    pub fn new(store: Arc<dyn ForecastStore>, confidence: f64) -> Self {
        Self { store, confidence }
    }

    /// One row per day for the `horizon` days after `last_observed`.
    pub fn build_rows(
        &self,
        recipe: &str,
        model: &FittedSarima,
        last_observed: NaiveDate,
        horizon: usize,
        batch_marker: NaiveDate,
    ) -> Result<Vec<ForecastRow>, ForecastError> {
        days_after(last_observed, horizon)?;
        let result = generate_forecast(model, horizon, self.confidence)?;

        (0..result.len())
            .map(|i| {
                Ok(ForecastRow {
                    recipe: recipe.to_string(),
                    date: days_after(last_observed, i + 1)?,
                    forecasted_quantity: result.predicted[i],
                    standard_error: result.std_errors[i],
                    ci_lower: result.lower[i],
                    ci_upper: result.upper[i],
                    actual_quantity: None,
                    batch_marker,
                })
            })
            .collect()
    }

    /// Store rows for one recipe. Keys already present are left untouched;
    /// returns how many rows were new.
    pub async fn persist(&self, rows: &[ForecastRow]) -> Result<usize, ForecastError> {
        if rows.is_empty() {
            return Ok(0);
        }
        self.store.upsert_forecasts(rows).await
    }
}

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::forecasting::stores::ModelStore;
use crate::forecasting::ForecastError;
use crate::ml::{auto_sarima, AutoSearchConfig, Constraints, DailySeries, FittedSarima, SarimaSpec};
use crate::models::SavedModel;

/// How the model used for a recipe's forecast was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationSource {
    AutoSearch,
    SavedOrders,
    /// Saved orders were requested but none existed.
    FallbackAutoSearch,
}

/// Fits SARIMA models either by order search or from previously saved
/// orders. Fitting runs on the blocking thread pool.
#[derive(Clone)]
pub struct ModelCalibrator {
    models: Arc<dyn ModelStore>,
    search: AutoSearchConfig,
}

impl ModelCalibrator {
    pub fn new(models: Arc<dyn ModelStore>, search: AutoSearchConfig) -> Self {
        Self { models, search }
    }

    /// Search for the best orders, persist them and return the fitted model.
    pub async fn calibrate_auto(
        &self,
        recipe: &str,
        series: &DailySeries,
    ) -> Result<FittedSarima, ForecastError> {
        let values = series.values();
        let config = self.search.clone();
        let outcome = tokio::task::spawn_blocking(move || auto_sarima(&values, &config)).await??;
        let model = outcome.model;
        warn_if_unconverged(recipe, &model);

        let saved = SavedModel {
            recipe: recipe.to_string(),
            order: model.order(),
            seasonal_order: model.seasonal_order(),
            aic: model.aic(),
            fitted_at: Utc::now(),
        };
        self.models.save_model(&saved).await?;

        info!(
            recipe = %recipe,
            order = %saved.order,
            seasonal_order = %saved.seasonal_order,
            aic = saved.aic,
            candidates = outcome.evaluated,
            "Auto calibration selected model"
        );
        Ok(model)
    }

    /// Refit the recipe's saved orders on `series` with relaxed constraints.
    /// Fails with [`ForecastError::MissingSavedModel`] when none are stored.
    pub async fn calibrate_saved(
        &self,
        recipe: &str,
        series: &DailySeries,
    ) -> Result<FittedSarima, ForecastError> {
        let saved = self.models.load_model(recipe).await?;
        let spec = SarimaSpec::new(saved.order, saved.seasonal_order);
        let values = series.values();
        let model = tokio::task::spawn_blocking(move || {
            FittedSarima::fit(&values, spec, Constraints::Relaxed)
        })
        .await??;
        warn_if_unconverged(recipe, &model);

        debug!(recipe = %recipe, %spec, aic = model.aic(), "Refitted saved orders");
        Ok(model)
    }

    /// Saved orders when available, otherwise a fresh search.
    pub async fn calibrate_preferring_saved(
        &self,
        recipe: &str,
        series: &DailySeries,
    ) -> Result<(FittedSarima, CalibrationSource), ForecastError> {
        match self.calibrate_saved(recipe, series).await {
            Ok(model) => Ok((model, CalibrationSource::SavedOrders)),
            Err(ForecastError::MissingSavedModel(_)) => {
                info!(recipe = %recipe, "No saved model, falling back to auto calibration");
                let model = self.calibrate_auto(recipe, series).await?;
                Ok((model, CalibrationSource::FallbackAutoSearch))
            }
            Err(e) => Err(e),
        }
    }
}

/// The optimiser stopped at its iteration cap; the estimates are kept but may
/// be off the minimum.
fn warn_if_unconverged(recipe: &str, model: &FittedSarima) {
    if !model.converged() {
        warn!(
            recipe = %recipe,
            spec = %model.spec(),
            aic = model.aic(),
            "Model fit hit the iteration limit before converging"
        );
    }
}

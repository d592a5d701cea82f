//! Data-access contracts consumed by the forecasting core, and their
//! PostgreSQL implementation.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::db::{ForecastRepo, RecipeRepo, UsageRepo};
use crate::forecasting::ForecastError;
use crate::models::{DateWindow, ForecastPoint, ForecastRow, RecipeTotal, SavedModel, UsageRecord};

#[async_trait]
pub trait UsageLog: Send + Sync {
    /// All usage entries for one recipe, oldest first.
    async fn usage_records(&self, recipe: &str) -> Result<Vec<UsageRecord>, ForecastError>;

    async fn distinct_recipes(&self) -> Result<Vec<String>, ForecastError>;

    /// `None` when nothing has ever been logged.
    async fn latest_usage_date(&self) -> Result<Option<NaiveDate>, ForecastError>;
}

#[async_trait]
pub trait RecipeCatalog: Send + Sync {
    async fn recipe_names(&self) -> Result<Vec<String>, ForecastError>;
}

#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Insert one row unless its `(recipe, date, batch_marker)` key exists.
    /// Returns whether a row was written.
    async fn upsert_forecast(&self, row: &ForecastRow) -> Result<bool, ForecastError>;

    /// Same rule as [`upsert_forecast`](Self::upsert_forecast), applied to a
    /// whole recipe's rows. Returns the number of new rows.
    async fn upsert_forecasts(&self, rows: &[ForecastRow]) -> Result<usize, ForecastError> {
        let mut inserted = 0;
        for row in rows {
            if self.upsert_forecast(row).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn sum_forecast(
        &self,
        recipe: Option<&str>,
        window: DateWindow,
        batch_marker: NaiveDate,
    ) -> Result<Vec<RecipeTotal>, ForecastError>;

    /// Whether every day of `window` has at least one forecast row.
    async fn has_forecast_coverage(&self, window: DateWindow) -> Result<bool, ForecastError>;

    async fn latest_batch_marker(&self) -> Result<Option<NaiveDate>, ForecastError>;

    async fn forecast_details(
        &self,
        recipe: &str,
        window: DateWindow,
        batch_marker: NaiveDate,
    ) -> Result<Vec<ForecastPoint>, ForecastError>;
}

#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Persist the model, replacing any earlier one for the same recipe.
    async fn save_model(&self, model: &SavedModel) -> Result<(), ForecastError>;

    /// Fails with [`ForecastError::MissingSavedModel`] when the recipe was
    /// never calibrated.
    async fn load_model(&self, recipe: &str) -> Result<SavedModel, ForecastError>;
}

#[async_trait]
pub trait CalibrationLedger: Send + Sync {
    async fn mark_calibrated(&self, at: DateTime<Utc>) -> Result<(), ForecastError>;

    async fn last_calibration(&self) -> Result<Option<DateTime<Utc>>, ForecastError>;
}

/// Usage log, recipe catalog and forecast store over one connection pool.
/// Every call checks out its own connection.
#[derive(Clone)]
pub struct PgStores {
    pool: PgPool,
}

impl PgStores {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageLog for PgStores {
    async fn usage_records(&self, recipe: &str) -> Result<Vec<UsageRecord>, ForecastError> {
        Ok(UsageRepo::records_for(&self.pool, recipe).await?)
    }

    async fn distinct_recipes(&self) -> Result<Vec<String>, ForecastError> {
        Ok(UsageRepo::distinct_recipes(&self.pool).await?)
    }

    async fn latest_usage_date(&self) -> Result<Option<NaiveDate>, ForecastError> {
        Ok(UsageRepo::latest_date(&self.pool).await?)
    }
}

#[async_trait]
impl RecipeCatalog for PgStores {
    async fn recipe_names(&self) -> Result<Vec<String>, ForecastError> {
        Ok(RecipeRepo::names(&self.pool).await?)
    }
}

#[async_trait]
impl ForecastStore for PgStores {
    async fn upsert_forecast(&self, row: &ForecastRow) -> Result<bool, ForecastError> {
        Ok(ForecastRepo::insert_if_absent(&self.pool, row).await?)
    }

    async fn upsert_forecasts(&self, rows: &[ForecastRow]) -> Result<usize, ForecastError> {
        Ok(ForecastRepo::insert_batch(&self.pool, rows).await?)
    }

    async fn sum_forecast(
        &self,
        recipe: Option<&str>,
        window: DateWindow,
        batch_marker: NaiveDate,
    ) -> Result<Vec<RecipeTotal>, ForecastError> {
        Ok(ForecastRepo::sum_for_window(&self.pool, recipe, window.from, window.to, batch_marker).await?)
    }

    async fn has_forecast_coverage(&self, window: DateWindow) -> Result<bool, ForecastError> {
        let covered = ForecastRepo::covered_days(&self.pool, window.from, window.to).await?;
        Ok(covered >= window.days())
    }

    async fn latest_batch_marker(&self) -> Result<Option<NaiveDate>, ForecastError> {
        Ok(ForecastRepo::latest_batch(&self.pool).await?)
    }

    async fn forecast_details(
        &self,
        recipe: &str,
        window: DateWindow,
        batch_marker: NaiveDate,
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        Ok(ForecastRepo::details(&self.pool, recipe, window.from, window.to, batch_marker).await?)
    }
}

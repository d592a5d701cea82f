#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::Mutex;

use menucast::forecasting::{
    CalibrationLedger, Collaborators, ForecastError, ForecastOrchestrator, ForecastStore, ModelStore,
    OrchestratorSettings, RecipeCatalog, UsageLog,
};
use menucast::models::{DateWindow, ForecastPoint, ForecastRow, RecipeTotal, SavedModel, UsageRecord};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Consecutive daily records for `recipe` ending on `last`.
pub fn daily_records(recipe: &str, last: NaiveDate, quantities: &[i64]) -> Vec<UsageRecord> {
    let first = last - Duration::days(quantities.len() as i64 - 1);
    quantities
        .iter()
        .enumerate()
        .map(|(i, q)| UsageRecord::new(recipe, first + Duration::days(i as i64), *q))
        .collect()
}

#[derive(Default)]
pub struct MemoryUsageLog {
    records: Vec<UsageRecord>,
}

impl MemoryUsageLog {
    pub fn new(records: Vec<UsageRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl UsageLog for MemoryUsageLog {
    async fn usage_records(&self, recipe: &str) -> Result<Vec<UsageRecord>, ForecastError> {
        let mut out: Vec<UsageRecord> =
            self.records.iter().filter(|r| r.recipe == recipe).cloned().collect();
        out.sort_by_key(|r| r.date);
        Ok(out)
    }

    async fn distinct_recipes(&self) -> Result<Vec<String>, ForecastError> {
        let names: BTreeSet<String> = self.records.iter().map(|r| r.recipe.clone()).collect();
        Ok(names.into_iter().collect())
    }

    async fn latest_usage_date(&self) -> Result<Option<NaiveDate>, ForecastError> {
        Ok(self.records.iter().map(|r| r.date).max())
    }
}

pub struct MemoryCatalog {
    names: Vec<String>,
}

impl MemoryCatalog {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[async_trait]
impl RecipeCatalog for MemoryCatalog {
    async fn recipe_names(&self) -> Result<Vec<String>, ForecastError> {
        Ok(self.names.clone())
    }
}

#[derive(Default)]
pub struct MemoryForecastStore {
    rows: Mutex<Vec<ForecastRow>>,
}

impl MemoryForecastStore {
    pub async fn rows(&self) -> Vec<ForecastRow> {
        self.rows.lock().await.clone()
    }

    pub async fn rows_for(&self, recipe: &str) -> Vec<ForecastRow> {
        let mut rows: Vec<ForecastRow> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|r| r.recipe == recipe)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.batch_marker, r.date));
        rows
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }
}

#[async_trait]
impl ForecastStore for MemoryForecastStore {
    async fn upsert_forecast(&self, row: &ForecastRow) -> Result<bool, ForecastError> {
        let mut rows = self.rows.lock().await;
        if rows.iter().any(|r| r.key() == row.key()) {
            return Ok(false);
        }
        rows.push(row.clone());
        Ok(true)
    }

    async fn sum_forecast(
        &self,
        recipe: Option<&str>,
        window: DateWindow,
        batch_marker: NaiveDate,
    ) -> Result<Vec<RecipeTotal>, ForecastError> {
        let rows = self.rows.lock().await;
        let mut totals: HashMap<String, RecipeTotal> = HashMap::new();
        for row in rows.iter().filter(|r| {
            r.batch_marker == batch_marker
                && window.contains(r.date)
                && recipe.map_or(true, |name| r.recipe == name)
        }) {
            let entry = totals.entry(row.recipe.clone()).or_insert_with(|| RecipeTotal {
                recipe: row.recipe.clone(),
                total: 0.0,
                ci_lower: 0.0,
                ci_upper: 0.0,
            });
            entry.total += row.forecasted_quantity;
            entry.ci_lower += row.ci_lower;
            entry.ci_upper += row.ci_upper;
        }
        let mut out: Vec<RecipeTotal> = totals.into_values().collect();
        out.sort_by(|a, b| a.recipe.cmp(&b.recipe));
        Ok(out)
    }

    async fn has_forecast_coverage(&self, window: DateWindow) -> Result<bool, ForecastError> {
        let rows = self.rows.lock().await;
        Ok(window.dates().all(|d| rows.iter().any(|r| r.date == d)))
    }

    async fn latest_batch_marker(&self) -> Result<Option<NaiveDate>, ForecastError> {
        Ok(self.rows.lock().await.iter().map(|r| r.batch_marker).max())
    }

    async fn forecast_details(
        &self,
        recipe: &str,
        window: DateWindow,
        batch_marker: NaiveDate,
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        let mut points: Vec<ForecastPoint> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|r| r.recipe == recipe && r.batch_marker == batch_marker && window.contains(r.date))
            .map(|r| ForecastPoint {
                date: r.date,
                forecast: r.forecasted_quantity,
                ci_lower: r.ci_lower,
                ci_upper: r.ci_upper,
                actual: r.actual_quantity,
            })
            .collect();
        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}

#[derive(Default)]
pub struct MemoryModelStore {
    models: Mutex<HashMap<String, SavedModel>>,
}

#[async_trait]
impl ModelStore for MemoryModelStore {
    async fn save_model(&self, model: &SavedModel) -> Result<(), ForecastError> {
        self.models.lock().await.insert(model.recipe.clone(), model.clone());
        Ok(())
    }

    async fn load_model(&self, recipe: &str) -> Result<SavedModel, ForecastError> {
        self.models
            .lock()
            .await
            .get(recipe)
            .cloned()
            .ok_or_else(|| ForecastError::MissingSavedModel(recipe.to_string()))
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    marker: Mutex<Option<DateTime<Utc>>>,
    fail_writes: bool,
}

impl MemoryLedger {
    /// A ledger whose writes always fail, as on a full disk.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl CalibrationLedger for MemoryLedger {
    async fn mark_calibrated(&self, at: DateTime<Utc>) -> Result<(), ForecastError> {
        if self.fail_writes {
            return Err(ForecastError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")));
        }
        *self.marker.lock().await = Some(at);
        Ok(())
    }

    async fn last_calibration(&self) -> Result<Option<DateTime<Utc>>, ForecastError> {
        Ok(*self.marker.lock().await)
    }
}

/// In-memory stores plus an orchestrator wired to them.
pub struct Harness {
    pub forecasts: Arc<MemoryForecastStore>,
    pub models: Arc<dyn ModelStore>,
    pub ledger: Arc<MemoryLedger>,
    pub orchestrator: ForecastOrchestrator,
}

impl Harness {
    pub fn new(records: Vec<UsageRecord>, catalog: &[&str]) -> Self {
        Self::build(records, catalog, Arc::new(MemoryModelStore::default()), OrchestratorSettings::default())
    }

    pub fn with_workers(records: Vec<UsageRecord>, catalog: &[&str], workers: usize) -> Self {
        let settings = OrchestratorSettings {
            workers,
            ..OrchestratorSettings::default()
        };
        Self::with_settings(records, catalog, settings)
    }

    pub fn with_ledger(records: Vec<UsageRecord>, catalog: &[&str], ledger: MemoryLedger) -> Self {
        Self::assemble(
            records,
            catalog,
            Arc::new(MemoryModelStore::default()),
            Arc::new(ledger),
            OrchestratorSettings::default(),
        )
    }

    pub fn with_settings(records: Vec<UsageRecord>, catalog: &[&str], settings: OrchestratorSettings) -> Self {
        Self::build(records, catalog, Arc::new(MemoryModelStore::default()), settings)
    }

    pub fn build(
        records: Vec<UsageRecord>,
        catalog: &[&str],
        models: Arc<dyn ModelStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self::assemble(records, catalog, models, Arc::new(MemoryLedger::default()), settings)
    }

    fn assemble(
        records: Vec<UsageRecord>,
        catalog: &[&str],
        models: Arc<dyn ModelStore>,
        ledger: Arc<MemoryLedger>,
        settings: OrchestratorSettings,
    ) -> Self {
        let forecasts = Arc::new(MemoryForecastStore::default());
        let collaborators = Collaborators {
            usage: Arc::new(MemoryUsageLog::new(records)),
            catalog: Arc::new(MemoryCatalog::new(catalog)),
            forecasts: forecasts.clone(),
            models: models.clone(),
            ledger: ledger.clone(),
        };
        Self {
            forecasts,
            models,
            ledger,
            orchestrator: ForecastOrchestrator::new(collaborators, settings),
        }
    }
}

/// Fifteen days of "Soup A" ending 2024-01-15.
pub fn soup_a() -> Vec<UsageRecord> {
    daily_records(
        "Soup A",
        date(2024, 1, 15),
        &[10, 11, 9, 12, 10, 11, 13, 9, 10, 12, 11, 10, 9, 11, 12],
    )
}

/// Five weeks of a weekly-patterned recipe ending 2024-01-15.
pub fn weekly(recipe: &str, base: i64) -> Vec<UsageRecord> {
    let pattern = [0, 1, 0, 2, 5, 8, 6];
    let jitter = [0, 1, -1, 0, 1, 0, -1, 1, 0];
    let quantities: Vec<i64> = (0..35)
        .map(|i| base + pattern[i % 7] + jitter[i % jitter.len()])
        .collect();
    daily_records(recipe, date(2024, 1, 15), &quantities)
}

//! Batch forecasting over every recipe.
//!
//! Each recipe moves through `Pending → Fetched → Calibrating → Calibrated →
//! Forecasting → Persisted`, or stops early as skipped or failed. Per-recipe
//! problems are recorded in the [`BatchReport`]; only invalid requests and
//! failures to read the batch-wide inputs are returned as errors.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::forecasting::calibrator::{CalibrationSource, ModelCalibrator};
use crate::forecasting::forecaster::Forecaster;
use crate::forecasting::stores::{CalibrationLedger, ForecastStore, ModelStore, RecipeCatalog, UsageLog};
use crate::forecasting::ForecastError;
use crate::ml::{AutoSearchConfig, DailySeries, ModelError, DEFAULT_CONFIDENCE, MIN_FORECAST_POINTS};
use crate::models::{DateWindow, RecipeTotal};

/// Longest forecast, in days, a run accepts unless configured otherwise.
pub const DEFAULT_MAX_HORIZON_DAYS: usize = 366;

/// Stores the orchestrator reads from and writes to.
#[derive(Clone)]
pub struct Collaborators {
    pub usage: Arc<dyn UsageLog>,
    pub catalog: Arc<dyn RecipeCatalog>,
    pub forecasts: Arc<dyn ForecastStore>,
    pub models: Arc<dyn ModelStore>,
    pub ledger: Arc<dyn CalibrationLedger>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub seasonal_period: usize,
    pub min_points: usize,
    /// 1 runs recipes one after another.
    pub workers: usize,
    pub confidence_level: f64,
    pub forward_days: u32,
    pub max_horizon_days: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            seasonal_period: 7,
            min_points: MIN_FORECAST_POINTS,
            workers: 1,
            confidence_level: DEFAULT_CONFIDENCE,
            forward_days: 7,
            max_horizon_days: DEFAULT_MAX_HORIZON_DAYS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    /// Order search for every recipe.
    Auto,
    /// Refit saved orders, searching only where none exist.
    Reuse,
}

/// Auto calibration when forced, when it never ran, or when the requested
/// window has days without any forecast.
pub fn decide_mode(
    force: bool,
    last_calibration: Option<DateTime<Utc>>,
    window_covered: bool,
) -> CalibrationMode {
    if force || last_calibration.is_none() || !window_covered {
        CalibrationMode::Auto
    } else {
        CalibrationMode::Reuse
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub horizon: usize,
    pub calibrate: bool,
    pub recipe: Option<String>,
    /// Window whose forecast coverage gates the calibration mode.
    pub window: Option<DateWindow>,
}

/// Caller-facing run request; the horizon is derived from the calendar.
#[derive(Debug, Clone, Default)]
pub struct ForecastRequest {
    pub window: Option<DateWindow>,
    pub forward_days: Option<u32>,
    pub look_back_days: u32,
    pub calibrate: bool,
    pub recipe: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeStage {
    Pending,
    Fetched,
    Calibrating,
    Calibrated,
    Forecasting,
    Persisted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoUsage,
    InsufficientData { points: usize, required: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoUsage => write!(f, "no usage recorded"),
            SkipReason::InsufficientData { .. } => write!(f, "insufficient data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecipeOutcome {
    Success {
        rows_forecast: usize,
        rows_inserted: usize,
        source: CalibrationSource,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        stage: RecipeStage,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeReport {
    pub recipe: String,
    #[serde(flatten)]
    pub outcome: RecipeOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    /// `None` when no usage has been logged yet and nothing ran.
    pub batch_marker: Option<NaiveDate>,
    pub mode: CalibrationMode,
    pub horizon: usize,
    pub ledger_updated: bool,
    pub recipes: Vec<RecipeReport>,
}

impl BatchReport {
    pub fn outcome_for(&self, recipe: &str) -> Option<&RecipeOutcome> {
        self.recipes.iter().find(|r| r.recipe == recipe).map(|r| &r.outcome)
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, RecipeOutcome::Success { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RecipeOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RecipeOutcome::Failed { .. }))
    }

    pub fn rows_inserted(&self) -> usize {
        self.recipes
            .iter()
            .map(|r| match r.outcome {
                RecipeOutcome::Success { rows_inserted, .. } => rows_inserted,
                _ => 0,
            })
            .sum()
    }

    fn count(&self, pred: impl Fn(&RecipeOutcome) -> bool) -> usize {
        self.recipes.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// A batch run plus the forecast totals it produced for the requested window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowForecast {
    pub report: BatchReport,
    pub window: Option<DateWindow>,
    pub totals: Vec<RecipeTotal>,
}

#[derive(Clone)]
pub struct ForecastOrchestrator {
    stores: Collaborators,
    calibrator: ModelCalibrator,
    forecaster: Forecaster,
    settings: OrchestratorSettings,
}

impl ForecastOrchestrator {
    pub fn new(stores: Collaborators, settings: OrchestratorSettings) -> Self {
        let search = AutoSearchConfig::default().with_seasonal_period(settings.seasonal_period);
        let calibrator = ModelCalibrator::new(stores.models.clone(), search);
        let forecaster = Forecaster::new(stores.forecasts.clone(), settings.confidence_level);
        Self {
            stores,
            calibrator,
            forecaster,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &Arc<dyn CalibrationLedger> {
        &self.stores.ledger
    }

    pub fn forecasts(&self) -> &Arc<dyn ForecastStore> {
        &self.stores.forecasts
    }

    /// Forecast `options.horizon` days for every candidate recipe.
    pub async fn run(&self, options: RunOptions) -> Result<BatchReport, ForecastError> {
        self.check_horizon(options.horizon)?;

        let mut candidates = self.candidate_recipes().await?;
        if let Some(recipe) = &options.recipe {
            if !candidates.iter().any(|c| c == recipe) {
                return Err(ForecastError::UnknownRecipe(recipe.clone()));
            }
            candidates = vec![recipe.clone()];
        }

        let run_id = Uuid::new_v4();
        let Some(batch_marker) = self.stores.usage.latest_usage_date().await? else {
            info!(run_id = %run_id, "No usage recorded, nothing to forecast");
            return Ok(BatchReport {
                run_id,
                batch_marker: None,
                mode: CalibrationMode::Auto,
                horizon: options.horizon,
                ledger_updated: false,
                recipes: Vec::new(),
            });
        };

        let last_calibration = self.stores.ledger.last_calibration().await?;
        let window_covered = match options.window {
            Some(window) => self.stores.forecasts.has_forecast_coverage(window).await?,
            None => true,
        };
        let mode = decide_mode(options.calibrate, last_calibration, window_covered);

        info!(
            run_id = %run_id,
            batch_marker = %batch_marker,
            mode = ?mode,
            horizon = options.horizon,
            recipes = candidates.len(),
            workers = self.settings.workers,
            "Starting forecast batch"
        );

        let recipes = if self.settings.workers > 1 && candidates.len() > 1 {
            self.run_pooled(&candidates, mode, options.horizon, batch_marker).await
        } else {
            let mut reports = Vec::with_capacity(candidates.len());
            for recipe in &candidates {
                let outcome = self.process_recipe(recipe, mode, options.horizon, batch_marker).await;
                reports.push(RecipeReport {
                    recipe: recipe.clone(),
                    outcome,
                });
            }
            reports
        };

        let mut ledger_updated = false;
        if mode == CalibrationMode::Auto && options.recipe.is_none() {
            match self.stores.ledger.mark_calibrated(Utc::now()).await {
                Ok(()) => ledger_updated = true,
                Err(e) => warn!(run_id = %run_id, error = %e, "Failed to record calibration time"),
            }
        }

        let report = BatchReport {
            run_id,
            batch_marker: Some(batch_marker),
            mode,
            horizon: options.horizon,
            ledger_updated,
            recipes,
        };
        info!(
            run_id = %run_id,
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed(),
            rows_inserted = report.rows_inserted(),
            "Forecast batch finished"
        );
        Ok(report)
    }

    /// Forecast far enough ahead to reach `forward_days` past `today`, then
    /// total the latest batch over the requested window.
    pub async fn forecast_window(
        &self,
        request: ForecastRequest,
        today: NaiveDate,
    ) -> Result<WindowForecast, ForecastError> {
        let Some(latest) = self.stores.usage.latest_usage_date().await? else {
            let report = self
                .run(RunOptions {
                    horizon: 1,
                    calibrate: request.calibrate,
                    recipe: request.recipe.clone(),
                    window: request.window,
                })
                .await?;
            return Ok(WindowForecast {
                report,
                window: request.window,
                totals: Vec::new(),
            });
        };

        let gap = (today - latest).num_days().max(0) as u64;
        let forward = u64::from(request.forward_days.unwrap_or(self.settings.forward_days));
        let requested = gap
            .saturating_add(forward)
            .saturating_add(u64::from(request.look_back_days));
        let horizon = usize::try_from(requested).unwrap_or(usize::MAX);
        self.check_horizon(horizon)?;

        let report = self
            .run(RunOptions {
                horizon,
                calibrate: request.calibrate,
                recipe: request.recipe.clone(),
                window: request.window,
            })
            .await?;

        let window = match request.window {
            Some(window) => window,
            None => DateWindow::new(days_after(latest, 1)?, days_after(latest, horizon)?)?,
        };
        let totals = self
            .stores
            .forecasts
            .sum_forecast(request.recipe.as_deref(), window, latest)
            .await?;

        Ok(WindowForecast {
            report,
            window: Some(window),
            totals,
        })
    }

    fn check_horizon(&self, horizon: usize) -> Result<(), ForecastError> {
        if horizon == 0 {
            return Err(ForecastError::InvalidInput("horizon must be at least one day".into()));
        }
        if horizon > self.settings.max_horizon_days {
            return Err(ForecastError::InvalidInput(format!(
                "horizon of {horizon} days exceeds the limit of {} days",
                self.settings.max_horizon_days
            )));
        }
        Ok(())
    }

    /// Catalog order first, then recipes that only appear in the usage log.
    async fn candidate_recipes(&self) -> Result<Vec<String>, ForecastError> {
        let catalog = self.stores.catalog.recipe_names().await?;
        let logged = self.stores.usage.distinct_recipes().await?;

        let mut seen = HashSet::new();
        Ok(catalog
            .into_iter()
            .chain(logged)
            .filter(|name| seen.insert(name.clone()))
            .collect())
    }

    async fn run_pooled(
        &self,
        candidates: &[String],
        mode: CalibrationMode,
        horizon: usize,
        batch_marker: NaiveDate,
    ) -> Vec<RecipeReport> {
        let semaphore = Arc::new(Semaphore::new(self.settings.workers));
        let (tx, mut rx) = mpsc::channel::<(usize, RecipeOutcome)>(candidates.len());

        for (index, recipe) in candidates.iter().enumerate() {
            let this = self.clone();
            let recipe = recipe.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = this.process_recipe(&recipe, mode, horizon, batch_marker).await;
                let _ = tx.send((index, outcome)).await;
            });
        }
        drop(tx);

        let mut outcomes: Vec<Option<RecipeOutcome>> = vec![None; candidates.len()];
        while let Some((index, outcome)) = rx.recv().await {
            outcomes[index] = Some(outcome);
        }

        candidates
            .iter()
            .zip(outcomes)
            .map(|(recipe, outcome)| RecipeReport {
                recipe: recipe.clone(),
                outcome: outcome.unwrap_or_else(|| {
                    warn!(recipe = %recipe, "Worker ended without reporting an outcome");
                    RecipeOutcome::Failed {
                        stage: RecipeStage::Pending,
                        error: "worker task ended without reporting".into(),
                    }
                }),
            })
            .collect()
    }

    async fn process_recipe(
        &self,
        recipe: &str,
        mode: CalibrationMode,
        horizon: usize,
        batch_marker: NaiveDate,
    ) -> RecipeOutcome {
        let mut stage = RecipeStage::Pending;
        match self.advance(recipe, mode, horizon, batch_marker, &mut stage).await {
            Ok(outcome) => {
                match &outcome {
                    RecipeOutcome::Skipped { reason } => {
                        info!(recipe = %recipe, reason = %reason, "Recipe skipped");
                    }
                    RecipeOutcome::Success { rows_inserted, source, .. } => {
                        info!(recipe = %recipe, rows_inserted, source = ?source, "Recipe forecast persisted");
                    }
                    RecipeOutcome::Failed { .. } => {}
                }
                outcome
            }
            Err(e) => {
                warn!(recipe = %recipe, stage = ?stage, error = %e, "Recipe forecast failed");
                RecipeOutcome::Failed {
                    stage,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn advance(
        &self,
        recipe: &str,
        mode: CalibrationMode,
        horizon: usize,
        batch_marker: NaiveDate,
        stage: &mut RecipeStage,
    ) -> Result<RecipeOutcome, ForecastError> {
        let records = self.stores.usage.usage_records(recipe).await?;
        let series = DailySeries::from_records(&records);
        *stage = RecipeStage::Fetched;

        let Some(last_observed) = series.last_date() else {
            return Ok(RecipeOutcome::Skipped {
                reason: SkipReason::NoUsage,
            });
        };
        if !series.is_forecastable(self.settings.min_points) {
            return Ok(RecipeOutcome::Skipped {
                reason: SkipReason::InsufficientData {
                    points: series.len(),
                    required: self.settings.min_points,
                },
            });
        }

        *stage = RecipeStage::Calibrating;
        let calibrated = match mode {
            CalibrationMode::Auto => self
                .calibrator
                .calibrate_auto(recipe, &series)
                .await
                .map(|model| (model, CalibrationSource::AutoSearch)),
            CalibrationMode::Reuse => self.calibrator.calibrate_preferring_saved(recipe, &series).await,
        };
        let (model, source) = match calibrated {
            Ok(calibrated) => calibrated,
            Err(ForecastError::ModelFit(ModelError::InsufficientData { needed, got })) => {
                return Ok(RecipeOutcome::Skipped {
                    reason: SkipReason::InsufficientData {
                        points: got,
                        required: needed,
                    },
                });
            }
            Err(e) => return Err(e),
        };
        *stage = RecipeStage::Calibrated;
        debug!(recipe = %recipe, aic = model.aic(), source = ?source, "Model calibrated");

        *stage = RecipeStage::Forecasting;
        let rows = self
            .forecaster
            .build_rows(recipe, &model, last_observed, horizon, batch_marker)?;
        let rows_inserted = self.forecaster.persist(&rows).await?;
        *stage = RecipeStage::Persisted;

        Ok(RecipeOutcome::Success {
            rows_forecast: rows.len(),
            rows_inserted,
            source,
        })
    }
}

/// `date` moved forward by `days`, or an input error past the calendar's end.
pub(crate) fn days_after(date: NaiveDate, days: usize) -> Result<NaiveDate, ForecastError> {
    i64::try_from(days)
        .ok()
        .and_then(Duration::try_days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or_else(|| ForecastError::InvalidInput(format!("{days} days after {date} is out of range")))
}

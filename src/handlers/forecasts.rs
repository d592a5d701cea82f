use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::db::ForecastRepo;
use crate::errors::AppError;
use crate::forecasting::{ForecastRequest, WindowForecast};
use crate::handlers::AppState;
use crate::models::{
    DateRangeParams, DateWindow, ForecastPoint, ForecastRunRequest, ForecastWindowParams,
    IngredientRequirement, RecipeTotal,
};

#[derive(Debug, Serialize)]
pub struct BatchData<T> {
    /// Batch the data was read from; `None` before the first run.
    pub batch_marker: Option<NaiveDate>,
    pub data: Vec<T>,
}

impl<T> BatchData<T> {
    fn empty() -> Self {
        Self {
            batch_marker: None,
            data: Vec::new(),
        }
    }
}

fn request_window(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Option<DateWindow>, AppError> {
    match (from, to) {
        (Some(from), Some(to)) => Ok(Some(DateWindow::new(from, to)?)),
        (None, None) => Ok(None),
        _ => Err(AppError::bad_request("date_from and date_to must be given together")),
    }
}

pub async fn run(
    State(state): State<AppState>,
    Json(body): Json<ForecastRunRequest>,
) -> Result<Json<WindowForecast>, AppError> {
    let request = ForecastRequest {
        window: request_window(body.date_from, body.date_to)?,
        forward_days: body.forward_days,
        look_back_days: body.look_back_days.unwrap_or(0),
        calibrate: body.calibrate,
        recipe: body.recipe,
    };

    let result = state
        .orchestrator
        .forecast_window(request, Utc::now().date_naive())
        .await?;
    Ok(Json(result))
}

pub async fn summary(
    State(state): State<AppState>,
    Query(params): Query<ForecastWindowParams>,
) -> Result<Json<BatchData<RecipeTotal>>, AppError> {
    let window = params.window()?;
    let store = state.orchestrator.forecasts();
    let Some(batch) = store.latest_batch_marker().await? else {
        return Ok(Json(BatchData::empty()));
    };

    let totals = store.sum_forecast(params.recipe.as_deref(), window, batch).await?;

    Ok(Json(BatchData {
        batch_marker: Some(batch),
        data: totals,
    }))
}

pub async fn recipe_details(
    State(state): State<AppState>,
    Path(recipe): Path<String>,
    Query(params): Query<DateRangeParams>,
) -> Result<Json<BatchData<ForecastPoint>>, AppError> {
    let window = params.window()?;
    let store = state.orchestrator.forecasts();
    let Some(batch) = store.latest_batch_marker().await? else {
        return Ok(Json(BatchData::empty()));
    };

    let points = store.forecast_details(&recipe, window, batch).await?;
    Ok(Json(BatchData {
        batch_marker: Some(batch),
        data: points,
    }))
}

pub async fn ingredients(
    State(state): State<AppState>,
    Query(params): Query<DateRangeParams>,
) -> Result<Json<BatchData<IngredientRequirement>>, AppError> {
    let window = params.window()?;
    let Some(batch) = ForecastRepo::latest_batch(&state.pool).await? else {
        return Ok(Json(BatchData::empty()));
    };

    let needs = ForecastRepo::ingredient_requirements(&state.pool, window.from, window.to, batch).await?;
    Ok(Json(BatchData {
        batch_marker: Some(batch),
        data: needs,
    }))
}

pub async fn reconcile(
    State(state): State<AppState>,
    Json(body): Json<DateRangeParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let window = body.window()?;
    let updated = ForecastRepo::reconcile_actuals(&state.pool, window.from, window.to).await?;
    tracing::info!(from = %window.from, to = %window.to, updated, "Reconciled actual usage");
    Ok(Json(serde_json::json!({ "updated": updated })))
}

pub async fn calibration(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let last = state.orchestrator.ledger().last_calibration().await?;
    Ok(Json(serde_json::json!({
        "last_calibration": last.map(|t| t.to_rfc3339()),
    })))
}

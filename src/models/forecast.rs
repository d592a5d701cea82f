use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::forecasting::ForecastError;
use crate::models::DateWindow;

/// One forecasted day for one recipe, tagged with the batch it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub recipe: String,
    pub date: NaiveDate,
    pub forecasted_quantity: f64,
    pub standard_error: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub actual_quantity: Option<f64>,
    /// Latest usage date known when the batch ran.
    pub batch_marker: NaiveDate,
}

impl ForecastRow {
    pub fn key(&self) -> (&str, NaiveDate, NaiveDate) {
        (self.recipe.as_str(), self.date, self.batch_marker)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RecipeTotal {
    pub recipe: String,
    pub total: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub forecast: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub actual: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct IngredientRequirement {
    pub ingredient: String,
    pub total: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastRunRequest {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub forward_days: Option<u32>,
    pub look_back_days: Option<u32>,
    #[serde(default)]
    pub calibrate: bool,
    pub recipe: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastWindowParams {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub recipe: Option<String>,
}

impl ForecastWindowParams {
    pub fn window(&self) -> Result<DateWindow, ForecastError> {
        DateWindow::new(self.date_from, self.date_to)
    }
}

/// Inclusive date range used by detail, ingredient and reconcile requests.
#[derive(Debug, Deserialize)]
pub struct DateRangeParams {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

impl DateRangeParams {
    pub fn window(&self) -> Result<DateWindow, ForecastError> {
        DateWindow::new(self.date_from, self.date_to)
    }
}

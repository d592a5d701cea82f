use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ml::sarima::{Order, SeasonalOrder};

/// Fitted model parameters persisted per recipe so later runs can skip the
/// order search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    pub recipe: String,
    pub order: Order,
    pub seasonal_order: SeasonalOrder,
    pub aic: f64,
    pub fitted_at: DateTime<Utc>,
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One logged usage entry for a menu item. Several entries may share a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UsageRecord {
    pub recipe: String,
    pub date: NaiveDate,
    pub quantity: i64,
}

impl UsageRecord {
    pub fn new(recipe: impl Into<String>, date: NaiveDate, quantity: i64) -> Self {
        Self {
            recipe: recipe.into(),
            date,
            quantity,
        }
    }
}

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::forecasting::ForecastError;

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ForecastError> {
        if from > to {
            return Err(ForecastError::InvalidInput(format!(
                "date range starts after it ends ({from} > {to})"
            )));
        }
        Ok(Self { from, to })
    }

    /// Number of days in the window, both ends included.
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..self.days()).map(move |i| self.from + Duration::days(i))
    }
}

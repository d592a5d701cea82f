/// Daily usage series construction.
/// Same-day records are summed, the calendar is reindexed to one point per day
/// and interior gaps are filled by linear interpolation.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use crate::models::UsageRecord;

/// Minimum number of daily points before a recipe is worth calibrating.
pub const MIN_FORECAST_POINTS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailySeries {
    points: Vec<(NaiveDate, f64)>,
}

impl DailySeries {
    /// Build the series from raw usage records of a single recipe.
    pub fn from_records(records: &[UsageRecord]) -> Self {
        Self::from_pairs(records.iter().map(|r| (r.date, r.quantity as f64)))
    }

    /// Build the series from `(date, quantity)` pairs in any order.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        let mut by_date: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for (date, quantity) in pairs {
            *by_date.entry(date).or_insert(0.0) += quantity;
        }

        let (first, last) = match (by_date.keys().next(), by_date.keys().next_back()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Self::default(),
        };

        let span = (last - first).num_days() as usize + 1;
        let reindexed: Vec<Option<f64>> = (0..span)
            .map(|i| by_date.get(&(first + Duration::days(i as i64))).copied())
            .collect();

        let filled = interpolate_linear(&reindexed);

        let points = filled
            .into_iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (first + Duration::days(i as i64), v)))
            .collect();

        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|(_, v)| *v).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|(d, _)| *d)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|(d, _)| *d)
    }

    /// Whether the series carries enough points to be handed to a calibrator.
    pub fn is_forecastable(&self, min_points: usize) -> bool {
        self.len() >= min_points
    }
}

/// Fill interior `None` runs by straight lines between their known neighbours.
/// Leading and trailing `None`s have a single neighbour and stay undefined.
fn interpolate_linear(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = values.to_vec();
    let mut last_known: Option<(usize, f64)> = None;

    for (i, v) in values.iter().enumerate() {
        if let Some(v) = *v {
            if let Some((j, prev)) = last_known {
                let gap = i - j;
                for k in 1..gap {
                    let t = k as f64 / gap as f64;
                    out[j + k] = Some(prev + (v - prev) * t);
                }
            }
            last_known = Some((i, v));
        }
    }

    out
}

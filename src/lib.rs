//! Daily recipe-usage forecasting for restaurant back offices.
//!
//! Usage logs are turned into per-recipe seasonal ARIMA forecasts, stored
//! per batch and queried to project ingredient needs.

pub mod config;
pub mod db;
pub mod errors;
pub mod forecasting;
pub mod handlers;
pub mod jobs;
pub mod ml;
pub mod models;

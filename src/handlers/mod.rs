pub mod forecasts;
pub mod health;

use crate::forecasting::ForecastOrchestrator;

/// Shared application state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub orchestrator: ForecastOrchestrator,
}

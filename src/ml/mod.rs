pub mod auto;
pub mod forecast;
pub mod optimize;
pub mod sarima;
pub mod series;

pub use auto::{auto_sarima, AutoSearchConfig, SearchOutcome};
pub use forecast::{generate_forecast, ForecastResult, DEFAULT_CONFIDENCE};
pub use sarima::{Constraints, FittedSarima, ModelError, Order, SarimaSpec, SeasonalOrder};
pub use series::{DailySeries, MIN_FORECAST_POINTS};

pub mod forecasts;
pub mod recipes;
pub mod usage;

pub use forecasts::ForecastRepo;
pub use recipes::RecipeRepo;
pub use usage::UsageRepo;

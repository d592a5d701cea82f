pub mod calibrator;
pub mod error;
pub mod forecaster;
pub mod ledger;
pub mod model_store;
pub mod orchestrator;
pub mod stores;

pub use calibrator::{CalibrationSource, ModelCalibrator};
pub use error::ForecastError;
pub use forecaster::Forecaster;
pub use ledger::FileCalibrationLedger;
pub use model_store::FileModelStore;
pub use orchestrator::{
    decide_mode, BatchReport, CalibrationMode, Collaborators, ForecastOrchestrator, ForecastRequest,
    OrchestratorSettings, RecipeOutcome, RecipeReport, RecipeStage, RunOptions, SkipReason,
    WindowForecast, DEFAULT_MAX_HORIZON_DAYS,
};
pub use stores::{CalibrationLedger, ForecastStore, ModelStore, PgStores, RecipeCatalog, UsageLog};

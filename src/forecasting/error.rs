use thiserror::Error;

use crate::ml::ModelError;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("insufficient data: {points} daily points, need {required}")]
    InsufficientData { points: usize, required: usize },

    #[error("model fit failed: {0}")]
    ModelFit(#[from] ModelError),

    #[error("no saved model for recipe '{0}'")]
    MissingSavedModel(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown recipe '{0}'")]
    UnknownRecipe(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("worker task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

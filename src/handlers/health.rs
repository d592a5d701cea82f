use axum::{extract::State, Json};
use serde_json::json;

use crate::errors::AppError;
use crate::handlers::AppState;

pub async fn health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Health check database ping failed");
            AppError::service_unavailable("Database")
        })?;

    Ok(Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

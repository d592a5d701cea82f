use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use menucast::config::AppConfig;
use menucast::forecasting::{
    Collaborators, FileCalibrationLedger, FileModelStore, ForecastOrchestrator, PgStores,
};
use menucast::handlers::{self, AppState};
use menucast::jobs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "menucast=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Load configuration
    let config = AppConfig::load()?;
    tracing::info!("Configuration loaded");

    // Connect to PostgreSQL
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url())
        .await?;
    tracing::info!("Connected to PostgreSQL");

    // Run migrations
    sqlx::raw_sql(include_str!("../migrations/001_initial_schema.sql"))
        .execute(&pool)
        .await?;
    tracing::info!("Database migrations applied");

    let pg = Arc::new(PgStores::new(pool.clone()));
    let collaborators = Collaborators {
        usage: pg.clone(),
        catalog: pg.clone(),
        forecasts: pg,
        models: Arc::new(FileModelStore::new(&config.forecasting.model_dir)),
        ledger: Arc::new(FileCalibrationLedger::new(&config.forecasting.ledger_path)),
    };
    let orchestrator =
        ForecastOrchestrator::new(collaborators, config.forecasting.orchestrator_settings());

    let state = AppState {
        pool: pool.clone(),
        orchestrator: orchestrator.clone(),
    };

    // Spawn background jobs
    jobs::spawn_background_jobs(orchestrator, config.jobs.clone());

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/v1/forecasts/run", post(handlers::forecasts::run))
        .route("/api/v1/forecasts/summary", get(handlers::forecasts::summary))
        .route("/api/v1/forecasts/recipes/:recipe", get(handlers::forecasts::recipe_details))
        .route("/api/v1/forecasts/ingredients", get(handlers::forecasts::ingredients))
        .route("/api/v1/forecasts/reconcile", post(handlers::forecasts::reconcile))
        .route("/api/v1/calibration", get(handlers::forecasts::calibration))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Starting menucast server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

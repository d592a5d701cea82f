use chrono::Utc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use crate::config::JobsConfig;
use crate::forecasting::{ForecastOrchestrator, ForecastRequest};

pub fn spawn_background_jobs(orchestrator: ForecastOrchestrator, config: JobsConfig) {
    if !config.forecast_enabled {
        info!("Scheduled forecasting disabled");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.forecast_interval_secs));
        loop {
            ticker.tick().await;
            info!("Running forecast job");
            if let Err(e) = run_forecast(&orchestrator).await {
                error!("Forecast job failed: {e}");
            }
        }
    });

    info!(interval_secs = config.forecast_interval_secs, "Background jobs started");
}

/// Forecast the configured number of days ahead, reusing saved orders when
/// the ledger allows it.
async fn run_forecast(orchestrator: &ForecastOrchestrator) -> anyhow::Result<()> {
    let result = orchestrator
        .forecast_window(ForecastRequest::default(), Utc::now().date_naive())
        .await?;

    let report = &result.report;
    info!(
        run_id = %report.run_id,
        succeeded = report.succeeded(),
        skipped = report.skipped(),
        failed = report.failed(),
        rows_inserted = report.rows_inserted(),
        "Scheduled forecast finished"
    );
    Ok(())
}

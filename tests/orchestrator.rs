mod common;

use chrono::{Duration, Utc};

use common::{date, daily_records, soup_a, weekly, Harness, MemoryLedger};
use menucast::forecasting::{
    BatchReport, CalibrationLedger, CalibrationMode, CalibrationSource, ForecastError, ForecastRequest,
    ModelStore, OrchestratorSettings, RecipeOutcome, RecipeStage, RunOptions, SkipReason,
    DEFAULT_MAX_HORIZON_DAYS,
};
use menucast::models::DateWindow;

fn options(horizon: usize) -> RunOptions {
    RunOptions {
        horizon,
        ..RunOptions::default()
    }
}

#[tokio::test]
async fn test_soup_a_gets_five_rows_after_last_usage() {
    let harness = Harness::new(soup_a(), &["Soup A"]);
    let report = harness
        .orchestrator
        .run(RunOptions {
            horizon: 5,
            recipe: Some("Soup A".into()),
            ..RunOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(report.batch_marker, Some(date(2024, 1, 15)));
    assert!(matches!(
        report.outcome_for("Soup A"),
        Some(RecipeOutcome::Success { rows_inserted: 5, .. })
    ));

    let rows = harness.forecasts.rows_for("Soup A").await;
    let dates: Vec<_> = rows.iter().map(|r| r.date).collect();
    let expected: Vec<_> = (16..=20).map(|d| date(2024, 1, d)).collect();
    assert_eq!(dates, expected);
    for row in &rows {
        assert_eq!(row.batch_marker, date(2024, 1, 15));
        assert!(row.forecasted_quantity.is_finite());
        assert!(row.ci_lower <= row.forecasted_quantity && row.forecasted_quantity <= row.ci_upper);
        assert!(row.actual_quantity.is_none());
    }
}

#[tokio::test]
async fn test_short_recipe_is_skipped_without_stopping_batch() {
    let mut records = soup_a();
    records.extend(daily_records("Drink B", date(2024, 1, 15), &[4, 6, 5]));
    let harness = Harness::new(records, &["Drink B", "Soup A"]);

    let report = harness.orchestrator.run(options(5)).await.unwrap();

    match report.outcome_for("Drink B") {
        Some(RecipeOutcome::Skipped { reason }) => {
            assert_eq!(reason.to_string(), "insufficient data");
            assert_eq!(*reason, SkipReason::InsufficientData { points: 3, required: 10 });
        }
        other => panic!("unexpected outcome for Drink B: {other:?}"),
    }
    assert!(harness.forecasts.rows_for("Drink B").await.is_empty());
    assert_eq!(harness.forecasts.rows_for("Soup A").await.len(), 5);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.skipped(), 1);
}

#[tokio::test]
async fn test_catalog_recipe_without_usage_is_skipped() {
    let harness = Harness::new(soup_a(), &["Soup A", "Salad C"]);
    let report = harness.orchestrator.run(options(3)).await.unwrap();
    assert_eq!(
        report.outcome_for("Salad C"),
        Some(&RecipeOutcome::Skipped { reason: SkipReason::NoUsage })
    );
}

#[tokio::test]
async fn test_missing_saved_model_falls_back_to_auto() {
    let harness = Harness::new(soup_a(), &["Soup A"]);
    harness.ledger.mark_calibrated(Utc::now()).await.unwrap();

    let report = harness.orchestrator.run(options(3)).await.unwrap();
    assert_eq!(report.mode, CalibrationMode::Reuse);
    assert!(matches!(
        report.outcome_for("Soup A"),
        Some(RecipeOutcome::Success { source: CalibrationSource::FallbackAutoSearch, .. })
    ));
    assert!(!report.ledger_updated);

    let saved = harness.models.load_model("Soup A").await.unwrap();
    assert_eq!(saved.recipe, "Soup A");

    let again = harness.orchestrator.run(options(3)).await.unwrap();
    assert!(matches!(
        again.outcome_for("Soup A"),
        Some(RecipeOutcome::Success { source: CalibrationSource::SavedOrders, .. })
    ));
}

#[tokio::test]
async fn test_rerun_for_same_batch_adds_no_rows() {
    let harness = Harness::new(soup_a(), &["Soup A"]);
    let forced = RunOptions {
        horizon: 5,
        calibrate: true,
        ..RunOptions::default()
    };

    harness.orchestrator.run(forced.clone()).await.unwrap();
    let after_first = harness.forecasts.len().await;
    let second = harness.orchestrator.run(forced).await.unwrap();

    assert_eq!(harness.forecasts.len().await, after_first);
    assert_eq!(second.rows_inserted(), 0);
    assert!(matches!(
        second.outcome_for("Soup A"),
        Some(RecipeOutcome::Success { rows_forecast: 5, rows_inserted: 0, .. })
    ));
}

#[tokio::test]
async fn test_worker_pool_matches_sequential_run() {
    let mut records = soup_a();
    records.extend(weekly("Stew", 20));
    records.extend(weekly("Pie", 5));
    records.extend(daily_records("Drink B", date(2024, 1, 15), &[1, 2, 3]));
    let catalog = ["Stew", "Drink B", "Soup A", "Pie"];

    let sequential = Harness::with_workers(records.clone(), &catalog, 1);
    let pooled = Harness::with_workers(records, &catalog, 3);

    let seq_report = sequential.orchestrator.run(options(7)).await.unwrap();
    let pool_report = pooled.orchestrator.run(options(7)).await.unwrap();

    let order = |r: &BatchReport| -> Vec<String> {
        r.recipes.iter().map(|x| x.recipe.clone()).collect()
    };
    assert_eq!(order(&seq_report), catalog.to_vec());
    assert_eq!(order(&pool_report), catalog.to_vec());
    for (a, b) in seq_report.recipes.iter().zip(&pool_report.recipes) {
        assert_eq!(a.outcome, b.outcome);
    }

    let mut seq_rows = sequential.forecasts.rows().await;
    let mut pool_rows = pooled.forecasts.rows().await;
    seq_rows.sort_by(|a, b| (&a.recipe, a.date).cmp(&(&b.recipe, b.date)));
    pool_rows.sort_by(|a, b| (&a.recipe, a.date).cmp(&(&b.recipe, b.date)));
    assert_eq!(seq_rows.len(), 21);
    assert_eq!(seq_rows, pool_rows);
}

#[tokio::test]
async fn test_invalid_requests_do_no_work() {
    let harness = Harness::new(soup_a(), &["Soup A"]);

    let err = harness.orchestrator.run(options(0)).await.unwrap_err();
    assert!(matches!(err, ForecastError::InvalidInput(_)));

    let err = harness
        .orchestrator
        .run(RunOptions {
            horizon: 5,
            recipe: Some("Soup Z".into()),
            ..RunOptions::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ForecastError::UnknownRecipe(ref name) if name == "Soup Z"));

    let err = DateWindow::new(date(2024, 1, 20), date(2024, 1, 16)).unwrap_err();
    assert!(matches!(err, ForecastError::InvalidInput(_)));

    assert_eq!(harness.forecasts.len().await, 0);
    assert_eq!(harness.ledger.last_calibration().await.unwrap(), None);
}

#[tokio::test]
async fn test_forced_calibration_moves_ledger_forward() {
    let harness = Harness::new(soup_a(), &["Soup A"]);
    let earlier = Utc::now() - Duration::days(2);
    harness.ledger.mark_calibrated(earlier).await.unwrap();

    let report = harness
        .orchestrator
        .run(RunOptions {
            horizon: 2,
            calibrate: true,
            ..RunOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(report.mode, CalibrationMode::Auto);
    assert!(report.ledger_updated);
    let marker = harness.ledger.last_calibration().await.unwrap().unwrap();
    assert!(marker >= earlier);
}

#[tokio::test]
async fn test_single_recipe_auto_run_leaves_ledger_alone() {
    let harness = Harness::new(soup_a(), &["Soup A"]);
    let report = harness
        .orchestrator
        .run(RunOptions {
            horizon: 2,
            recipe: Some("Soup A".into()),
            ..RunOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(report.mode, CalibrationMode::Auto);
    assert!(!report.ledger_updated);
    assert_eq!(harness.ledger.last_calibration().await.unwrap(), None);
}

#[tokio::test]
async fn test_no_usage_gives_empty_report() {
    let harness = Harness::new(Vec::new(), &["Soup A"]);
    let report = harness.orchestrator.run(options(5)).await.unwrap();
    assert_eq!(report.batch_marker, None);
    assert!(report.recipes.is_empty());
    assert_eq!(harness.ledger.last_calibration().await.unwrap(), None);
}

#[tokio::test]
async fn test_window_forecast_reaches_past_today() {
    let harness = Harness::new(soup_a(), &["Soup A"]);
    let request = ForecastRequest {
        forward_days: Some(3),
        ..ForecastRequest::default()
    };

    let result = harness
        .orchestrator
        .forecast_window(request, date(2024, 1, 17))
        .await
        .unwrap();

    assert_eq!(result.report.horizon, 5);
    assert_eq!(result.window, Some(DateWindow::new(date(2024, 1, 16), date(2024, 1, 20)).unwrap()));
    assert_eq!(result.totals.len(), 1);

    let rows = harness.forecasts.rows_for("Soup A").await;
    let expected: f64 = rows.iter().map(|r| r.forecasted_quantity).sum();
    assert!((result.totals[0].total - expected).abs() < 1e-9);
}

#[tokio::test]
async fn test_covered_window_reuses_saved_orders() {
    let harness = Harness::new(soup_a(), &["Soup A"]);
    let window = DateWindow::new(date(2024, 1, 16), date(2024, 1, 18)).unwrap();

    let first = harness
        .orchestrator
        .forecast_window(
            ForecastRequest {
                window: Some(window),
                forward_days: Some(3),
                ..ForecastRequest::default()
            },
            date(2024, 1, 15),
        )
        .await
        .unwrap();
    assert_eq!(first.report.mode, CalibrationMode::Auto);

    let second = harness
        .orchestrator
        .forecast_window(
            ForecastRequest {
                window: Some(window),
                forward_days: Some(3),
                ..ForecastRequest::default()
            },
            date(2024, 1, 15),
        )
        .await
        .unwrap();
    assert_eq!(second.report.mode, CalibrationMode::Reuse);
    assert_eq!(first.totals, second.totals);
}

#[tokio::test]
async fn test_oversized_window_request_is_rejected() {
    let mut records = soup_a();
    records.extend(daily_records("Drink B", date(2024, 1, 15), &[4, 6, 5]));
    let harness = Harness::new(records, &["Soup A", "Drink B"]);

    for request in [
        ForecastRequest {
            forward_days: Some(u32::MAX),
            ..ForecastRequest::default()
        },
        ForecastRequest {
            forward_days: Some(1),
            look_back_days: u32::MAX,
            ..ForecastRequest::default()
        },
    ] {
        let err = harness
            .orchestrator
            .forecast_window(request, date(2024, 1, 15))
            .await
            .unwrap_err();
        assert!(matches!(err, ForecastError::InvalidInput(_)));
    }

    let err = harness
        .orchestrator
        .run(options(DEFAULT_MAX_HORIZON_DAYS + 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ForecastError::InvalidInput(_)));

    assert_eq!(harness.forecasts.len().await, 0);
    assert_eq!(harness.ledger.last_calibration().await.unwrap(), None);
}

#[tokio::test]
async fn test_horizon_limit_follows_settings() {
    let settings = OrchestratorSettings {
        max_horizon_days: 10,
        ..OrchestratorSettings::default()
    };
    let harness = Harness::with_settings(soup_a(), &["Soup A"], settings);

    let err = harness
        .orchestrator
        .forecast_window(
            ForecastRequest {
                forward_days: Some(8),
                ..ForecastRequest::default()
            },
            date(2024, 1, 18),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ForecastError::InvalidInput(_)));
    assert_eq!(harness.forecasts.len().await, 0);

    let report = harness.orchestrator.run(options(10)).await.unwrap();
    assert_eq!(report.rows_inserted(), 10);
}

#[tokio::test]
async fn test_failed_ledger_write_keeps_batch_report() {
    let harness = Harness::with_ledger(soup_a(), &["Soup A"], MemoryLedger::failing());

    let report = harness.orchestrator.run(options(5)).await.unwrap();

    assert_eq!(report.mode, CalibrationMode::Auto);
    assert!(!report.ledger_updated);
    assert!(matches!(
        report.outcome_for("Soup A"),
        Some(RecipeOutcome::Success { rows_inserted: 5, .. })
    ));
    assert_eq!(harness.forecasts.rows_for("Soup A").await.len(), 5);
    assert_eq!(harness.ledger.last_calibration().await.unwrap(), None);
}

#[tokio::test]
async fn test_flat_recipe_fails_while_batch_continues() {
    let mut records = daily_records("Water", date(2024, 1, 15), &[0; 15]);
    records.extend(soup_a());
    let harness = Harness::new(records, &["Water", "Soup A"]);

    let report = harness.orchestrator.run(options(5)).await.unwrap();

    match report.outcome_for("Water") {
        Some(RecipeOutcome::Failed { stage, error }) => {
            assert_eq!(*stage, RecipeStage::Calibrating);
            assert!(!error.is_empty());
        }
        other => panic!("unexpected outcome for Water: {other:?}"),
    }
    assert!(harness.forecasts.rows_for("Water").await.is_empty());
    assert!(matches!(
        report.outcome_for("Soup A"),
        Some(RecipeOutcome::Success { rows_inserted: 5, .. })
    ));
    assert_eq!(report.failed(), 1);
    assert_eq!(report.succeeded(), 1);
}

use chrono::NaiveDate;
use sqlx::PgPool;

use crate::models::{ForecastPoint, ForecastRow, IngredientRequirement, RecipeTotal};

const INSERT_IF_ABSENT: &str = r#"INSERT INTO forecasted_values (recipe_item, date, forecasted_quantity, mean_se, ci_lower, ci_upper, actual_quantity, batch_marker)
   VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
   ON CONFLICT (recipe_item, date, batch_marker) DO NOTHING"#;

pub struct ForecastRepo;

impl ForecastRepo {
    /// Returns whether the row was new.
    pub async fn insert_if_absent(pool: &PgPool, row: &ForecastRow) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(INSERT_IF_ABSENT)
            .bind(&row.recipe)
            .bind(row.date)
            .bind(row.forecasted_quantity)
            .bind(row.standard_error)
            .bind(row.ci_lower)
            .bind(row.ci_upper)
            .bind(row.actual_quantity)
            .bind(row.batch_marker)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert one recipe's rows in a single transaction, skipping existing keys.
    pub async fn insert_batch(pool: &PgPool, rows: &[ForecastRow]) -> Result<usize, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut inserted = 0u64;
        for row in rows {
            let result = sqlx::query(INSERT_IF_ABSENT)
                .bind(&row.recipe)
                .bind(row.date)
                .bind(row.forecasted_quantity)
                .bind(row.standard_error)
                .bind(row.ci_lower)
                .bind(row.ci_upper)
                .bind(row.actual_quantity)
                .bind(row.batch_marker)
                .execute(&mut *tx)
                .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted as usize)
    }

    pub async fn sum_for_window(
        pool: &PgPool,
        recipe: Option<&str>,
        from: NaiveDate,
        to: NaiveDate,
        batch_marker: NaiveDate,
    ) -> Result<Vec<RecipeTotal>, sqlx::Error> {
        sqlx::query_as::<_, RecipeTotal>(
            r#"SELECT recipe_item AS recipe,
                      COALESCE(SUM(forecasted_quantity), 0) AS total,
                      COALESCE(SUM(ci_lower), 0) AS ci_lower,
                      COALESCE(SUM(ci_upper), 0) AS ci_upper
               FROM forecasted_values
               WHERE date >= $1 AND date <= $2 AND batch_marker = $3
                 AND ($4::TEXT IS NULL OR recipe_item = $4)
               GROUP BY recipe_item
               ORDER BY recipe_item"#,
        )
        .bind(from)
        .bind(to)
        .bind(batch_marker)
        .bind(recipe)
        .fetch_all(pool)
        .await
    }

    /// Number of distinct days in `[from, to]` that have any forecast row.
    pub async fn covered_days(pool: &PgPool, from: NaiveDate, to: NaiveDate) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT date) FROM forecasted_values WHERE date >= $1 AND date <= $2",
        )
        .bind(from)
        .bind(to)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    pub async fn latest_batch(pool: &PgPool) -> Result<Option<NaiveDate>, sqlx::Error> {
        let (latest,): (Option<NaiveDate>,) =
            sqlx::query_as("SELECT MAX(batch_marker) FROM forecasted_values")
                .fetch_one(pool)
                .await?;
        Ok(latest)
    }

    pub async fn details(
        pool: &PgPool,
        recipe: &str,
        from: NaiveDate,
        to: NaiveDate,
        batch_marker: NaiveDate,
    ) -> Result<Vec<ForecastPoint>, sqlx::Error> {
        sqlx::query_as::<_, ForecastPoint>(
            r#"SELECT date, forecasted_quantity AS forecast, ci_lower, ci_upper, actual_quantity AS actual
               FROM forecasted_values
               WHERE recipe_item = $1 AND date >= $2 AND date <= $3 AND batch_marker = $4
               ORDER BY date"#,
        )
        .bind(recipe)
        .bind(from)
        .bind(to)
        .bind(batch_marker)
        .fetch_all(pool)
        .await
    }

    /// Forecast servings multiplied out into ingredient quantities.
    pub async fn ingredient_requirements(
        pool: &PgPool,
        from: NaiveDate,
        to: NaiveDate,
        batch_marker: NaiveDate,
    ) -> Result<Vec<IngredientRequirement>, sqlx::Error> {
        sqlx::query_as::<_, IngredientRequirement>(
            r#"SELECT r.ingredients AS ingredient,
                      COALESCE(SUM(f.forecasted_quantity * r.quantity), 0) AS total,
                      r.unit_of_measure AS unit
               FROM forecasted_values f
               JOIN recipes r ON r.recipe_name = f.recipe_item
               WHERE f.date >= $1 AND f.date <= $2 AND f.batch_marker = $3
                 AND r.ingredients IS NOT NULL AND r.quantity IS NOT NULL
               GROUP BY r.ingredients, r.unit_of_measure
               ORDER BY r.ingredients"#,
        )
        .bind(from)
        .bind(to)
        .bind(batch_marker)
        .fetch_all(pool)
        .await
    }

    /// Copy recorded usage into `actual_quantity` for forecasts in the range.
    pub async fn reconcile_actuals(pool: &PgPool, from: NaiveDate, to: NaiveDate) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE forecasted_values f
               SET actual_quantity = u.total
               FROM (
                   SELECT recipe_item, date, SUM(quantity)::float8 AS total
                   FROM daily_used_menu_items
                   WHERE date >= $1 AND date <= $2 AND quantity IS NOT NULL
                   GROUP BY recipe_item, date
               ) u
               WHERE f.recipe_item = u.recipe_item AND f.date = u.date"#,
        )
        .bind(from)
        .bind(to)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

use chrono::NaiveDate;
use sqlx::PgPool;

use crate::models::UsageRecord;

pub struct UsageRepo;

impl UsageRepo {
    pub async fn records_for(pool: &PgPool, recipe: &str) -> Result<Vec<UsageRecord>, sqlx::Error> {
        sqlx::query_as::<_, UsageRecord>(
            r#"SELECT recipe_item AS recipe, date, quantity::BIGINT AS quantity
               FROM daily_used_menu_items
               WHERE recipe_item = $1 AND date IS NOT NULL AND quantity IS NOT NULL
               ORDER BY date"#,
        )
        .bind(recipe)
        .fetch_all(pool)
        .await
    }

    pub async fn distinct_recipes(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT recipe_item FROM daily_used_menu_items ORDER BY recipe_item",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    pub async fn latest_date(pool: &PgPool) -> Result<Option<NaiveDate>, sqlx::Error> {
        let (latest,): (Option<NaiveDate>,) =
            sqlx::query_as("SELECT MAX(date) FROM daily_used_menu_items")
                .fetch_one(pool)
                .await?;
        Ok(latest)
    }
}

use sqlx::PgPool;

pub struct RecipeRepo;

impl RecipeRepo {
    /// Distinct recipe names, in first-entered order.
    pub async fn names(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT recipe_name FROM recipes
               GROUP BY recipe_name
               ORDER BY MIN(id)"#,
        )
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}

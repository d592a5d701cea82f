use std::path::PathBuf;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::forecasting::ledger::write_atomically;
use crate::forecasting::stores::ModelStore;
use crate::forecasting::ForecastError;
use crate::models::SavedModel;

const HASH_PREFIX_LEN: usize = 12;

/// One JSON document per recipe under a model directory.
#[derive(Debug, Clone)]
pub struct FileModelStore {
    dir: PathBuf,
}

impl FileModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Readable slug of the name plus a digest of the exact name, so names
    /// that differ only in punctuation or case get distinct files.
    pub fn model_key(recipe: &str) -> String {
        let mut slug = String::with_capacity(recipe.len());
        for c in recipe.chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('_') {
                slug.push('_');
            }
        }
        let slug = slug.trim_matches('_');
        let slug = if slug.is_empty() { "recipe" } else { slug };

        let mut hasher = Sha256::new();
        hasher.update(recipe.as_bytes());
        let digest = hex::encode(hasher.finalize());

        format!("{slug}-{}", &digest[..HASH_PREFIX_LEN])
    }

    fn path_for(&self, recipe: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::model_key(recipe)))
    }
}

#[async_trait]
impl ModelStore for FileModelStore {
    async fn save_model(&self, model: &SavedModel) -> Result<(), ForecastError> {
        let path = self.path_for(&model.recipe);
        let body = serde_json::to_vec_pretty(model)?;
        write_atomically(&path, &body).await?;
        debug!(recipe = %model.recipe, path = %path.display(), "Saved model parameters");
        Ok(())
    }

    async fn load_model(&self, recipe: &str) -> Result<SavedModel, ForecastError> {
        let bytes = match tokio::fs::read(self.path_for(recipe)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ForecastError::MissingSavedModel(recipe.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

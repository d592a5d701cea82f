use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::forecasting::stores::CalibrationLedger;
use crate::forecasting::ForecastError;

#[derive(Debug, Serialize, Deserialize)]
struct CalibrationMarker {
    calibrated_at: DateTime<Utc>,
}

/// Calibration marker kept as a small JSON document on disk.
#[derive(Debug, Clone)]
pub struct FileCalibrationLedger {
    path: PathBuf,
}

impl FileCalibrationLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CalibrationLedger for FileCalibrationLedger {
    async fn mark_calibrated(&self, at: DateTime<Utc>) -> Result<(), ForecastError> {
        let body = serde_json::to_vec_pretty(&CalibrationMarker { calibrated_at: at })?;
        write_atomically(&self.path, &body).await
    }

    async fn last_calibration(&self) -> Result<Option<DateTime<Utc>>, ForecastError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let marker: CalibrationMarker = serde_json::from_slice(&bytes)?;
        Ok(Some(marker.calibrated_at))
    }
}

/// Write through a sibling temp file and rename, so readers never observe a
/// half-written document.
pub(crate) async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), ForecastError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

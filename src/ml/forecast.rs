/// Point forecasts with normal confidence bands from a fitted SARIMA model.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::ml::sarima::{FittedSarima, ModelError};

pub const DEFAULT_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    pub predicted: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub confidence: f64,
}

impl ForecastResult {
    pub fn len(&self) -> usize {
        self.predicted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicted.is_empty()
    }
}

/// Two-sided normal quantile for the given coverage, e.g. 1.96 for 0.95.
pub fn critical_value(confidence: f64) -> Result<f64, ModelError> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(ModelError::InvalidConfidence(confidence));
    }
    let normal = Normal::new(0.0, 1.0).map_err(|_| ModelError::InvalidConfidence(confidence))?;
    Ok(normal.inverse_cdf((1.0 + confidence) / 2.0))
}

/// Forecast `horizon` days past the model's last observation.
/// `mean ± z·se` gives the interval at `confidence`.
pub fn generate_forecast(
    model: &FittedSarima,
    horizon: usize,
    confidence: f64,
) -> Result<ForecastResult, ModelError> {
    let z = critical_value(confidence)?;
    let prediction = model.predict(horizon);

    if prediction.mean.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonConvergence);
    }

    let (lower, upper) = prediction
        .mean
        .iter()
        .zip(&prediction.std_errors)
        .map(|(m, se)| (m - z * se, m + z * se))
        .unzip();

    Ok(ForecastResult {
        predicted: prediction.mean,
        std_errors: prediction.std_errors,
        lower,
        upper,
        confidence,
    })
}

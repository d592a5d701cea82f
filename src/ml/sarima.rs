//! Seasonal ARIMA estimation and prediction.
//!
//! A SARIMA(p,d,q)(P,D,Q)[m] model is fitted by conditional sum of squares on
//! the differenced series `w = (1-B)^d (1-B^m)^D y`:
//!
//! ```text
//! φ(B) Φ(B^m) (w_t - μ) = θ(B) Θ(B^m) ε_t
//! ```
//!
//! The intercept `μ` is only estimated when no differencing is applied.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ml::optimize::{nelder_mead, SimplexConfig};

/// Variance floor so perfectly fitted series keep a finite likelihood.
const MIN_VARIANCE: f64 = 1e-10;
/// Objective value returned for parameter vectors outside the admissible region.
const PENALTY: f64 = f64::MAX;
const ENFORCED_BOUND: f64 = 0.99;
const RELAXED_BOUND: f64 = 1.5;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("series is constant, nothing to model")]
    DegenerateSeries,

    #[error("estimation did not reach a finite objective")]
    NonConvergence,

    #[error("no candidate order could be fitted")]
    NoAdmissibleModel,

    #[error("confidence level must lie in (0, 1), got {0}")]
    InvalidConfidence(f64),
}

/// Non-seasonal order `(p, d, q)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Order {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl Order {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

/// Seasonal order `(P, D, Q, m)`. A period below 2 disables the seasonal part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeasonalOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub m: usize,
}

impl SeasonalOrder {
    pub fn new(p: usize, d: usize, q: usize, m: usize) -> Self {
        Self { p, d, q, m }
    }

    pub fn none() -> Self {
        Self::new(0, 0, 0, 0)
    }
}

impl fmt::Display for SeasonalOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{},{})", self.p, self.d, self.q, self.m)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SarimaSpec {
    pub order: Order,
    pub seasonal: SeasonalOrder,
}

impl SarimaSpec {
    pub fn new(order: Order, seasonal: SeasonalOrder) -> Self {
        let seasonal = if seasonal.m > 1 {
            seasonal
        } else {
            SeasonalOrder::new(0, 0, 0, seasonal.m)
        };
        Self { order, seasonal }
    }

    fn period(&self) -> usize {
        if self.seasonal.m > 1 {
            self.seasonal.m
        } else {
            0
        }
    }

    pub fn has_intercept(&self) -> bool {
        self.order.d + self.seasonal.d == 0
    }

    /// Estimated coefficients, innovation variance excluded.
    pub fn n_coefficients(&self) -> usize {
        self.order.p
            + self.order.q
            + self.seasonal.p
            + self.seasonal.q
            + usize::from(self.has_intercept())
    }

    /// Highest autoregressive lag of the expanded model.
    fn ar_span(&self) -> usize {
        self.order.p + self.seasonal.p * self.period()
    }

    /// `(1-B)^d (1-B^m)^D` as coefficients indexed by power of B.
    pub fn differencing_polynomial(&self) -> Vec<f64> {
        let mut poly = vec![1.0];
        for _ in 0..self.order.d {
            poly = poly_mul(&poly, &[1.0, -1.0]);
        }
        if self.period() > 0 {
            for _ in 0..self.seasonal.d {
                poly = poly_mul(&poly, &lag_polynomial(&[1.0], self.period(), -1.0));
            }
        }
        poly
    }

    /// Smallest series length that leaves more effective residuals than
    /// estimated parameters.
    pub fn min_observations(&self) -> usize {
        let span = self.differencing_polynomial().len() - 1;
        span + self.ar_span() + self.n_coefficients() + 2
    }
}

impl fmt::Display for SarimaSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SARIMA{}x{}", self.order, self.seasonal)
    }
}

/// Whether estimation keeps the model stationary and invertible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraints {
    Enforced,
    /// Wider coefficient bounds and no root checks, for sparse retail series.
    Relaxed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Coefficients {
    pub intercept: f64,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub seasonal_ar: Vec<f64>,
    pub seasonal_ma: Vec<f64>,
}

impl Coefficients {
    /// Unpack an optimiser vector laid out as `[μ?] [ar] [ma] [sar] [sma]`.
    fn from_params(spec: &SarimaSpec, params: &[f64]) -> Self {
        let mut offset = 0;
        let mut take = |n: usize| {
            let out = params[offset..offset + n].to_vec();
            offset += n;
            out
        };

        let intercept = if spec.has_intercept() { take(1)[0] } else { 0.0 };
        Self {
            intercept,
            ar: take(spec.order.p),
            ma: take(spec.order.q),
            seasonal_ar: take(spec.seasonal.p),
            seasonal_ma: take(spec.seasonal.q),
        }
    }

    /// `φ(B) Φ(B^m)` indexed by power of B.
    fn ar_polynomial(&self, period: usize) -> Vec<f64> {
        poly_mul(
            &lag_polynomial(&self.ar, 1, -1.0),
            &lag_polynomial(&self.seasonal_ar, period, -1.0),
        )
    }

    /// `θ(B) Θ(B^m)` indexed by power of B.
    fn ma_polynomial(&self, period: usize) -> Vec<f64> {
        poly_mul(
            &lag_polynomial(&self.ma, 1, 1.0),
            &lag_polynomial(&self.seasonal_ma, period, 1.0),
        )
    }

    /// AR weights `a_i` in `w_t = μ + Σ a_i (w_{t-i} - μ) + ...`.
    fn ar_lags(&self, period: usize) -> Vec<f64> {
        self.ar_polynomial(period)[1..].iter().map(|c| -c).collect()
    }

    /// MA weights `b_j` in `w_t = ... + Σ b_j ε_{t-j} + ε_t`.
    fn ma_lags(&self, period: usize) -> Vec<f64> {
        self.ma_polynomial(period)[1..].to_vec()
    }

    fn is_admissible(&self) -> bool {
        is_stationary(&self.ar)
            && is_stationary(&self.seasonal_ar)
            && is_invertible(&self.ma)
            && is_invertible(&self.seasonal_ma)
    }
}

/// Point forecasts and their standard errors, one entry per step ahead.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub mean: Vec<f64>,
    pub std_errors: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct FittedSarima {
    spec: SarimaSpec,
    constraints: Constraints,
    coefficients: Coefficients,
    sigma2: f64,
    loglik: f64,
    aic: f64,
    converged: bool,
    history: Vec<f64>,
    differenced: Vec<f64>,
    residuals: Vec<f64>,
}

impl FittedSarima {
    /// Estimate the model on `values` (oldest first).
    pub fn fit(
        values: &[f64],
        spec: SarimaSpec,
        constraints: Constraints,
    ) -> Result<Self, ModelError> {
        let needed = spec.min_observations();
        if values.len() < needed {
            return Err(ModelError::InsufficientData {
                needed,
                got: values.len(),
            });
        }
        if is_constant(values) {
            return Err(ModelError::DegenerateSeries);
        }

        let diff_poly = spec.differencing_polynomial();
        let w = apply_filter(&diff_poly, values);
        let period = spec.period();
        let start = spec.ar_span();
        let n_eff = (w.len() - start) as f64;
        let w_mean = mean(&w);

        let bound = match constraints {
            Constraints::Enforced => ENFORCED_BOUND,
            Constraints::Relaxed => RELAXED_BOUND,
        };

        let mut initial = Vec::with_capacity(spec.n_coefficients());
        let mut bounds = Vec::with_capacity(spec.n_coefficients());
        if spec.has_intercept() {
            initial.push(w_mean);
            bounds.push((f64::NEG_INFINITY, f64::INFINITY));
        }
        for n in [spec.order.p, spec.order.q, spec.seasonal.p, spec.seasonal.q] {
            for i in 0..n {
                initial.push(0.1 / (i + 1) as f64);
                bounds.push((-bound, bound));
            }
        }

        let objective = |params: &[f64]| -> f64 {
            let coefs = Coefficients::from_params(&spec, params);
            if constraints == Constraints::Enforced && !coefs.is_admissible() {
                return PENALTY;
            }
            let residuals = conditional_residuals(
                &w,
                coefs.intercept,
                &coefs.ar_lags(period),
                &coefs.ma_lags(period),
            );
            let css = sum_of_squares(&residuals[start..]);
            if css.is_finite() {
                css
            } else {
                PENALTY
            }
        };

        let only_intercept = spec.has_intercept() && initial.len() == 1;
        let (params, converged) = if only_intercept {
            (initial, true)
        } else {
            let result = nelder_mead(objective, &initial, &bounds, &SimplexConfig::default());
            (result.point, result.converged)
        };

        let coefficients = Coefficients::from_params(&spec, &params);
        let residuals = conditional_residuals(
            &w,
            coefficients.intercept,
            &coefficients.ar_lags(period),
            &coefficients.ma_lags(period),
        );
        let css = sum_of_squares(&residuals[start..]);
        if !css.is_finite() {
            return Err(ModelError::NonConvergence);
        }

        let sigma2 = (css / n_eff).max(MIN_VARIANCE);
        let loglik = -0.5 * n_eff * ((2.0 * PI * sigma2).ln() + 1.0);
        let k = (spec.n_coefficients() + 1) as f64;
        let aic = -2.0 * loglik + 2.0 * k;
        if !aic.is_finite() {
            return Err(ModelError::NonConvergence);
        }

        Ok(Self {
            spec,
            constraints,
            coefficients,
            sigma2,
            loglik,
            aic,
            converged,
            history: values.to_vec(),
            differenced: w,
            residuals,
        })
    }

    pub fn spec(&self) -> SarimaSpec {
        self.spec
    }

    pub fn order(&self) -> Order {
        self.spec.order
    }

    pub fn seasonal_order(&self) -> SeasonalOrder {
        self.spec.seasonal
    }

    pub fn constraints(&self) -> Constraints {
        self.constraints
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coefficients
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn loglik(&self) -> f64 {
        self.loglik
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn n_obs(&self) -> usize {
        self.history.len()
    }

    /// Forecast `horizon` steps past the last observation.
    pub fn predict(&self, horizon: usize) -> Prediction {
        let period = self.spec.period();
        let mu = self.coefficients.intercept;
        let ar = self.coefficients.ar_lags(period);
        let ma = self.coefficients.ma_lags(period);

        let mut w = self.differenced.clone();
        let mut e = self.residuals.clone();
        for _ in 0..horizon {
            let t = w.len();
            let mut pred = mu;
            for (i, a) in ar.iter().enumerate() {
                if t > i {
                    pred += a * (w[t - 1 - i] - mu);
                }
            }
            for (j, b) in ma.iter().enumerate() {
                if t > j {
                    pred += b * e[t - 1 - j];
                }
            }
            w.push(pred);
            // Future shocks have zero expectation.
            e.push(0.0);
        }

        let diff_poly = self.spec.differencing_polynomial();
        let mut y = self.history.clone();
        for &wf in &w[self.differenced.len()..] {
            let t = y.len();
            let mut value = wf;
            for (k, f) in diff_poly.iter().enumerate().skip(1) {
                value -= f * y[t - k];
            }
            y.push(value);
        }
        let mean = y[self.history.len()..].to_vec();

        let psi = self.psi_weights(horizon);
        let mut cumulative = 0.0;
        let std_errors = psi
            .iter()
            .map(|p| {
                cumulative += p * p;
                (self.sigma2 * cumulative).sqrt()
            })
            .collect();

        Prediction { mean, std_errors }
    }

    /// MA(∞) weights of the integrated model on the original scale.
    fn psi_weights(&self, horizon: usize) -> Vec<f64> {
        let period = self.spec.period();
        let full_ar = poly_mul(
            &self.coefficients.ar_polynomial(period),
            &self.spec.differencing_polynomial(),
        );
        let full_ma = self.coefficients.ma_polynomial(period);

        let mut psi = Vec::with_capacity(horizon);
        for j in 0..horizon {
            if j == 0 {
                psi.push(1.0);
                continue;
            }
            let mut value = full_ma.get(j).copied().unwrap_or(0.0);
            for i in 1..=j.min(full_ar.len() - 1) {
                value -= full_ar[i] * psi[j - i];
            }
            psi.push(value);
        }
        psi
    }
}

/// Product of two polynomials given by coefficients indexed by power.
fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// `1 + sign * Σ c_i B^((i+1) * step)`.
fn lag_polynomial(coefs: &[f64], step: usize, sign: f64) -> Vec<f64> {
    if coefs.is_empty() || step == 0 {
        return vec![1.0];
    }
    let mut poly = vec![0.0; coefs.len() * step + 1];
    poly[0] = 1.0;
    for (i, c) in coefs.iter().enumerate() {
        poly[(i + 1) * step] = sign * c;
    }
    poly
}

/// `Σ f_k y_{t-k}` for every `t` with a full window behind it.
fn apply_filter(poly: &[f64], values: &[f64]) -> Vec<f64> {
    let span = poly.len() - 1;
    (span..values.len())
        .map(|t| poly.iter().enumerate().map(|(k, f)| f * values[t - k]).sum())
        .collect()
}

fn conditional_residuals(w: &[f64], mu: f64, ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let start = ar.len();
    let mut e = vec![0.0; w.len()];
    for t in start..w.len() {
        let mut pred = mu;
        for (i, a) in ar.iter().enumerate() {
            pred += a * (w[t - 1 - i] - mu);
        }
        for (j, b) in ma.iter().enumerate() {
            if t > j {
                pred += b * e[t - 1 - j];
            }
        }
        e[t] = w[t] - pred;
    }
    e
}

fn sum_of_squares(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| (w[1] - w[0]).abs() < 1e-12)
}

/// Whether `1 - Σ a_i z^i` has all roots outside the unit circle, checked by
/// stepping the coefficients down to partial autocorrelations.
pub fn is_stationary(coefs: &[f64]) -> bool {
    let mut phi = coefs.to_vec();
    while let Some(&k) = phi.last() {
        if !k.is_finite() || k.abs() >= 1.0 {
            return false;
        }
        let n = phi.len();
        let denom = 1.0 - k * k;
        phi = (0..n - 1)
            .map(|i| (phi[i] + k * phi[n - 2 - i]) / denom)
            .collect();
    }
    true
}

/// Whether `1 + Σ b_j z^j` has all roots outside the unit circle.
pub fn is_invertible(coefs: &[f64]) -> bool {
    let negated: Vec<f64> = coefs.iter().map(|c| -c).collect();
    is_stationary(&negated)
}

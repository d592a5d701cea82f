//! Stepwise SARIMA order selection.
//!
//! Differencing orders are chosen up front from variance tests, then the
//! `(p, q, P, Q)` neighbourhood of the best model so far is explored until no
//! neighbour lowers the AIC.

use std::collections::HashSet;

use tracing::debug;

use crate::ml::sarima::{Constraints, FittedSarima, ModelError, Order, SarimaSpec, SeasonalOrder};

#[derive(Debug, Clone)]
pub struct AutoSearchConfig {
    pub seasonal_period: usize,
    pub max_p: usize,
    pub max_q: usize,
    pub max_seasonal_p: usize,
    pub max_seasonal_q: usize,
    pub max_d: usize,
    pub max_seasonal_d: usize,
    /// Upper bound on `p + q + P + Q`.
    pub max_order: usize,
    /// Upper bound on the number of candidate fits per search.
    pub max_models: usize,
}

impl Default for AutoSearchConfig {
    fn default() -> Self {
        Self {
            seasonal_period: 7,
            max_p: 5,
            max_q: 5,
            max_seasonal_p: 2,
            max_seasonal_q: 2,
            max_d: 2,
            max_seasonal_d: 1,
            max_order: 5,
            max_models: 64,
        }
    }
}

impl AutoSearchConfig {
    pub fn with_seasonal_period(mut self, period: usize) -> Self {
        self.seasonal_period = period;
        self
    }

    fn admits(&self, p: usize, q: usize, sp: usize, sq: usize) -> bool {
        let seasonal_ok = if self.seasonal_period > 1 {
            sp <= self.max_seasonal_p && sq <= self.max_seasonal_q
        } else {
            sp == 0 && sq == 0
        };
        p <= self.max_p && q <= self.max_q && seasonal_ok && p + q + sp + sq <= self.max_order
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub model: FittedSarima,
    /// Number of admissible candidate orders that were fitted.
    pub evaluated: usize,
}

/// Pick differencing orders, then search `(p, q, P, Q)` stepwise for the
/// lowest-AIC model. Candidates that fail to fit are ignored.
pub fn auto_sarima(values: &[f64], config: &AutoSearchConfig) -> Result<SearchOutcome, ModelError> {
    if values.windows(2).all(|w| (w[1] - w[0]).abs() < 1e-12) {
        return Err(if values.len() < 2 {
            ModelError::InsufficientData { needed: 2, got: values.len() }
        } else {
            ModelError::DegenerateSeries
        });
    }

    let m = config.seasonal_period;
    let d = suggest_differencing(values, config.max_d);
    let d_series = difference(values, d);
    let seasonal_d = if m > 1 {
        suggest_seasonal_differencing(&d_series, m, config.max_seasonal_d)
    } else {
        0
    };

    let make = |p: usize, q: usize, sp: usize, sq: usize| {
        SarimaSpec::new(Order::new(p, d, q), SeasonalOrder::new(sp, seasonal_d, sq, m))
    };

    let mut starts = vec![make(2, 2, 1, 1), make(0, 0, 0, 0), make(1, 0, 1, 0), make(0, 1, 0, 1)];
    if m <= 1 {
        starts = vec![make(2, 2, 0, 0), make(0, 0, 0, 0), make(1, 0, 0, 0), make(0, 1, 0, 0)];
    }

    let mut visited: HashSet<SarimaSpec> = HashSet::new();
    let mut best: Option<FittedSarima> = None;
    let mut last_error: Option<ModelError> = None;

    let mut evaluate = |spec: SarimaSpec,
                        visited: &mut HashSet<SarimaSpec>,
                        best: &mut Option<FittedSarima>|
     -> bool {
        let o = spec.order;
        let s = spec.seasonal;
        if !config.admits(o.p, o.q, s.p, s.q) {
            return false;
        }
        if visited.len() >= config.max_models || !visited.insert(spec) {
            return false;
        }
        match FittedSarima::fit(values, spec, Constraints::Enforced) {
            Ok(model) => {
                debug!(%spec, aic = model.aic(), "Candidate fitted");
                let improves = best.as_ref().map_or(true, |b| model.aic() < b.aic());
                if improves {
                    *best = Some(model);
                }
                improves
            }
            Err(e) => {
                debug!(%spec, error = %e, "Candidate rejected");
                last_error = Some(e);
                false
            }
        }
    };

    for spec in starts {
        evaluate(spec, &mut visited, &mut best);
    }

    const STEPS: [(i64, i64, i64, i64); 12] = [
        (0, 0, 1, 0),
        (0, 0, -1, 0),
        (0, 0, 0, 1),
        (0, 0, 0, -1),
        (0, 0, 1, 1),
        (0, 0, -1, -1),
        (1, 0, 0, 0),
        (-1, 0, 0, 0),
        (0, 1, 0, 0),
        (0, -1, 0, 0),
        (1, 1, 0, 0),
        (-1, -1, 0, 0),
    ];

    'search: loop {
        let center = match best.as_ref() {
            Some(model) => model.spec(),
            None => break,
        };
        for (dp, dq, dsp, dsq) in STEPS {
            let shifted = [
                center.order.p as i64 + dp,
                center.order.q as i64 + dq,
                center.seasonal.p as i64 + dsp,
                center.seasonal.q as i64 + dsq,
            ];
            if shifted.iter().any(|v| *v < 0) {
                continue;
            }
            let candidate = make(
                shifted[0] as usize,
                shifted[1] as usize,
                shifted[2] as usize,
                shifted[3] as usize,
            );
            if evaluate(candidate, &mut visited, &mut best) {
                continue 'search;
            }
        }
        break;
    }

    let evaluated = visited.len();
    match best {
        Some(model) => Ok(SearchOutcome { model, evaluated }),
        None => Err(last_error.unwrap_or(ModelError::NoAdmissibleModel)),
    }
}

pub fn difference(values: &[f64], d: usize) -> Vec<f64> {
    let mut out = values.to_vec();
    for _ in 0..d {
        if out.len() < 2 {
            break;
        }
        out = out.windows(2).map(|w| w[1] - w[0]).collect();
    }
    out
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Keep differencing while each step shrinks the variance noticeably.
pub fn suggest_differencing(values: &[f64], max_d: usize) -> usize {
    let mut current = values.to_vec();
    let mut d = 0;
    while d < max_d && current.len() >= 4 {
        let before = variance(&current);
        if before <= 0.0 {
            break;
        }
        let next = difference(&current, 1);
        if variance(&next) / before >= 0.9 {
            break;
        }
        current = next;
        d += 1;
    }
    d
}

/// Seasonal differencing is suggested when it removes a large share of the
/// variance and at least three full cycles are available.
pub fn suggest_seasonal_differencing(values: &[f64], period: usize, max_d: usize) -> usize {
    if max_d == 0 || period < 2 || values.len() < 3 * period {
        return 0;
    }
    let before = variance(values);
    if before <= 0.0 {
        return 0;
    }
    let diffs: Vec<f64> = (period..values.len())
        .map(|i| values[i] - values[i - period])
        .collect();
    if variance(&diffs) < 0.7 * before {
        1
    } else {
        0
    }
}

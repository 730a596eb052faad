use serde::{Deserialize, Serialize};
use tabfit_core::{Matrix, TabError, TabResult};
use tabfit_linalg::solve;
use tracing::{debug, warn};

use crate::regression::{linear_predictor, Design};

pub const DEFAULT_MAX_ITER: usize = 100;

/// Relative change in deviance at which IRLS stops.
pub const CONVERGENCE_TOL: f64 = 1e-8;

const PROB_EPS: f64 = 1e-10;

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn deviance(y: &[f64], mu: &[f64]) -> f64 {
    -2.0 * y
        .iter()
        .zip(mu)
        .map(|(&yi, &p)| yi * p.ln() + (1.0 - yi) * (1.0 - p).ln())
        .sum::<f64>()
}

/// Binary logistic regression fitted by iteratively reweighted least squares.
///
/// An optional L2 `penalty` shrinks the weights (never the intercept).
/// Aliased features are handled as in [`crate::LinearRegression`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    intercept: f64,
    weights: Vec<f64>,
    aliased: Vec<usize>,
    penalty: f64,
    iterations: usize,
    converged: bool,
}

impl LogisticRegression {
    /// Fit on 0/1 targets.
    pub fn fit(x: &Matrix, y: &[f64], penalty: f64) -> TabResult<Self> {
        if !(penalty >= 0.0) || !penalty.is_finite() {
            return Err(TabError::invalid_hyperparameter(
                "penalty",
                penalty,
                "must be a finite value >= 0",
            ));
        }
        if y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(TabError::FitFailure("logistic targets must be 0 or 1".into()));
        }
        let design = Design::new(x, y.len())?;
        let xr = design.reduced();
        let n = xr.rows();
        let k = xr.cols();

        let mut beta = vec![0.0; k];
        let mut dev_old = f64::INFINITY;
        let mut iterations = 0;
        let mut converged = false;

        for iter in 0..DEFAULT_MAX_ITER {
            iterations = iter + 1;
            let eta = xr.matvec(&beta)?;
            let mu: Vec<f64> = eta.iter().map(|&e| sigmoid(e).clamp(PROB_EPS, 1.0 - PROB_EPS)).collect();

            // weighted normal equations: (XᵀWX + λI') β = XᵀWz
            let mut xtwx = Matrix::zeros(k, k);
            let mut xtwz = vec![0.0; k];
            for i in 0..n {
                let w = mu[i] * (1.0 - mu[i]);
                let z = eta[i] + (y[i] - mu[i]) / w;
                let row = xr.row(i);
                for a in 0..k {
                    xtwz[a] += row[a] * w * z;
                    for b in 0..k {
                        xtwx.set(a, b, xtwx.get(a, b) + row[a] * w * row[b]);
                    }
                }
            }
            for a in 1..k {
                xtwx.set(a, a, xtwx.get(a, a) + penalty);
            }

            let next = match solve(&xtwx, &xtwz) {
                Ok(b) if b.iter().all(|v| v.is_finite()) => b,
                Ok(_) | Err(_) if iter > 0 => {
                    warn!(iteration = iterations, "weighted system became singular, keeping previous estimate");
                    break;
                }
                Ok(_) => return Err(TabError::FitFailure("non-finite logistic coefficients".into())),
                Err(e) => return Err(TabError::FitFailure(format!("logistic regression: {}", e))),
            };
            beta = next;

            let mu_new: Vec<f64> = xr
                .matvec(&beta)?
                .iter()
                .map(|&e| sigmoid(e).clamp(PROB_EPS, 1.0 - PROB_EPS))
                .collect();
            let dev = deviance(y, &mu_new);
            if (dev - dev_old).abs() / (dev.abs() + 0.1) < CONVERGENCE_TOL {
                converged = true;
                break;
            }
            dev_old = dev;
        }

        if !converged {
            warn!(iterations, "logistic regression did not converge; data may be separable");
        }
        let (intercept, weights) = design.scatter(&beta);
        debug!(n, p = x.cols(), iterations, converged, "fitted logistic regression");
        Ok(LogisticRegression {
            intercept,
            weights,
            aliased: design.aliased(),
            penalty,
            iterations,
            converged,
        })
    }

    /// Probability of the positive (second) class for each row.
    pub fn predict_proba(&self, x: &Matrix) -> TabResult<Vec<f64>> {
        Ok(linear_predictor(self.intercept, &self.weights, x)?
            .into_iter()
            .map(sigmoid)
            .collect())
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn aliased(&self) -> &[usize] {
        &self.aliased
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}

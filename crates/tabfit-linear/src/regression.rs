use serde::{Deserialize, Serialize};
use tabfit_core::{Matrix, TabError, TabResult};
use tabfit_linalg::{independent_columns, solve};
use tracing::{debug, warn};

/// Design matrix with an intercept column and the indices of its linearly
/// independent columns. Column 0 is the intercept.
pub(crate) struct Design {
    pub x: Matrix,
    pub kept: Vec<usize>,
}

impl Design {
    pub(crate) fn new(x: &Matrix, n_targets: usize) -> TabResult<Self> {
        if x.rows() != n_targets {
            return Err(TabError::DimensionMismatch(format!(
                "{} feature rows but {} targets",
                x.rows(),
                n_targets
            )));
        }
        if x.rows() == 0 {
            return Err(TabError::InsufficientData("no training rows".into()));
        }
        if !x.is_finite() {
            return Err(TabError::FitFailure("feature matrix contains non-finite values".into()));
        }
        let xa = x.with_intercept();
        let gram = xa.transpose().matmul(&xa)?;
        let kept = independent_columns(&gram)?;
        let n_aliased = xa.cols() - kept.len();
        if n_aliased > 0 {
            warn!(n_aliased, "linearly dependent features, coefficients fixed at zero");
        }
        Ok(Design { x: xa, kept })
    }

    /// Feature indices (intercept excluded) whose coefficients were fixed at zero.
    pub(crate) fn aliased(&self) -> Vec<usize> {
        (1..self.x.cols())
            .filter(|j| !self.kept.contains(j))
            .map(|j| j - 1)
            .collect()
    }

    /// Columns of the design restricted to the kept set.
    pub(crate) fn reduced(&self) -> Matrix {
        self.x.select_columns(&self.kept)
    }

    /// Expand a solution over the kept columns to `(intercept, weights)`.
    pub(crate) fn scatter(&self, beta: &[f64]) -> (f64, Vec<f64>) {
        let mut full = vec![0.0; self.x.cols()];
        for (&j, &b) in self.kept.iter().zip(beta) {
            full[j] = b;
        }
        let intercept = full[0];
        full.remove(0);
        (intercept, full)
    }
}

pub(crate) fn linear_predictor(intercept: f64, weights: &[f64], x: &Matrix) -> TabResult<Vec<f64>> {
    if x.cols() != weights.len() {
        return Err(TabError::DimensionMismatch(format!(
            "model was fitted on {} features but got {}",
            weights.len(),
            x.cols()
        )));
    }
    Ok(x.matvec(weights)?.into_iter().map(|v| v + intercept).collect())
}

/// Ordinary least squares linear regression with an intercept.
///
/// Fits `y = Xw + b` through the normal equations `XᵀX w = Xᵀy`. Features
/// that are exact linear combinations of earlier ones are aliased: their
/// weight is fixed at zero and the rest of the system is solved as usual.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    intercept: f64,
    weights: Vec<f64>,
    aliased: Vec<usize>,
}

impl LinearRegression {
    pub fn fit(x: &Matrix, y: &[f64]) -> TabResult<Self> {
        if y.iter().any(|v| !v.is_finite()) {
            return Err(TabError::FitFailure("target contains non-finite values".into()));
        }
        let design = Design::new(x, y.len())?;
        let xr = design.reduced();
        let xt = xr.transpose();
        let xtx = xt.matmul(&xr)?;
        let xty = xt.matvec(y)?;
        let beta = solve(&xtx, &xty).map_err(|e| TabError::FitFailure(format!("least squares: {}", e)))?;
        let (intercept, weights) = design.scatter(&beta);
        debug!(n = x.rows(), p = x.cols(), intercept, "fitted linear regression");
        Ok(LinearRegression {
            intercept,
            weights,
            aliased: design.aliased(),
        })
    }

    pub fn predict(&self, x: &Matrix) -> TabResult<Vec<f64>> {
        linear_predictor(self.intercept, &self.weights, x)
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Feature indices whose weight was fixed at zero.
    pub fn aliased(&self) -> &[usize] {
        &self.aliased
    }
}

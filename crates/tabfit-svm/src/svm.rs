use serde::{Deserialize, Serialize};
use tabfit_core::{squared_distance, Matrix, TabError, TabResult};
use tracing::{debug, warn};

use crate::platt::PlattScaling;

/// Upper bound on full SMO passes over the training rows.
pub const MAX_PASSES: usize = 500;

/// KKT violation tolerance.
pub const KKT_TOL: f64 = 1e-3;

const ALPHA_EPS: f64 = 1e-8;

/// Radial basis kernel `exp(-sigma * ||x - x'||^2)`.
#[inline]
pub fn rbf_kernel(a: &[f64], b: &[f64], sigma: f64) -> f64 {
    (-sigma * squared_distance(a, b)).exp()
}

/// Binary support vector classifier with an RBF kernel, trained by SMO.
///
/// Rows are visited in order and the second multiplier is the one with the
/// largest error gap (lowest index on ties), so fitting is deterministic.
/// Probabilities come from Platt scaling of the training decision values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RbfSvc {
    cost: f64,
    sigma: f64,
    /// Support vectors and their signed multipliers `alpha_i * y_i`.
    support: Matrix,
    coef: Vec<f64>,
    bias: f64,
    platt: PlattScaling,
}

impl RbfSvc {
    /// Fit on boolean labels; `true` is the positive class.
    pub fn fit(x: &Matrix, positive: &[bool], cost: f64, sigma: f64) -> TabResult<Self> {
        if !(cost > 0.0) || !cost.is_finite() {
            return Err(TabError::invalid_hyperparameter("cost", cost, "must be a finite value > 0"));
        }
        if !(sigma > 0.0) || !sigma.is_finite() {
            return Err(TabError::invalid_hyperparameter("rbf_sigma", sigma, "must be a finite value > 0"));
        }
        let n = x.rows();
        if n != positive.len() {
            return Err(TabError::DimensionMismatch(format!(
                "{} feature rows but {} targets",
                n,
                positive.len()
            )));
        }
        if !positive.iter().any(|&p| p) || positive.iter().all(|&p| p) {
            return Err(TabError::FitFailure(
                "support vector classification needs both classes in the training data".into(),
            ));
        }
        if !x.is_finite() {
            return Err(TabError::FitFailure("feature matrix contains non-finite values".into()));
        }

        let y: Vec<f64> = positive.iter().map(|&p| if p { 1.0 } else { -1.0 }).collect();
        let mut kernel = vec![0.0; n * n];
        for i in 0..n {
            for j in i..n {
                let k = rbf_kernel(x.row(i), x.row(j), sigma);
                kernel[i * n + j] = k;
                kernel[j * n + i] = k;
            }
        }
        let k = |i: usize, j: usize| kernel[i * n + j];

        let mut alphas = vec![0.0; n];
        let mut b = 0.0;
        // decision values without the bias
        let mut f = vec![0.0; n];
        let mut converged = false;
        let mut passes = 0;

        while passes < MAX_PASSES {
            passes += 1;
            let mut num_changed = 0;

            for i in 0..n {
                let ei = f[i] + b - y[i];
                let yi = y[i];
                if !((yi * ei < -KKT_TOL && alphas[i] < cost) || (yi * ei > KKT_TOL && alphas[i] > 0.0)) {
                    continue;
                }

                let mut j = usize::MAX;
                let mut best_gap = f64::NEG_INFINITY;
                for c in (0..n).filter(|&c| c != i) {
                    let gap = (ei - (f[c] + b - y[c])).abs();
                    if gap > best_gap {
                        best_gap = gap;
                        j = c;
                    }
                }
                if j == usize::MAX {
                    continue;
                }
                let yj = y[j];
                let ej = f[j] + b - yj;

                let ai_old = alphas[i];
                let aj_old = alphas[j];
                let (lo, hi) = if yi != yj {
                    (0.0_f64.max(aj_old - ai_old), cost.min(cost + aj_old - ai_old))
                } else {
                    (0.0_f64.max(ai_old + aj_old - cost), cost.min(ai_old + aj_old))
                };
                if (lo - hi).abs() < f64::EPSILON {
                    continue;
                }

                let eta = 2.0 * k(i, j) - k(i, i) - k(j, j);
                if eta >= 0.0 {
                    continue;
                }

                let aj = (aj_old - yj * (ei - ej) / eta).clamp(lo, hi);
                if (aj - aj_old).abs() < 1e-5 {
                    continue;
                }
                let ai = ai_old + yi * yj * (aj_old - aj);
                alphas[i] = ai;
                alphas[j] = aj;

                let b1 = b - ei - yi * (ai - ai_old) * k(i, i) - yj * (aj - aj_old) * k(i, j);
                let b2 = b - ej - yi * (ai - ai_old) * k(i, j) - yj * (aj - aj_old) * k(j, j);
                b = if ai > 0.0 && ai < cost {
                    b1
                } else if aj > 0.0 && aj < cost {
                    b2
                } else {
                    (b1 + b2) / 2.0
                };

                let (di, dj) = (yi * (ai - ai_old), yj * (aj - aj_old));
                for (r, fr) in f.iter_mut().enumerate() {
                    *fr += di * k(i, r) + dj * k(j, r);
                }
                num_changed += 1;
            }

            if num_changed == 0 {
                converged = true;
                break;
            }
        }
        if !converged {
            warn!(passes, "SMO reached the pass limit before satisfying KKT conditions");
        }

        let support_idx: Vec<usize> = (0..n).filter(|&i| alphas[i] > ALPHA_EPS).collect();
        let coef: Vec<f64> = support_idx.iter().map(|&i| alphas[i] * y[i]).collect();
        let support = x.select_rows(&support_idx);

        let decision: Vec<f64> = f.iter().map(|v| v + b).collect();
        let platt = PlattScaling::fit(&decision, positive)?;

        debug!(n, n_support = support_idx.len(), passes, cost, sigma, "fitted rbf svm");
        Ok(RbfSvc {
            cost,
            sigma,
            support,
            coef,
            bias: b,
            platt,
        })
    }

    /// Signed distance-like score; positive favours the positive class.
    pub fn decision_function(&self, x: &Matrix) -> TabResult<Vec<f64>> {
        if self.support.rows() > 0 && x.cols() != self.support.cols() {
            return Err(TabError::DimensionMismatch(format!(
                "model was fitted on {} features but got {}",
                self.support.cols(),
                x.cols()
            )));
        }
        Ok((0..x.rows())
            .map(|i| {
                let row = x.row(i);
                self.coef
                    .iter()
                    .enumerate()
                    .map(|(s, c)| c * rbf_kernel(self.support.row(s), row, self.sigma))
                    .sum::<f64>()
                    + self.bias
            })
            .collect())
    }

    /// Calibrated probability of the positive class.
    pub fn predict_proba(&self, x: &Matrix) -> TabResult<Vec<f64>> {
        Ok(self
            .decision_function(x)?
            .into_iter()
            .map(|d| self.platt.probability(d))
            .collect())
    }

    /// Class decision by the sign of the decision function; `true` is the
    /// positive class. Independent of the Platt calibration.
    pub fn predict(&self, x: &Matrix) -> TabResult<Vec<bool>> {
        Ok(self.decision_function(x)?.into_iter().map(|d| d > 0.0).collect())
    }

    pub fn n_support(&self) -> usize {
        self.coef.len()
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rings() -> (Matrix, Vec<bool>) {
        // inner points negative, outer ring positive
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for k in 0..12 {
            let t = k as f64 * std::f64::consts::PI / 6.0;
            rows.push(vec![0.5 * t.cos(), 0.5 * t.sin()]);
            labels.push(false);
            rows.push(vec![3.0 * t.cos(), 3.0 * t.sin()]);
            labels.push(true);
        }
        (Matrix::from_rows(&rows).unwrap(), labels)
    }

    #[test]
    fn test_rbf_svc_separates_rings() {
        let (x, y) = rings();
        let svc = RbfSvc::fit(&x, &y, 10.0, 0.5).unwrap();
        let scores = svc.decision_function(&x).unwrap();
        for (s, &label) in scores.iter().zip(&y) {
            assert_eq!(*s > 0.0, label);
        }
        let proba = svc.predict_proba(&x).unwrap();
        for (p, &label) in proba.iter().zip(&y) {
            assert_eq!(*p > 0.5, label);
        }
        assert!(svc.n_support() > 0);
    }

    #[test]
    fn test_predict_follows_decision_sign_not_calibration() {
        let (x, y) = rings();
        let mut svc = RbfSvc::fit(&x, &y, 10.0, 0.5).unwrap();
        // sigmoid(f - 3): p = 0.5 sits at f = 3, far from the decision boundary
        svc.platt = serde_json::from_str(r#"{"a": 1.0, "b": -3.0}"#).unwrap();
        let scores = svc.decision_function(&x).unwrap();
        let labels = svc.predict(&x).unwrap();
        let proba = svc.predict_proba(&x).unwrap();
        assert_eq!(labels, y);
        for (s, &label) in scores.iter().zip(&labels) {
            assert_eq!(*s > 0.0, label);
        }
        assert!(labels.iter().zip(&proba).any(|(&label, &p)| label && p < 0.5));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = rings();
        let a = RbfSvc::fit(&x, &y, 1.0, 1.0).unwrap();
        let b = RbfSvc::fit(&x, &y, 1.0, 1.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_hyperparameters() {
        let (x, y) = rings();
        assert!(matches!(
            RbfSvc::fit(&x, &y, 0.0, 1.0),
            Err(TabError::InvalidHyperparameter { .. })
        ));
        assert!(matches!(
            RbfSvc::fit(&x, &y, 1.0, -1.0),
            Err(TabError::InvalidHyperparameter { .. })
        ));
    }

    #[test]
    fn test_single_class_rejected() {
        let x = Matrix::from_rows(&[vec![0.0], vec![1.0]]).unwrap();
        assert!(matches!(
            RbfSvc::fit(&x, &[true, true], 1.0, 1.0),
            Err(TabError::FitFailure(_))
        ));
    }
}

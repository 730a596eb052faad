//! Platt scaling: maps decision values to probabilities with a fitted sigmoid.

use serde::{Deserialize, Serialize};
use tabfit_core::{TabError, TabResult};

const MAX_ITER: usize = 100;
const MIN_STEP: f64 = 1e-10;
const TOL: f64 = 1e-10;

/// Sigmoid calibration `P(y = 1 | f) = 1 / (1 + exp(-(a * f + b)))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattScaling {
    a: f64,
    b: f64,
}

impl PlattScaling {
    /// Fit by Newton's method with backtracking, using Platt's smoothed
    /// targets `(n+ + 1) / (n+ + 2)` and `1 / (n- + 2)`.
    pub fn fit(decision: &[f64], positive: &[bool]) -> TabResult<Self> {
        if decision.len() != positive.len() {
            return Err(TabError::DimensionMismatch(format!(
                "{} decision values but {} labels",
                decision.len(),
                positive.len()
            )));
        }
        if decision.is_empty() {
            return Err(TabError::InsufficientData("no decision values to calibrate".into()));
        }

        let n_pos = positive.iter().filter(|&&p| p).count() as f64;
        let n_neg = decision.len() as f64 - n_pos;
        let hi = (n_pos + 1.0) / (n_pos + 2.0);
        let lo = 1.0 / (n_neg + 2.0);
        let targets: Vec<f64> = positive.iter().map(|&p| if p { hi } else { lo }).collect();

        let mut a = 0.0;
        let mut b = ((n_pos + 1.0) / (n_neg + 1.0)).ln();
        let mut loss = objective(decision, &targets, a, b);

        for _ in 0..MAX_ITER {
            let (mut ga, mut gb) = (0.0, 0.0);
            let (mut haa, mut hab, mut hbb) = (1e-12, 0.0, 1e-12);
            for (&f, &t) in decision.iter().zip(&targets) {
                let p = sigmoid(a * f + b);
                let d1 = p - t;
                let d2 = p * (1.0 - p);
                ga += f * d1;
                gb += d1;
                haa += f * f * d2;
                hab += f * d2;
                hbb += d2;
            }
            if ga.abs() < TOL && gb.abs() < TOL {
                break;
            }
            let det = haa * hbb - hab * hab;
            if det.abs() < f64::MIN_POSITIVE {
                break;
            }
            let da = (hbb * ga - hab * gb) / det;
            let db = (haa * gb - hab * ga) / det;

            let mut step = 1.0;
            let mut improved = false;
            while step >= MIN_STEP {
                let (na, nb) = (a - step * da, b - step * db);
                let new_loss = objective(decision, &targets, na, nb);
                if new_loss < loss + 1e-4 * step * (ga * -da + gb * -db) {
                    a = na;
                    b = nb;
                    loss = new_loss;
                    improved = true;
                    break;
                }
                step /= 2.0;
            }
            if !improved {
                break;
            }
        }
        Ok(PlattScaling { a, b })
    }

    pub fn probability(&self, decision: f64) -> f64 {
        sigmoid(self.a * decision + self.b)
    }

    pub fn parameters(&self) -> (f64, f64) {
        (self.a, self.b)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Cross-entropy against the smoothed targets, computed without overflow.
fn objective(decision: &[f64], targets: &[f64], a: f64, b: f64) -> f64 {
    decision
        .iter()
        .zip(targets)
        .map(|(&f, &t)| {
            let z = a * f + b;
            // log(1 + e^z) - t z
            let softplus = if z > 0.0 { z + (-z).exp().ln_1p() } else { z.exp().ln_1p() };
            softplus - t * z
        })
        .sum()
}

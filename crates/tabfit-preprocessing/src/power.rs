use serde::{Deserialize, Serialize};
use tabfit_core::{Column, ColumnKind, Dataset, TabResult};
use tracing::debug;

use crate::pipeline::{applied_column, Transformer};

/// Columns with fewer distinct training values are left untransformed (λ = 1).
pub const MIN_DISTINCT_FOR_POWER: usize = 5;

/// λ is searched in `[-LAMBDA_LIMIT, LAMBDA_LIMIT]`.
pub const LAMBDA_LIMIT: f64 = 5.0;

const LAMBDA_GRID_STEP: f64 = 0.1;

/// Yeo-Johnson transform of a single value.
pub fn yeo_johnson(x: f64, lambda: f64) -> f64 {
    if x >= 0.0 {
        if lambda.abs() < 1e-10 {
            x.ln_1p()
        } else {
            ((x + 1.0).powf(lambda) - 1.0) / lambda
        }
    } else if (lambda - 2.0).abs() < 1e-10 {
        -(-x).ln_1p()
    } else {
        -(((1.0 - x).powf(2.0 - lambda) - 1.0) / (2.0 - lambda))
    }
}

/// Profile log-likelihood of λ under a normal model for the transformed data.
fn log_likelihood(values: &[f64], lambda: f64) -> f64 {
    let n = values.len() as f64;
    let transformed: Vec<f64> = values.iter().map(|&x| yeo_johnson(x, lambda)).collect();
    let mean = transformed.iter().sum::<f64>() / n;
    let variance = transformed.iter().map(|t| (t - mean) * (t - mean)).sum::<f64>() / n;
    if !(variance > 0.0) || !variance.is_finite() {
        return f64::NEG_INFINITY;
    }
    let log_jacobian: f64 = values.iter().map(|&x| x.abs().ln_1p().copysign(x)).sum();
    -n / 2.0 * variance.ln() + (lambda - 1.0) * log_jacobian
}

/// Maximum-likelihood λ: a coarse grid over `[-5, 5]` (first maximum wins
/// ties) refined by golden-section search within one grid step.
pub fn estimate_lambda(values: &[f64]) -> f64 {
    let steps = (2.0 * LAMBDA_LIMIT / LAMBDA_GRID_STEP).round() as i64;
    let mut best = 1.0;
    let mut best_ll = log_likelihood(values, 1.0);
    for k in 0..=steps {
        let lambda = -LAMBDA_LIMIT + k as f64 * LAMBDA_GRID_STEP;
        let ll = log_likelihood(values, lambda);
        if ll > best_ll {
            best_ll = ll;
            best = lambda;
        }
    }

    let golden = (5.0_f64.sqrt() - 1.0) / 2.0;
    let mut lo = (best - LAMBDA_GRID_STEP).max(-LAMBDA_LIMIT);
    let mut hi = (best + LAMBDA_GRID_STEP).min(LAMBDA_LIMIT);
    for _ in 0..40 {
        let a = hi - golden * (hi - lo);
        let b = lo + golden * (hi - lo);
        if log_likelihood(values, a) >= log_likelihood(values, b) {
            hi = b;
        } else {
            lo = a;
        }
    }
    let refined = (lo + hi) / 2.0;
    if log_likelihood(values, refined) > best_ll {
        refined
    } else {
        best
    }
}

/// Per-column Yeo-Johnson power transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerTransformer {
    lambdas: Vec<(String, f64)>,
}

impl PowerTransformer {
    pub fn fit(train: &Dataset, columns: &[String]) -> TabResult<Self> {
        let mut lambdas = Vec::with_capacity(columns.len());
        for name in columns {
            let present = train.column(name)?.expect_numeric()?.iter().flatten().copied().collect::<Vec<_>>();
            let mut distinct = present.clone();
            distinct.sort_by(|a, b| a.total_cmp(b));
            distinct.dedup();
            let lambda = if distinct.len() < MIN_DISTINCT_FOR_POWER {
                debug!(column = %name, distinct = distinct.len(), "too few distinct values, power transform skipped");
                1.0
            } else {
                estimate_lambda(&present)
            };
            debug!(column = %name, lambda, "fitted Yeo-Johnson exponent");
            lambdas.push((name.clone(), lambda));
        }
        Ok(PowerTransformer { lambdas })
    }

    pub fn lambdas(&self) -> &[(String, f64)] {
        &self.lambdas
    }
}

impl Transformer for PowerTransformer {
    fn input_columns(&self) -> Vec<String> {
        self.lambdas.iter().map(|(name, _)| name.clone()).collect()
    }

    fn transform(&self, dataset: Dataset) -> TabResult<Dataset> {
        let mut out = dataset;
        for (name, lambda) in &self.lambdas {
            let values = applied_column(&out, name, Some(ColumnKind::Numeric))?.expect_numeric()?;
            let transformed = values.iter().map(|v| v.map(|x| yeo_johnson(x, *lambda))).collect();
            out = out.with_column(Column::numeric_opt(name.as_str(), transformed))?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn skewness(values: &[f64]) -> f64 {
        let n = values.len() as f64;
        let m = values.iter().sum::<f64>() / n;
        let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
        let m3 = values.iter().map(|v| (v - m).powi(3)).sum::<f64>() / n;
        m3 / m2.powf(1.5)
    }

    #[test]
    fn test_yeo_johnson_identity_at_one() {
        for x in [-3.0, -0.5, 0.0, 0.5, 7.0] {
            assert_abs_diff_eq!(yeo_johnson(x, 1.0), x, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_yeo_johnson_special_lambdas() {
        assert_abs_diff_eq!(yeo_johnson(3.0, 0.0), 4.0_f64.ln(), epsilon = 1e-12);
        assert_abs_diff_eq!(yeo_johnson(-3.0, 2.0), -(4.0_f64.ln()), epsilon = 1e-12);
    }

    #[test]
    fn test_power_transform_reduces_skew() {
        let values: Vec<f64> = (1..=60).map(|i| (i as f64 / 12.0).exp()).collect();
        let ds = Dataset::builder().numeric("x", values.clone()).build().unwrap();
        let pt = PowerTransformer::fit(&ds, &["x".to_string()]).unwrap();
        let lambda = pt.lambdas()[0].1;
        assert!(lambda < 1.0, "lambda = {}", lambda);
        let out = pt.transform(ds).unwrap();
        let transformed = out.column("x").unwrap().present_numeric();
        assert!(skewness(&transformed).abs() < skewness(&values).abs());
    }

    #[test]
    fn test_supports_negative_inputs_and_extrapolates() {
        let values: Vec<f64> = (0..40).map(|i| (i as f64 - 20.0).powi(3) / 100.0).collect();
        let ds = Dataset::builder().numeric("x", values).build().unwrap();
        let pt = PowerTransformer::fit(&ds, &["x".to_string()]).unwrap();
        let unseen = Dataset::builder().numeric("x", vec![-1e4, 1e4]).build().unwrap();
        let out = pt.transform(unseen).unwrap();
        assert!(out.column("x").unwrap().present_numeric().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_few_distinct_values_skipped() {
        let ds = Dataset::builder().numeric("x", vec![0.0, 1.0, 0.0, 1.0, 1.0, 0.0]).build().unwrap();
        let pt = PowerTransformer::fit(&ds, &["x".to_string()]).unwrap();
        assert_eq!(pt.lambdas()[0].1, 1.0);
    }
}

use serde::{Deserialize, Serialize};
use tabfit_core::{Column, ColumnKind, Dataset, TabError, TabResult};
use tracing::{debug, warn};

use crate::pipeline::{applied_column, Transformer};
use crate::stats;

/// Standard deviations at or below this are treated as zero.
pub const ZERO_VARIANCE_TOLERANCE: f64 = 1e-12;

/// Centering and scaling parameters for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnScale {
    pub column: String,
    pub mean: f64,
    pub sd: f64,
    /// Set when the training standard deviation was zero; the column is
    /// centered but left unscaled.
    pub zero_variance: bool,
}

/// Center by the training mean and scale by the training standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    scales: Vec<ColumnScale>,
}

impl Normalizer {
    pub fn fit(train: &Dataset, columns: &[String]) -> TabResult<Self> {
        let mut scales = Vec::with_capacity(columns.len());
        for name in columns {
            let present: Vec<f64> = train.column(name)?.expect_numeric()?.iter().flatten().copied().collect();
            if present.is_empty() {
                return Err(TabError::FitFailure(format!(
                    "cannot normalize `{}`: no values present in training data",
                    name
                )));
            }
            let mean = stats::mean(&present);
            let sd = stats::variance(&present).sqrt();
            let zero_variance = !(sd > ZERO_VARIANCE_TOLERANCE);
            if zero_variance {
                warn!(column = %name, "zero variance in training data, column left unscaled");
            } else {
                debug!(column = %name, mean, sd, "fitted normalizer");
            }
            scales.push(ColumnScale {
                column: name.clone(),
                mean,
                sd,
                zero_variance,
            });
        }
        Ok(Normalizer { scales })
    }

    pub fn scales(&self) -> &[ColumnScale] {
        &self.scales
    }

    /// Columns flagged as zero-variance during fit.
    pub fn zero_variance_columns(&self) -> Vec<&str> {
        self.scales
            .iter()
            .filter(|s| s.zero_variance)
            .map(|s| s.column.as_str())
            .collect()
    }
}

impl Transformer for Normalizer {
    fn input_columns(&self) -> Vec<String> {
        self.scales.iter().map(|s| s.column.clone()).collect()
    }

    fn transform(&self, dataset: Dataset) -> TabResult<Dataset> {
        let mut out = dataset;
        for scale in &self.scales {
            let values = applied_column(&out, &scale.column, Some(ColumnKind::Numeric))?.expect_numeric()?;
            let divisor = if scale.zero_variance { 1.0 } else { scale.sd };
            let scaled = values.iter().map(|v| v.map(|x| (x - scale.mean) / divisor)).collect();
            out = out.with_column(Column::numeric_opt(scale.column.as_str(), scaled))?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_normalizer_centers_and_scales() {
        let ds = Dataset::builder()
            .numeric("a", vec![1.0, 3.0, 5.0])
            .numeric("b", vec![2.0, 4.0, 6.0])
            .build()
            .unwrap();
        let cols = vec!["a".to_string(), "b".to_string()];
        let norm = Normalizer::fit(&ds, &cols).unwrap();
        let out = norm.transform(ds).unwrap();
        for name in &cols {
            let v = out.column(name).unwrap().present_numeric();
            assert_abs_diff_eq!(stats::mean(&v), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(stats::variance(&v), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_zero_variance_left_unscaled_and_flagged() {
        let ds = Dataset::builder().numeric("k", vec![7.0, 7.0, 7.0]).build().unwrap();
        let norm = Normalizer::fit(&ds, &["k".to_string()]).unwrap();
        assert_eq!(norm.zero_variance_columns(), vec!["k"]);
        let out = norm.transform(ds).unwrap();
        assert_eq!(out.column("k").unwrap().present_numeric(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_extrapolates_beyond_training_range() {
        let train = Dataset::builder().numeric("a", vec![0.0, 1.0, 2.0]).build().unwrap();
        let norm = Normalizer::fit(&train, &["a".to_string()]).unwrap();
        let test = Dataset::builder().numeric("a", vec![100.0, -50.0]).build().unwrap();
        let out = norm.transform(test).unwrap();
        assert_eq!(out.column("a").unwrap().present_numeric(), vec![99.0, -51.0]);
    }

    #[test]
    fn test_missing_column_at_apply_is_schema_mismatch() {
        let train = Dataset::builder().numeric("a", vec![0.0, 1.0]).build().unwrap();
        let norm = Normalizer::fit(&train, &["a".to_string()]).unwrap();
        let other = Dataset::builder().numeric("b", vec![0.0]).build().unwrap();
        assert!(matches!(
            norm.transform(other),
            Err(TabError::SchemaMismatch { .. })
        ));
    }
}

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tabfit_core::{Column, ColumnData, Dataset, TabError, TabResult};
use tabfit_metrics::{ConfusionMatrix, MetricInputs, MetricName};
use tabfit_model::{Hyperparameters, Mode, Model, ModelKind, OutputKind, Predictions};
use tabfit_preprocessing::Split;

use crate::state::HarnessState;
use crate::tuning::TuningResults;

/// Per-row truth and predictions for the assessed rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PredictionTable {
    Regression {
        /// Row index of each prediction in the evaluated dataset.
        rows: Vec<usize>,
        truth: Vec<f64>,
        predicted: Vec<f64>,
    },
    Classification {
        rows: Vec<usize>,
        truth: Vec<String>,
        predicted: Vec<String>,
        classes: Vec<String>,
        /// One row per observation, one column per entry of `classes`.
        probabilities: Vec<Vec<f64>>,
    },
}

fn numeric_truth(column: &Column) -> TabResult<Vec<f64>> {
    column
        .expect_numeric()?
        .iter()
        .map(|v| v.ok_or_else(|| TabError::schema_mismatch(column.name(), "target has missing values")))
        .collect()
}

fn label_truth(column: &Column) -> TabResult<Vec<String>> {
    column
        .expect_categorical()?
        .iter()
        .map(|v| {
            v.clone()
                .ok_or_else(|| TabError::schema_mismatch(column.name(), "target has missing values"))
        })
        .collect()
}

impl PredictionTable {
    /// Predict `features` with `model` and pair the output with `truth`, the
    /// untransformed target column of the same rows.
    pub fn build(model: &Model, features: &Dataset, truth: &Column, rows: Vec<usize>) -> TabResult<Self> {
        if truth.len() != features.n_rows() || rows.len() != features.n_rows() {
            return Err(TabError::DimensionMismatch(format!(
                "{} truth values and {} row ids for {} predicted rows",
                truth.len(),
                rows.len(),
                features.n_rows()
            )));
        }
        match model.mode() {
            Mode::Regression => {
                let predicted = match model.predict(features, OutputKind::NumericValue)? {
                    Predictions::NumericValue(v) => v,
                    _ => return Err(TabError::UnsupportedOutput("expected numeric predictions".into())),
                };
                Ok(PredictionTable::Regression {
                    rows,
                    truth: numeric_truth(truth)?,
                    predicted,
                })
            }
            Mode::Classification => {
                let predicted = match model.predict(features, OutputKind::ClassLabel)? {
                    Predictions::ClassLabel(v) => v,
                    _ => return Err(TabError::UnsupportedOutput("expected class labels".into())),
                };
                let (classes, probabilities) = match model.predict(features, OutputKind::ClassProbability)? {
                    Predictions::ClassProbability { classes, probabilities } => (classes, probabilities),
                    _ => return Err(TabError::UnsupportedOutput("expected class probabilities".into())),
                };
                Ok(PredictionTable::Classification {
                    rows,
                    truth: label_truth(truth)?,
                    predicted,
                    classes,
                    probabilities,
                })
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PredictionTable::Regression { rows, .. } | PredictionTable::Classification { rows, .. } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Probability of `class` per row; zero throughout when the model never
    /// saw that class.
    pub fn class_probability(&self, class: &str) -> Option<Vec<f64>> {
        match self {
            PredictionTable::Regression { .. } => None,
            PredictionTable::Classification { classes, probabilities, .. } => {
                Some(match classes.iter().position(|c| c == class) {
                    Some(j) => probabilities.iter().map(|row| row[j]).collect(),
                    None => vec![0.0; probabilities.len()],
                })
            }
        }
    }

    /// Compute every metric in `metrics`.
    pub fn score(
        &self,
        metrics: &[MetricName],
        positive_class: Option<&str>,
    ) -> TabResult<BTreeMap<MetricName, f64>> {
        let positive_probability = positive_class.and_then(|p| self.class_probability(p));
        let inputs = match self {
            PredictionTable::Regression { truth, predicted, .. } => MetricInputs::Regression {
                truth,
                estimate: predicted,
            },
            PredictionTable::Classification { truth, predicted, .. } => MetricInputs::Classification {
                truth,
                predicted,
                positive_probability: positive_probability.as_deref(),
                positive_class,
            },
        };
        metrics
            .iter()
            .map(|metric| metric.evaluate(&inputs).map(|value| (*metric, value)))
            .collect()
    }

    /// Truth-by-prediction counts; `None` for regression.
    ///
    /// Labels are the model's classes plus any truth value the model never
    /// saw, sorted, so every scored row is counted.
    pub fn confusion_matrix(&self) -> TabResult<Option<ConfusionMatrix>> {
        match self {
            PredictionTable::Regression { .. } => Ok(None),
            PredictionTable::Classification {
                truth,
                predicted,
                classes,
                ..
            } => {
                let labels: Vec<String> = classes
                    .iter()
                    .chain(truth)
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                Ok(Some(ConfusionMatrix::new(truth, predicted, &labels)?))
            }
        }
    }
}

/// The result of a harness run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model_kind: ModelKind,
    pub mode: Mode,
    pub split: Split,
    pub metrics: BTreeMap<MetricName, f64>,
    pub predictions: PredictionTable,
    pub confusion_matrix: Option<ConfusionMatrix>,
    pub tuning: Option<TuningResults>,
    /// Hyperparameters of the final model.
    pub hyperparameters: Hyperparameters,
    pub states: Vec<HarnessState>,
}

impl EvaluationReport {
    pub fn metric(&self, name: MetricName) -> Option<f64> {
        self.metrics.get(&name).copied()
    }

    pub fn to_json(&self) -> TabResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Mode implied by the kind of the target column.
pub fn target_mode(dataset: &Dataset, target: &str) -> TabResult<Mode> {
    Ok(match dataset.column(target)?.data() {
        ColumnData::Numeric(_) => Mode::Regression,
        ColumnData::Categorical(_) => Mode::Classification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn classification_table() -> PredictionTable {
        PredictionTable::Classification {
            rows: vec![0, 1, 2, 3],
            truth: ["yes", "no", "yes", "no"].iter().map(|s| s.to_string()).collect(),
            predicted: ["yes", "no", "no", "no"].iter().map(|s| s.to_string()).collect(),
            classes: vec!["no".into(), "yes".into()],
            probabilities: vec![vec![0.2, 0.8], vec![0.9, 0.1], vec![0.6, 0.4], vec![0.7, 0.3]],
        }
    }

    #[test]
    fn test_score_classification() {
        let table = classification_table();
        let scores = table
            .score(&[MetricName::Accuracy, MetricName::Recall, MetricName::RocAuc], Some("yes"))
            .unwrap();
        assert_abs_diff_eq!(scores[&MetricName::Accuracy], 0.75);
        assert_abs_diff_eq!(scores[&MetricName::Recall], 0.5);
        assert_abs_diff_eq!(scores[&MetricName::RocAuc], 1.0);
    }

    #[test]
    fn test_unseen_positive_class_has_zero_probability() {
        let table = classification_table();
        assert_eq!(table.class_probability("maybe"), Some(vec![0.0; 4]));
    }

    #[test]
    fn test_confusion_matrix_orientation() {
        let cm = classification_table().confusion_matrix().unwrap().unwrap();
        assert_eq!(cm.labels, vec!["no", "yes"]);
        assert_eq!(cm.get("yes", "no"), 1);
        assert_eq!(cm.get("no", "no"), 2);
        assert_eq!(cm.total(), 4);
    }

    #[test]
    fn test_confusion_matrix_counts_classes_only_in_truth() {
        let table = PredictionTable::Classification {
            rows: vec![0, 1, 2],
            truth: vec!["a".into(), "b".into(), "c".into()],
            predicted: vec!["a".into(), "b".into(), "a".into()],
            classes: vec!["a".into(), "b".into()],
            probabilities: vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.6, 0.4]],
        };
        let cm = table.confusion_matrix().unwrap().unwrap();
        assert_eq!(cm.labels, vec!["a", "b", "c"]);
        assert_eq!(cm.get("c", "a"), 1);
        assert_eq!(cm.total(), table.len());
        let accuracy = table.score(&[MetricName::Accuracy], None).unwrap()[&MetricName::Accuracy];
        assert_abs_diff_eq!(accuracy, 2.0 / 3.0);
    }

    #[test]
    fn test_regression_metrics_rejected_for_labels() {
        let table = classification_table();
        assert!(matches!(
            table.score(&[MetricName::Rmse], None),
            Err(TabError::UnsupportedOutput(_))
        ));
    }
}

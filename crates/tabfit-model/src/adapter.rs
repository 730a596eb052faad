//! The Model Adapter: one `fit`/`predict` contract over every model family.
//!
//! The adapter validates hyperparameters, shapes a dataset into a feature
//! matrix and target vector, delegates to the model crates, and shapes their
//! outputs back into labelled predictions.

use serde::{Deserialize, Serialize};
use tabfit_core::{ColumnData, Dataset, Matrix, TabError, TabResult};
use tabfit_linear::{LinearRegression, LogisticRegression};
use tabfit_neighbors::{argmax, KnnClassifier, KnnRegressor};
use tabfit_svm::RbfSvc;
use tracing::debug;

use crate::hyperparameters::{Hyperparameters, Resolved};
use crate::kind::{Mode, ModelKind, OutputKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "estimator", rename_all = "snake_case")]
enum Estimator {
    LinearRegression(LinearRegression),
    LogisticRegression(LogisticRegression),
    KnnClassifier(KnnClassifier),
    KnnRegressor(KnnRegressor),
    SvmRbf(RbfSvc),
}

/// A fitted model. Immutable once created; safe to share across threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    kind: ModelKind,
    mode: Mode,
    target: String,
    features: Vec<String>,
    /// Class vocabulary in sorted order; empty for regression.
    classes: Vec<String>,
    hyperparameters: Hyperparameters,
    estimator: Estimator,
}

/// Output of [`predict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predictions {
    NumericValue(Vec<f64>),
    ClassLabel(Vec<String>),
    /// One row per observation, one column per class in `classes` order.
    ClassProbability {
        classes: Vec<String>,
        probabilities: Vec<Vec<f64>>,
    },
}

impl Predictions {
    pub fn len(&self) -> usize {
        match self {
            Predictions::NumericValue(v) => v.len(),
            Predictions::ClassLabel(v) => v.len(),
            Predictions::ClassProbability { probabilities, .. } => probabilities.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            Predictions::NumericValue(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_labels(&self) -> Option<&[String]> {
        match self {
            Predictions::ClassLabel(v) => Some(v),
            _ => None,
        }
    }

    /// Probability column for one class.
    pub fn class_column(&self, class: &str) -> Option<Vec<f64>> {
        match self {
            Predictions::ClassProbability { classes, probabilities } => {
                let j = classes.iter().position(|c| c == class)?;
                Some(probabilities.iter().map(|row| row[j]).collect())
            }
            _ => None,
        }
    }
}

fn target_values(train: &Dataset, target: &str) -> TabResult<ColumnData> {
    let col = train.column(target)?;
    let missing = col.missing_count();
    if missing > 0 {
        return Err(TabError::schema_mismatch(
            target,
            format!("target has {} missing values", missing),
        ));
    }
    Ok(col.data().clone())
}

/// Fit `kind` on `train`, predicting `target` from every other column.
///
/// Every predictor must be numeric with no missing values.
pub fn fit(
    kind: ModelKind,
    hyperparameters: &Hyperparameters,
    train: &Dataset,
    target: &str,
) -> TabResult<Model> {
    let target_data = target_values(train, target)?;
    let mode = match target_data {
        ColumnData::Numeric(_) => Mode::Regression,
        ColumnData::Categorical(_) => Mode::Classification,
    };
    if !kind.supports(mode) {
        return Err(TabError::invalid_argument(
            "model_kind",
            format!("{} does not support {} on target `{}`", kind, mode, target),
        ));
    }

    let features: Vec<String> = train
        .column_names()
        .into_iter()
        .filter(|c| c != target)
        .collect();
    if features.is_empty() {
        return Err(TabError::invalid_argument("features", "no predictor columns besides the target"));
    }
    let x = train.numeric_matrix(&features)?;
    let params = Resolved::new(kind, hyperparameters, train.n_rows())?;

    let (classes, estimator) = match target_data {
        ColumnData::Numeric(values) => {
            let y: Vec<f64> = values.into_iter().flatten().collect();
            (Vec::new(), fit_regressor(params, &x, &y)?)
        }
        ColumnData::Categorical(values) => {
            let classes = train.class_labels(target)?;
            let y: Vec<usize> = values
                .iter()
                .flatten()
                .filter_map(|v| classes.iter().position(|c| c == v))
                .collect();
            if matches!(kind, ModelKind::LogisticRegression | ModelKind::SvmRbf) && classes.len() != 2 {
                return Err(TabError::invalid_argument(
                    "target_column",
                    format!(
                        "{} needs exactly two classes in `{}`, found {}",
                        kind,
                        target,
                        classes.len()
                    ),
                ));
            }
            let estimator = fit_classifier(params, &x, &y, classes.len())?;
            (classes, estimator)
        }
    };

    debug!(%kind, %mode, target, n_features = features.len(), n = train.n_rows(), "fitted model");
    Ok(Model {
        kind,
        mode,
        target: target.to_string(),
        features,
        classes,
        hyperparameters: hyperparameters.clone(),
        estimator,
    })
}

fn fit_regressor(params: Resolved, x: &Matrix, y: &[f64]) -> TabResult<Estimator> {
    Ok(match params {
        Resolved::LinearRegression => Estimator::LinearRegression(LinearRegression::fit(x, y)?),
        Resolved::Knn { neighbors, weight_func } => {
            Estimator::KnnRegressor(KnnRegressor::fit(x, y, neighbors, weight_func)?)
        }
        other => {
            return Err(TabError::FitFailure(format!(
                "{:?} cannot fit a numeric target",
                other
            )))
        }
    })
}

fn fit_classifier(params: Resolved, x: &Matrix, y: &[usize], n_classes: usize) -> TabResult<Estimator> {
    Ok(match params {
        Resolved::LogisticRegression { penalty } => {
            let y01: Vec<f64> = y.iter().map(|&c| c as f64).collect();
            Estimator::LogisticRegression(LogisticRegression::fit(x, &y01, penalty)?)
        }
        Resolved::SvmRbf { cost, sigma } => {
            let positive: Vec<bool> = y.iter().map(|&c| c == 1).collect();
            Estimator::SvmRbf(RbfSvc::fit(x, &positive, cost, sigma)?)
        }
        Resolved::Knn { neighbors, weight_func } => {
            Estimator::KnnClassifier(KnnClassifier::fit(x, y, n_classes, neighbors, weight_func)?)
        }
        Resolved::LinearRegression => {
            return Err(TabError::FitFailure(
                "linear_regression cannot fit a categorical target".into(),
            ))
        }
    })
}

fn binary_rows(p1: Vec<f64>) -> Vec<Vec<f64>> {
    p1.into_iter().map(|p| vec![1.0 - p, p]).collect()
}

/// Predict on `data`, which must contain every feature column the model was
/// fitted on. The target column need not be present.
pub fn predict(model: &Model, data: &Dataset, output: OutputKind) -> TabResult<Predictions> {
    match (model.mode, output) {
        (Mode::Regression, OutputKind::NumericValue) => {}
        (Mode::Classification, OutputKind::ClassLabel | OutputKind::ClassProbability) => {}
        (mode, output) => {
            return Err(TabError::UnsupportedOutput(format!(
                "{} is not available from a {} {} model",
                output, mode, model.kind
            )))
        }
    }
    let x = data.numeric_matrix(&model.features)?;

    if let (Estimator::SvmRbf(m), OutputKind::ClassLabel) = (&model.estimator, output) {
        return Ok(Predictions::ClassLabel(
            m.predict(&x)?
                .into_iter()
                .map(|positive| model.classes[usize::from(positive)].clone())
                .collect(),
        ));
    }
    let probabilities = match &model.estimator {
        Estimator::LinearRegression(m) => return Ok(Predictions::NumericValue(m.predict(&x)?)),
        Estimator::KnnRegressor(m) => return Ok(Predictions::NumericValue(m.predict(&x)?)),
        Estimator::LogisticRegression(m) => binary_rows(m.predict_proba(&x)?),
        Estimator::SvmRbf(m) => binary_rows(m.predict_proba(&x)?),
        Estimator::KnnClassifier(m) => m.predict_proba(&x)?,
    };

    Ok(match output {
        OutputKind::ClassLabel => Predictions::ClassLabel(
            probabilities
                .iter()
                .map(|row| model.classes[argmax(row)].clone())
                .collect(),
        ),
        _ => Predictions::ClassProbability {
            classes: model.classes.clone(),
            probabilities,
        },
    })
}

impl Model {
    pub fn predict(&self, data: &Dataset, output: OutputKind) -> TabResult<Predictions> {
        predict(self, data, output)
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn feature_names(&self) -> &[String] {
        &self.features
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Hyperparameters exactly as supplied to [`fit`].
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }
}

//! The fixed catalog of named metrics and how each is computed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tabfit_core::{TabError, TabResult};

use crate::classification::{accuracy, roc_auc, BinaryCounts};
use crate::regression::{mae, rmse, rsq};

/// Whether larger or smaller values of a metric are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Maximize,
    Minimize,
}

impl Direction {
    /// True when `candidate` is strictly better than `incumbent`.
    pub fn improves(&self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Direction::Maximize => candidate > incumbent,
            Direction::Minimize => candidate < incumbent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MetricName {
    Accuracy,
    Precision,
    Recall,
    Specificity,
    F1,
    RocAuc,
    Rmse,
    Rsq,
    Mae,
}

impl MetricName {
    pub const ALL: [MetricName; 9] = [
        MetricName::Accuracy,
        MetricName::Precision,
        MetricName::Recall,
        MetricName::Specificity,
        MetricName::F1,
        MetricName::RocAuc,
        MetricName::Rmse,
        MetricName::Rsq,
        MetricName::Mae,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::Accuracy => "accuracy",
            MetricName::Precision => "precision",
            MetricName::Recall => "recall",
            MetricName::Specificity => "specificity",
            MetricName::F1 => "f1",
            MetricName::RocAuc => "roc_auc",
            MetricName::Rmse => "rmse",
            MetricName::Rsq => "rsq",
            MetricName::Mae => "mae",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            MetricName::Rmse | MetricName::Mae => Direction::Minimize,
            _ => Direction::Maximize,
        }
    }

    pub fn is_classification(&self) -> bool {
        !matches!(self, MetricName::Rmse | MetricName::Rsq | MetricName::Mae)
    }

    /// Metrics defined relative to a named positive class.
    pub fn needs_positive_class(&self) -> bool {
        matches!(
            self,
            MetricName::Precision
                | MetricName::Recall
                | MetricName::Specificity
                | MetricName::F1
                | MetricName::RocAuc
        )
    }

    /// Compute this metric, checking it applies to `inputs`.
    pub fn evaluate(&self, inputs: &MetricInputs<'_>) -> TabResult<f64> {
        match *inputs {
            MetricInputs::Regression { truth, estimate } => match self {
                MetricName::Rmse => rmse(truth, estimate),
                MetricName::Rsq => rsq(truth, estimate),
                MetricName::Mae => mae(truth, estimate),
                other => Err(TabError::UnsupportedOutput(format!(
                    "`{}` is a classification metric but the model is a regression model",
                    other
                ))),
            },
            MetricInputs::Classification {
                truth,
                predicted,
                positive_probability,
                positive_class,
            } => {
                if !self.is_classification() {
                    return Err(TabError::UnsupportedOutput(format!(
                        "`{}` is a regression metric but the model is a classifier",
                        self
                    )));
                }
                if *self == MetricName::Accuracy {
                    return accuracy(truth, predicted);
                }
                let positive = positive_class.ok_or_else(|| {
                    TabError::invalid_argument(
                        "positive_class",
                        format!("metric `{}` needs a positive class", self),
                    )
                })?;
                if *self == MetricName::RocAuc {
                    let scores = positive_probability.ok_or_else(|| {
                        TabError::UnsupportedOutput("roc_auc needs class probabilities".into())
                    })?;
                    return roc_auc(truth, scores, positive);
                }
                let counts = BinaryCounts::new(truth, predicted, positive)?;
                Ok(match self {
                    MetricName::Precision => counts.precision(),
                    MetricName::Recall => counts.recall(),
                    MetricName::Specificity => counts.specificity(),
                    _ => counts.f1(),
                })
            }
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricName {
    type Err = TabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricName::ALL
            .iter()
            .find(|m| m.as_str() == s)
            .copied()
            .ok_or_else(|| TabError::invalid_argument("metrics", format!("unknown metric `{}`", s)))
    }
}

impl TryFrom<String> for MetricName {
    type Error = TabError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MetricName> for String {
    fn from(m: MetricName) -> Self {
        m.as_str().to_string()
    }
}

/// Observed and predicted values a metric is computed from.
#[derive(Debug, Clone, Copy)]
pub enum MetricInputs<'a> {
    Regression {
        truth: &'a [f64],
        estimate: &'a [f64],
    },
    Classification {
        truth: &'a [String],
        predicted: &'a [String],
        /// Probability of `positive_class` per row, when available.
        positive_probability: Option<&'a [f64]>,
        positive_class: Option<&'a str>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_and_display() {
        for m in MetricName::ALL {
            assert_eq!(m.as_str().parse::<MetricName>().unwrap(), m);
        }
        assert!(matches!(
            "logloss".parse::<MetricName>(),
            Err(TabError::InvalidArgument { .. })
        ));
        let parsed: Vec<MetricName> = serde_json::from_str(r#"["roc_auc", "rmse"]"#).unwrap();
        assert_eq!(parsed, vec![MetricName::RocAuc, MetricName::Rmse]);
    }

    #[test]
    fn test_directions() {
        assert_eq!(MetricName::Rmse.direction(), Direction::Minimize);
        assert_eq!(MetricName::Rsq.direction(), Direction::Maximize);
        assert!(Direction::Minimize.improves(1.0, 2.0));
        assert!(!Direction::Maximize.improves(1.0, 1.0));
    }

    #[test]
    fn test_classification_metric_on_regression() {
        let inputs = MetricInputs::Regression {
            truth: &[1.0, 2.0],
            estimate: &[1.0, 2.5],
        };
        assert!(matches!(
            MetricName::RocAuc.evaluate(&inputs),
            Err(TabError::UnsupportedOutput(_))
        ));
        assert!(MetricName::Rmse.evaluate(&inputs).is_ok());
    }

    #[test]
    fn test_positive_class_required() {
        let truth = strings(&["a", "b"]);
        let inputs = MetricInputs::Classification {
            truth: &truth,
            predicted: &truth,
            positive_probability: None,
            positive_class: None,
        };
        assert_eq!(MetricName::Accuracy.evaluate(&inputs).unwrap(), 1.0);
        assert!(matches!(
            MetricName::F1.evaluate(&inputs),
            Err(TabError::InvalidArgument { .. })
        ));
        assert!(matches!(
            MetricName::Mae.evaluate(&inputs),
            Err(TabError::UnsupportedOutput(_))
        ));
    }
}

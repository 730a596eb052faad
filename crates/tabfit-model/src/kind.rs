use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tabfit_core::TabError;

/// The closed set of model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelKind {
    LinearRegression,
    LogisticRegression,
    Knn,
    SvmRbf,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::LinearRegression,
        ModelKind::LogisticRegression,
        ModelKind::Knn,
        ModelKind::SvmRbf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "linear_regression",
            ModelKind::LogisticRegression => "logistic_regression",
            ModelKind::Knn => "knn",
            ModelKind::SvmRbf => "svm_rbf",
        }
    }

    /// Whether this family can be fitted in `mode`.
    pub fn supports(&self, mode: Mode) -> bool {
        match self {
            ModelKind::LinearRegression => mode == Mode::Regression,
            ModelKind::LogisticRegression | ModelKind::SvmRbf => mode == Mode::Classification,
            ModelKind::Knn => true,
        }
    }

    /// Hyperparameter names this family accepts.
    pub fn hyperparameter_names(&self) -> &'static [&'static str] {
        match self {
            ModelKind::LinearRegression => &[],
            ModelKind::LogisticRegression => &["penalty"],
            ModelKind::Knn => &["neighbors", "weight_func"],
            ModelKind::SvmRbf => &["cost", "rbf_sigma"],
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = TabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| TabError::invalid_argument("model_kind", format!("unknown model kind `{}`", s)))
    }
}

impl TryFrom<String> for ModelKind {
    type Error = TabError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ModelKind> for String {
    fn from(kind: ModelKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Regression for a numeric target, classification for a categorical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Regression,
    Classification,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Regression => write!(f, "regression"),
            Mode::Classification => write!(f, "classification"),
        }
    }
}

/// What `predict` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    ClassLabel,
    ClassProbability,
    NumericValue,
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::ClassLabel => write!(f, "class_label"),
            OutputKind::ClassProbability => write!(f, "class_probability"),
            OutputKind::NumericValue => write!(f, "numeric_value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_names() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.to_string().parse::<ModelKind>().unwrap(), kind);
        }
        assert!(matches!(
            "random_forest".parse::<ModelKind>(),
            Err(TabError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_supported_modes() {
        assert!(!ModelKind::LinearRegression.supports(Mode::Classification));
        assert!(!ModelKind::SvmRbf.supports(Mode::Regression));
        assert!(ModelKind::Knn.supports(Mode::Regression));
        assert!(ModelKind::Knn.supports(Mode::Classification));
    }
}

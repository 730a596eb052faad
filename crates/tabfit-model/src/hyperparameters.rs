use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tabfit_core::{TabError, TabResult};
use tabfit_neighbors::WeightFunction;

use crate::kind::ModelKind;

/// A single hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HyperValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for HyperValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HyperValue::Number(v) => write!(f, "{}", v),
            HyperValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for HyperValue {
    fn from(v: f64) -> Self {
        HyperValue::Number(v)
    }
}

impl From<usize> for HyperValue {
    fn from(v: usize) -> Self {
        HyperValue::Number(v as f64)
    }
}

impl From<&str> for HyperValue {
    fn from(s: &str) -> Self {
        HyperValue::Text(s.to_string())
    }
}

/// Named hyperparameter values, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hyperparameters(BTreeMap<String, HyperValue>);

impl Hyperparameters {
    pub fn new() -> Self {
        Hyperparameters(BTreeMap::new())
    }

    pub fn with(mut self, name: &str, value: impl Into<HyperValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<HyperValue>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&HyperValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HyperValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A copy of `self` with every value of `overrides` applied on top.
    pub fn merged(&self, overrides: &Hyperparameters) -> Hyperparameters {
        let mut out = self.clone();
        for (name, value) in overrides.iter() {
            out.0.insert(name.clone(), value.clone());
        }
        out
    }

    fn number(&self, name: &str) -> TabResult<Option<f64>> {
        match self.get(name) {
            None => Ok(None),
            Some(HyperValue::Number(v)) => Ok(Some(*v)),
            Some(other) => Err(TabError::invalid_hyperparameter(name, other, "expected a number")),
        }
    }

    fn text(&self, name: &str) -> TabResult<Option<&str>> {
        match self.get(name) {
            None => Ok(None),
            Some(HyperValue::Text(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(TabError::invalid_hyperparameter(name, other, "expected a string")),
        }
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

impl<S: Into<String>, V: Into<HyperValue>> FromIterator<(S, V)> for Hyperparameters {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        Hyperparameters(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Hyperparameters checked against one model family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Resolved {
    LinearRegression,
    LogisticRegression { penalty: f64 },
    Knn { neighbors: usize, weight_func: WeightFunction },
    SvmRbf { cost: f64, sigma: f64 },
}

impl Resolved {
    /// Validate `params` for `kind` given the number of training rows.
    pub(crate) fn new(kind: ModelKind, params: &Hyperparameters, n_train: usize) -> TabResult<Self> {
        let allowed = kind.hyperparameter_names();
        if let Some((name, value)) = params.iter().find(|(n, _)| !allowed.contains(&n.as_str())) {
            return Err(TabError::invalid_hyperparameter(
                name.as_str(),
                value,
                format!("not a hyperparameter of {}", kind),
            ));
        }

        match kind {
            ModelKind::LinearRegression => Ok(Resolved::LinearRegression),
            ModelKind::LogisticRegression => {
                let penalty = params.number("penalty")?.unwrap_or(0.0);
                if !(penalty >= 0.0) || !penalty.is_finite() {
                    return Err(TabError::invalid_hyperparameter("penalty", penalty, "must be >= 0"));
                }
                Ok(Resolved::LogisticRegression { penalty })
            }
            ModelKind::Knn => {
                let k = params
                    .number("neighbors")?
                    .ok_or_else(|| TabError::invalid_hyperparameter("neighbors", "none", "is required"))?;
                if k.fract() != 0.0 || k < 1.0 || k > n_train as f64 {
                    return Err(TabError::invalid_hyperparameter(
                        "neighbors",
                        k,
                        format!("must be a whole number between 1 and {} (training rows)", n_train),
                    ));
                }
                let weight_func = match params.text("weight_func")? {
                    Some(s) => s.parse()?,
                    None => WeightFunction::Rectangular,
                };
                Ok(Resolved::Knn {
                    neighbors: k as usize,
                    weight_func,
                })
            }
            ModelKind::SvmRbf => {
                let cost = params.number("cost")?.unwrap_or(1.0);
                let sigma = params
                    .number("rbf_sigma")?
                    .ok_or_else(|| TabError::invalid_hyperparameter("rbf_sigma", "none", "is required"))?;
                if !(cost > 0.0) || !cost.is_finite() {
                    return Err(TabError::invalid_hyperparameter("cost", cost, "must be > 0"));
                }
                if !(sigma > 0.0) || !sigma.is_finite() {
                    return Err(TabError::invalid_hyperparameter("rbf_sigma", sigma, "must be > 0"));
                }
                Ok(Resolved::SvmRbf { cost, sigma })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let hp: Hyperparameters = serde_json::from_str(r#"{"neighbors": 5, "weight_func": "inverse"}"#).unwrap();
        assert_eq!(hp.get("neighbors"), Some(&HyperValue::Number(5.0)));
        assert_eq!(hp.get("weight_func"), Some(&HyperValue::Text("inverse".into())));
        assert_eq!(hp.to_string(), "{neighbors=5, weight_func=inverse}");
    }

    #[test]
    fn test_merged_overrides() {
        let base = Hyperparameters::new().with("cost", 1.0).with("rbf_sigma", 0.1);
        let over = Hyperparameters::new().with("cost", 4.0);
        let merged = base.merged(&over);
        assert_eq!(merged.get("cost"), Some(&HyperValue::Number(4.0)));
        assert_eq!(merged.get("rbf_sigma"), Some(&HyperValue::Number(0.1)));
    }

    #[test]
    fn test_knn_bounds() {
        let ok = Hyperparameters::new().with("neighbors", 10usize);
        assert_eq!(
            Resolved::new(ModelKind::Knn, &ok, 10).unwrap(),
            Resolved::Knn {
                neighbors: 10,
                weight_func: WeightFunction::Rectangular
            }
        );
        for bad in [0.0, 11.0, 2.5] {
            let hp = Hyperparameters::new().with("neighbors", bad);
            assert!(matches!(
                Resolved::new(ModelKind::Knn, &hp, 10),
                Err(TabError::InvalidHyperparameter { .. })
            ));
        }
    }

    #[test]
    fn test_svm_constraints() {
        let hp = Hyperparameters::new().with("cost", 0.0).with("rbf_sigma", 1.0);
        assert!(matches!(
            Resolved::new(ModelKind::SvmRbf, &hp, 10),
            Err(TabError::InvalidHyperparameter { .. })
        ));
        let hp = Hyperparameters::new().with("cost", 1.0).with("rbf_sigma", -0.5);
        assert!(matches!(
            Resolved::new(ModelKind::SvmRbf, &hp, 10),
            Err(TabError::InvalidHyperparameter { .. })
        ));
    }

    #[test]
    fn test_unknown_name_rejected() {
        let hp = Hyperparameters::new().with("neighbors", 3usize);
        let err = Resolved::new(ModelKind::LinearRegression, &hp, 10).unwrap_err();
        assert!(matches!(err, TabError::InvalidHyperparameter { ref name, .. } if name == "neighbors"));
    }
}

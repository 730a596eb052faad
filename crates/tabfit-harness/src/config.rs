use serde::{Deserialize, Serialize};
use tabfit_core::{TabError, TabResult};
use tabfit_metrics::MetricName;
use tabfit_model::{Hyperparameters, Mode, ModelKind};
use tabfit_preprocessing::{PipelineSpec, DEFAULT_STRATA_BINS};

use crate::grid::HyperparameterGrid;

fn default_strata_bins() -> usize {
    DEFAULT_STRATA_BINS
}

/// Everything one harness run needs. Nothing is read from global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    pub train_fraction: f64,
    pub seed: u64,
    #[serde(default)]
    pub stratify_column: Option<String>,
    pub target_column: String,
    /// Class treated as positive by precision, recall, specificity, f1 and roc_auc.
    #[serde(default)]
    pub positive_class: Option<String>,
    #[serde(default)]
    pub pipeline: PipelineSpec,
    pub model_kind: ModelKind,
    /// Fixed hyperparameters; a tuned combination is applied on top.
    #[serde(default)]
    pub hyperparameters: Hyperparameters,
    #[serde(default)]
    pub hyperparameter_grid: Option<HyperparameterGrid>,
    #[serde(default)]
    pub cv_folds: Option<usize>,
    /// Metric the grid is tuned on; the first of `metrics` when absent.
    #[serde(default)]
    pub tuning_metric: Option<MetricName>,
    pub metrics: Vec<MetricName>,
    #[serde(default = "default_strata_bins")]
    pub strata_bins: usize,
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
    #[serde(default)]
    pub parallel: bool,
}

impl HarnessConfig {
    /// A run with no preprocessing, scoring nothing yet.
    pub fn new(model_kind: ModelKind, target_column: &str, train_fraction: f64, seed: u64) -> Self {
        HarnessConfig {
            train_fraction,
            seed,
            stratify_column: None,
            target_column: target_column.to_string(),
            positive_class: None,
            pipeline: PipelineSpec::new(),
            model_kind,
            hyperparameters: Hyperparameters::new(),
            hyperparameter_grid: None,
            cv_folds: None,
            tuning_metric: None,
            metrics: Vec::new(),
            strata_bins: DEFAULT_STRATA_BINS,
            time_limit_ms: None,
            parallel: false,
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> TabResult<Self> {
        let config: HarnessConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_stratify_column(mut self, column: &str) -> Self {
        self.stratify_column = Some(column.to_string());
        self
    }

    pub fn with_positive_class(mut self, class: &str) -> Self {
        self.positive_class = Some(class.to_string());
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineSpec) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_hyperparameters(mut self, hyperparameters: Hyperparameters) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }

    pub fn with_grid(mut self, grid: HyperparameterGrid, cv_folds: usize) -> Self {
        self.hyperparameter_grid = Some(grid);
        self.cv_folds = Some(cv_folds);
        self
    }

    pub fn with_cv_folds(mut self, cv_folds: usize) -> Self {
        self.cv_folds = Some(cv_folds);
        self
    }

    pub fn with_tuning_metric(mut self, metric: MetricName) -> Self {
        self.tuning_metric = Some(metric);
        self
    }

    pub fn with_metrics(mut self, metrics: impl IntoIterator<Item = MetricName>) -> Self {
        self.metrics = metrics.into_iter().collect();
        self
    }

    pub fn with_strata_bins(mut self, bins: usize) -> Self {
        self.strata_bins = bins;
        self
    }

    pub fn with_time_limit_ms(mut self, ms: u64) -> Self {
        self.time_limit_ms = Some(ms);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The metric tuning compares combinations on.
    pub fn tuning_metric(&self) -> Option<MetricName> {
        self.tuning_metric.or_else(|| self.metrics.first().copied())
    }

    /// Check every field that can be checked without the data.
    pub fn validate(&self) -> TabResult<()> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(TabError::invalid_argument(
                "train_fraction",
                format!("{} is outside the open interval (0, 1)", self.train_fraction),
            ));
        }
        if self.target_column.is_empty() {
            return Err(TabError::invalid_argument("target_column", "must not be empty"));
        }
        if self.metrics.is_empty() {
            return Err(TabError::invalid_argument("metrics", "at least one metric is required"));
        }
        if self.strata_bins == 0 {
            return Err(TabError::invalid_argument("strata_bins", "must be at least 1"));
        }
        if let Some(folds) = self.cv_folds {
            if folds < 2 {
                return Err(TabError::invalid_argument(
                    "cv_folds",
                    format!("{} folds requested, at least 2 are needed", folds),
                ));
            }
        }
        if let Some(grid) = &self.hyperparameter_grid {
            if self.cv_folds.is_none() {
                return Err(TabError::invalid_argument(
                    "cv_folds",
                    "a hyperparameter grid is tuned by cross-validation and needs cv_folds",
                ));
            }
            grid.validate()?;
            let allowed = self.model_kind.hyperparameter_names();
            if let Some((name, _)) = grid.axes().iter().find(|(n, _)| !allowed.contains(&n.as_str())) {
                return Err(TabError::invalid_hyperparameter(
                    name.as_str(),
                    "grid",
                    format!("not a hyperparameter of {}", self.model_kind),
                ));
            }
        }

        // A family fitting only one mode fixes which metrics make sense.
        let modes: Vec<Mode> = [Mode::Regression, Mode::Classification]
            .into_iter()
            .filter(|m| self.model_kind.supports(*m))
            .collect();
        if let [mode] = modes.as_slice() {
            self.check_metrics(*mode)?;
        }
        Ok(())
    }

    /// Check the requested metrics against the mode of the model.
    pub fn check_metrics(&self, mode: Mode) -> TabResult<()> {
        let requested = self.metrics.iter().chain(self.tuning_metric.iter());
        for metric in requested {
            let is_classifier = mode == Mode::Classification;
            if metric.is_classification() != is_classifier {
                return Err(TabError::UnsupportedOutput(format!(
                    "metric `{}` cannot be computed for a {} {} model",
                    metric, mode, self.model_kind
                )));
            }
            if metric.needs_positive_class() && self.positive_class.is_none() {
                return Err(TabError::invalid_argument(
                    "positive_class",
                    format!("metric `{}` needs a positive class", metric),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let json = r#"{
            "train_fraction": 0.75,
            "seed": 314,
            "stratify_column": "class",
            "target_column": "class",
            "positive_class": "yes",
            "pipeline": [{"kind": "normalize", "columns": "all_numeric_predictors"}],
            "model_kind": "knn",
            "hyperparameter_grid": {"neighbors": [5, 10, 50]},
            "cv_folds": 5,
            "metrics": ["roc_auc", "accuracy"]
        }"#;
        let config = HarnessConfig::from_json(json).unwrap();
        assert_eq!(config.model_kind, ModelKind::Knn);
        assert_eq!(config.strata_bins, 4);
        assert!(!config.parallel);
        assert_eq!(config.tuning_metric(), Some(MetricName::RocAuc));
        assert_eq!(config.hyperparameter_grid.unwrap().n_combinations(), 3);
    }

    #[test]
    fn test_split_settings_are_explicit() {
        let config = HarnessConfig::new(ModelKind::LinearRegression, "y", 0.6, 42);
        assert_eq!(config.train_fraction, 0.6);
        assert_eq!(config.seed, 42);

        let without_seed = r#"{"train_fraction": 0.5, "target_column": "y",
            "model_kind": "linear_regression", "metrics": ["rmse"]}"#;
        assert!(matches!(HarnessConfig::from_json(without_seed), Err(TabError::Serialization(_))));
        let without_fraction = r#"{"seed": 1, "target_column": "y",
            "model_kind": "linear_regression", "metrics": ["rmse"]}"#;
        assert!(matches!(HarnessConfig::from_json(without_fraction), Err(TabError::Serialization(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = r#"{"train_fraction": 0.5, "seed": 1, "target_column": "y",
            "model_kind": "linear_regression", "metrics": ["rmse"], "folds": 3}"#;
        assert!(matches!(HarnessConfig::from_json(json), Err(TabError::Serialization(_))));
    }

    #[test]
    fn test_train_fraction_range() {
        for bad in [0.0, 1.0, -0.5, f64::NAN] {
            let config = HarnessConfig::new(ModelKind::LinearRegression, "y", bad, 0)
                .with_metrics([MetricName::Rmse]);
            assert!(matches!(config.validate(), Err(TabError::InvalidArgument { .. })));
        }
    }

    #[test]
    fn test_roc_auc_on_regression_model() {
        let config = HarnessConfig::new(ModelKind::LinearRegression, "y", 0.75, 0)
            .with_positive_class("yes")
            .with_metrics([MetricName::RocAuc]);
        assert!(matches!(config.validate(), Err(TabError::UnsupportedOutput(_))));
    }

    #[test]
    fn test_positive_class_required() {
        let config = HarnessConfig::new(ModelKind::LogisticRegression, "class", 0.75, 0).with_metrics([MetricName::F1]);
        assert!(matches!(
            config.validate(),
            Err(TabError::InvalidArgument { ref field, .. }) if field == "positive_class"
        ));
    }

    #[test]
    fn test_grid_needs_folds_and_known_names() {
        let mut config = HarnessConfig::new(ModelKind::Knn, "class", 0.75, 0)
            .with_metrics([MetricName::Accuracy])
            .with_grid(HyperparameterGrid::new().axis("neighbors", [3usize, 5]), 5);
        assert!(config.validate().is_ok());

        config.cv_folds = None;
        assert!(matches!(config.validate(), Err(TabError::InvalidArgument { .. })));

        let config = HarnessConfig::new(ModelKind::Knn, "class", 0.75, 0)
            .with_metrics([MetricName::Accuracy])
            .with_grid(HyperparameterGrid::new().axis("cost", [1.0]), 5);
        assert!(matches!(config.validate(), Err(TabError::InvalidHyperparameter { .. })));
    }

    #[test]
    fn test_resampling_settings() {
        let config = HarnessConfig::new(ModelKind::LogisticRegression, "class", 0.75, 0)
            .with_positive_class("yes")
            .with_metrics([MetricName::Accuracy, MetricName::RocAuc]);
        assert_eq!(config.tuning_metric(), Some(MetricName::Accuracy));

        let config = config.with_cv_folds(1).with_tuning_metric(MetricName::RocAuc);
        assert_eq!(config.tuning_metric(), Some(MetricName::RocAuc));
        assert!(matches!(
            config.validate(),
            Err(TabError::InvalidArgument { ref field, .. }) if field == "cv_folds"
        ));

        let config = config.with_cv_folds(3).with_strata_bins(0);
        assert!(matches!(
            config.validate(),
            Err(TabError::InvalidArgument { ref field, .. }) if field == "strata_bins"
        ));
        assert!(config.with_strata_bins(2).validate().is_ok());
    }
}

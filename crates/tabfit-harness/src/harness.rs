//! The evaluation harness: split, preprocess, optionally tune, fit, predict
//! and score, as one deterministic run.

use tabfit_core::{Dataset, TabError, TabResult};
use tabfit_model::{fit, Mode, Model};
use tabfit_preprocessing::{initial_split_with_bins, FittedPipeline};
use tracing::info;

use crate::config::HarnessConfig;
use crate::report::{target_mode, EvaluationReport, PredictionTable};
use crate::state::{Deadline, HarnessError, HarnessState, StateMachine};
use crate::tuning::tune;

/// A scored run: the fitted artifacts plus their report.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub model: Model,
    pub pipeline: FittedPipeline,
    pub report: EvaluationReport,
}

/// Runs one configuration against datasets. Each call to [`Harness::run`]
/// starts again from `Initialized`.
#[derive(Debug, Clone)]
pub struct Harness {
    config: HarnessConfig,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        Harness { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    fn check_target(&self, dataset: &Dataset) -> TabResult<Mode> {
        let config = &self.config;
        let mode = target_mode(dataset, &config.target_column)?;
        if !config.model_kind.supports(mode) {
            return Err(TabError::invalid_argument(
                "model_kind",
                format!(
                    "{} cannot fit the {} target `{}`",
                    config.model_kind, mode, config.target_column
                ),
            ));
        }
        config.check_metrics(mode)?;
        if let (Mode::Classification, Some(positive)) = (mode, &config.positive_class) {
            let classes = dataset.class_labels(&config.target_column)?;
            if !classes.contains(positive) {
                return Err(TabError::invalid_argument(
                    "positive_class",
                    format!("`{}` is not a class of `{}`", positive, config.target_column),
                ));
            }
        }
        Ok(mode)
    }

    /// Evaluate the configured workflow on `dataset`.
    pub fn run(&self, dataset: &Dataset) -> Result<Evaluation, HarnessError> {
        let config = &self.config;
        let target = config.target_column.as_str();
        let mut machine = StateMachine::new(Deadline::start(config.time_limit_ms));
        info!(model_kind = %config.model_kind, rows = dataset.n_rows(), "harness run started");

        let mode = machine.guard(|| {
            config.validate()?;
            self.check_target(dataset)
        })?;

        let split = machine.advance(HarnessState::Split, || {
            initial_split_with_bins(
                dataset,
                config.train_fraction,
                config.stratify_column.as_deref(),
                config.strata_bins,
                config.seed,
            )
        })?;
        let train = split.train_data(dataset);
        let test = split.test_data(dataset);

        let (pipeline, train_baked, test_baked) = machine.advance(HarnessState::Preprocessed, || {
            let pipeline = FittedPipeline::fit(&config.pipeline, &train, Some(target))?;
            let train_baked = pipeline.apply(&train)?;
            let test_baked = pipeline.apply(&test)?;
            Ok((pipeline, train_baked, test_baked))
        })?;

        let tuning = match config.cv_folds {
            Some(_) => {
                let deadline = machine.deadline();
                Some(machine.advance(HarnessState::Tuned, || tune(config, &train, deadline))?)
            }
            None => None,
        };
        let hyperparameters = match &tuning {
            Some(results) => config.hyperparameters.merged(&results.best().hyperparameters),
            None => config.hyperparameters.clone(),
        };

        let model = machine.advance(HarnessState::Fitted, || {
            fit(config.model_kind, &hyperparameters, &train_baked, target)
        })?;

        let predictions = machine.advance(HarnessState::Predicted, || {
            PredictionTable::build(&model, &test_baked, test.column(target)?, split.test.clone())
        })?;

        let (metrics, confusion_matrix) = machine.advance(HarnessState::Scored, || {
            let metrics = predictions.score(&config.metrics, config.positive_class.as_deref())?;
            Ok((metrics, predictions.confusion_matrix()?))
        })?;
        info!(metrics = ?metrics, "harness run scored");

        let report = EvaluationReport {
            model_kind: config.model_kind,
            mode,
            split,
            metrics,
            predictions,
            confusion_matrix,
            tuning,
            hyperparameters,
            states: machine.visited().to_vec(),
        };
        Ok(Evaluation {
            model,
            pipeline,
            report,
        })
    }
}

/// Evaluate `config` on `dataset` in one call.
pub fn evaluate(config: &HarnessConfig, dataset: &Dataset) -> Result<Evaluation, HarnessError> {
    Harness::new(config.clone()).run(dataset)
}

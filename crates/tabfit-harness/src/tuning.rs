//! Grid search by v-fold cross-validation over the training partition.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tabfit_core::{Column, Dataset, TabError, TabResult};
use tabfit_metrics::{Direction, MetricName};
use tabfit_model::{fit, Hyperparameters};
use tabfit_preprocessing::{strata, vfold_splits, FittedPipeline};
use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::report::PredictionTable;
use crate::state::Deadline;

/// Cross-validated score of one grid combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningResult {
    pub hyperparameters: Hyperparameters,
    pub fold_scores: Vec<f64>,
    pub mean: f64,
    /// Sample standard deviation of the fold scores over `sqrt(folds)`.
    pub std_err: f64,
}

impl TuningResult {
    fn from_scores(hyperparameters: Hyperparameters, fold_scores: Vec<f64>) -> Self {
        let n = fold_scores.len() as f64;
        let mean = fold_scores.iter().sum::<f64>() / n;
        let std_err = if fold_scores.len() > 1 {
            let var = fold_scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
            (var / n).sqrt()
        } else {
            0.0
        };
        TuningResult {
            hyperparameters,
            fold_scores,
            mean,
            std_err,
        }
    }
}

/// Every combination's cross-validated score, in grid order, and the winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningResults {
    pub metric: MetricName,
    pub folds: usize,
    pub results: Vec<TuningResult>,
    /// Index into `results` of the winning combination.
    pub best: usize,
}

impl TuningResults {
    pub fn best(&self) -> &TuningResult {
        &self.results[self.best]
    }
}

/// Index of the best mean; earlier entries win ties.
pub fn select_best(means: &[f64], direction: Direction) -> usize {
    let mut best = 0;
    for (i, &mean) in means.iter().enumerate().skip(1) {
        if direction.improves(mean, means[best]) || (means[best].is_nan() && !mean.is_nan()) {
            best = i;
        }
    }
    best
}

/// One cross-validation fold, preprocessed by a pipeline fitted on its
/// analysis rows only.
struct Fold {
    analysis: Dataset,
    assessment: Dataset,
    truth: Column,
    rows: Vec<usize>,
}

fn prepare_folds(config: &HarnessConfig, train: &Dataset, folds: usize) -> TabResult<Vec<Fold>> {
    let target = config.target_column.as_str();
    let ids = match &config.stratify_column {
        Some(column) => Some(strata(train, column, config.strata_bins)?.ids),
        None => None,
    };
    vfold_splits(train.n_rows(), folds, ids.as_deref(), config.seed)?
        .into_iter()
        .map(|split| -> TabResult<Fold> {
            let analysis = split.train_data(train);
            let assessment = split.test_data(train);
            let pipeline = FittedPipeline::fit(&config.pipeline, &analysis, Some(target))?;
            Ok(Fold {
                analysis: pipeline.apply(&analysis)?,
                truth: assessment.column(target)?.clone(),
                assessment: pipeline.apply(&assessment)?,
                rows: split.test,
            })
        })
        .collect()
}

fn score_fold(
    config: &HarnessConfig,
    hyperparameters: &Hyperparameters,
    fold: &Fold,
    metric: MetricName,
) -> TabResult<f64> {
    let model = fit(config.model_kind, hyperparameters, &fold.analysis, &config.target_column)?;
    let table = PredictionTable::build(&model, &fold.assessment, &fold.truth, fold.rows.clone())?;
    let scores = table.score(&[metric], config.positive_class.as_deref())?;
    scores
        .get(&metric)
        .copied()
        .ok_or_else(|| TabError::invalid_argument("tuning_metric", format!("`{}` was not computed", metric)))
}

/// Score every grid combination on every fold of `train` and pick the best.
///
/// Without a grid the fixed hyperparameters are resampled as the only
/// combination. Jobs run on the rayon pool when `config.parallel` is set;
/// results are gathered in grid order either way.
pub fn tune(config: &HarnessConfig, train: &Dataset, deadline: Deadline) -> TabResult<TuningResults> {
    let folds = config
        .cv_folds
        .ok_or_else(|| TabError::invalid_argument("cv_folds", "tuning needs cv_folds"))?;
    let metric = config
        .tuning_metric()
        .ok_or_else(|| TabError::invalid_argument("tuning_metric", "no metric to tune on"))?;

    let prepared = prepare_folds(config, train, folds)?;
    let combinations: Vec<Hyperparameters> = match &config.hyperparameter_grid {
        Some(grid) => grid.cartesian(),
        None => vec![Hyperparameters::new()],
    };
    let candidates: Vec<Hyperparameters> = combinations
        .iter()
        .map(|c| config.hyperparameters.merged(c))
        .collect();

    let jobs: Vec<(usize, usize)> = (0..candidates.len())
        .flat_map(|c| (0..prepared.len()).map(move |f| (c, f)))
        .collect();
    let run = |&(c, f): &(usize, usize)| -> TabResult<f64> {
        deadline.check()?;
        let score = score_fold(config, &candidates[c], &prepared[f], metric)?;
        debug!(combination = %candidates[c], fold = f, score, "fold scored");
        Ok(score)
    };
    let outcomes: Vec<TabResult<f64>> = if config.parallel {
        jobs.par_iter().map(run).collect()
    } else {
        jobs.iter().map(run).collect()
    };

    let mut scores = vec![Vec::with_capacity(prepared.len()); candidates.len()];
    for (&(c, _), outcome) in jobs.iter().zip(outcomes) {
        scores[c].push(outcome?);
    }
    let results: Vec<TuningResult> = combinations
        .into_iter()
        .zip(scores)
        .map(|(combination, fold_scores)| TuningResult::from_scores(combination, fold_scores))
        .collect();

    let means: Vec<f64> = results.iter().map(|r| r.mean).collect();
    let best = select_best(&means, metric.direction());
    info!(
        metric = %metric,
        best = %results[best].hyperparameters,
        mean = results[best].mean,
        "tuning selected a combination"
    );
    Ok(TuningResults {
        metric,
        folds,
        results,
        best,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tabfit_datasets::make_binary_classification;
    use tabfit_model::ModelKind;
    use tabfit_preprocessing::{ColumnSelector, PipelineSpec, StepKind};

    use crate::grid::HyperparameterGrid;

    #[test]
    fn test_select_best_ties_go_first() {
        assert_eq!(select_best(&[0.8, 0.9, 0.9], Direction::Maximize), 1);
        assert_eq!(select_best(&[2.0, 1.0, 1.0], Direction::Minimize), 1);
        assert_eq!(select_best(&[0.5, 0.5], Direction::Maximize), 0);
        assert_eq!(select_best(&[f64::NAN, 0.1], Direction::Maximize), 1);
    }

    #[test]
    fn test_std_err() {
        let r = TuningResult::from_scores(Hyperparameters::new(), vec![1.0, 2.0, 3.0]);
        assert_abs_diff_eq!(r.mean, 2.0);
        assert_abs_diff_eq!(r.std_err, (1.0f64 / 3.0).sqrt(), epsilon = 1e-12);
    }

    fn knn_config(parallel: bool) -> HarnessConfig {
        HarnessConfig::new(ModelKind::Knn, "class", 0.75, 11)
            .with_stratify_column("class")
            .with_positive_class("yes")
            .with_pipeline(PipelineSpec::new().step(StepKind::Normalize, ColumnSelector::AllNumericPredictors))
            .with_metrics([MetricName::Accuracy])
            .with_grid(
                HyperparameterGrid::new()
                    .axis("neighbors", [1usize, 15])
                    .axis("weight_func", ["rectangular", "inverse"]),
                4,
            )
            .with_parallel(parallel)
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let train = make_binary_classification(120, 2, 1.0, 5).unwrap();
        let sequential = tune(&knn_config(false), &train, Deadline::start(None)).unwrap();
        let parallel = tune(&knn_config(true), &train, Deadline::start(None)).unwrap();
        assert_eq!(sequential, parallel);
        assert_eq!(sequential.results.len(), 4);
        assert!(sequential.results.iter().all(|r| r.fold_scores.len() == 4));
    }

    #[test]
    fn test_fold_failure_propagates() {
        let train = make_binary_classification(40, 2, 1.0, 5).unwrap();
        let config = knn_config(false).with_grid(HyperparameterGrid::new().axis("neighbors", [500usize]), 4);
        assert!(matches!(
            tune(&config, &train, Deadline::start(None)),
            Err(TabError::InvalidHyperparameter { .. })
        ));
    }
}

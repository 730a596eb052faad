//! # tabfit
//!
//! Reproducible evaluation of models on tabular data: split, preprocess, fit,
//! predict and score, with optional grid search by cross-validation.
//!
//! ## Modules
//!
//! - **core**: `Dataset`, `Column`, `Matrix` and the `TabError` taxonomy
//! - **linalg**: LU decomposition, linear solves, aliased-column detection
//! - **preprocessing**: stratified splits, v-fold CV, imputation, Yeo-Johnson, normalization, one-hot encoding
//! - **linear**: OLS linear regression, logistic regression (IRLS)
//! - **neighbors**: k-NN classifier and regressor
//! - **svm**: RBF-kernel SVC with Platt-scaled probabilities
//! - **metrics**: accuracy, precision, recall, specificity, F1, ROC AUC, RMSE, R², MAE
//! - **model**: one `fit`/`predict` contract over every model family
//! - **harness**: the evaluation state machine, tuning and reports
//! - **io**: save and load a fitted model with its pipeline
//! - **datasets**: seeded synthetic datasets

/// Data containers and errors.
pub use tabfit_core as core;

/// Linear algebra operations.
pub use tabfit_linalg as linalg;

/// Splitting and preprocessing.
pub use tabfit_preprocessing as preprocessing;

/// Linear models.
pub use tabfit_linear as linear;

/// Nearest neighbors.
pub use tabfit_neighbors as neighbors;

/// Support vector machines.
pub use tabfit_svm as svm;

/// Evaluation metrics.
pub use tabfit_metrics as metrics;

/// Model adapter.
pub use tabfit_model as model;

/// Evaluation harness.
pub use tabfit_harness as harness;

/// Model persistence.
pub use tabfit_io as io;

/// Synthetic datasets.
pub use tabfit_datasets as datasets;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_configured_run_and_reload() {
        let config = harness::HarnessConfig::from_json(
            r#"{
                "train_fraction": 0.8,
                "seed": 42,
                "stratify_column": "class",
                "target_column": "class",
                "positive_class": "yes",
                "pipeline": [
                    {"kind": "power_transform", "columns": "all_numeric_predictors"},
                    {"kind": "normalize", "columns": "all_numeric_predictors"}
                ],
                "model_kind": "svm_rbf",
                "hyperparameters": {"rbf_sigma": 0.5},
                "hyperparameter_grid": {"cost": [0.5, 4.0]},
                "cv_folds": 3,
                "metrics": ["roc_auc", "accuracy", "specificity"],
                "parallel": true
            }"#,
        )
        .unwrap();
        let data = datasets::make_binary_classification(90, 2, 2.0, 17).unwrap();
        let evaluation = harness::evaluate(&config, &data).unwrap();
        assert_eq!(evaluation.report.metrics.len(), 3);
        assert!(evaluation.report.hyperparameters.get("rbf_sigma").is_some());

        let bytes = io::save(&evaluation.model, &evaluation.pipeline).unwrap();
        let (model, pipeline) = io::load(&bytes).unwrap();
        let baked = pipeline.apply(&data).unwrap();
        let reloaded = model.predict(&baked, model::OutputKind::ClassLabel).unwrap();
        let original = evaluation
            .model
            .predict(&evaluation.pipeline.apply(&data).unwrap(), model::OutputKind::ClassLabel)
            .unwrap();
        assert_eq!(reloaded, original);
    }
}

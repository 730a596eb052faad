use serde::{Deserialize, Serialize};
use tabfit_core::{TabError, TabResult};
use tabfit_model::Model;
use tabfit_preprocessing::FittedPipeline;
use tracing::debug;

/// Version written by [`save`] and the only one [`load`] accepts.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format_version: u32,
    model: &'a Model,
    pipeline: &'a FittedPipeline,
}

#[derive(Deserialize)]
struct Header {
    format_version: u32,
}

#[derive(Deserialize)]
struct Envelope {
    model: Model,
    pipeline: FittedPipeline,
}

/// Serialize a fitted model and the pipeline that prepares its inputs.
pub fn save(model: &Model, pipeline: &FittedPipeline) -> TabResult<Vec<u8>> {
    let bytes = serde_json::to_vec(&EnvelopeRef {
        format_version: FORMAT_VERSION,
        model,
        pipeline,
    })?;
    debug!(bytes = bytes.len(), model_kind = %model.kind(), "saved model bundle");
    Ok(bytes)
}

/// Restore a bundle written by [`save`].
pub fn load(bytes: &[u8]) -> TabResult<(Model, FittedPipeline)> {
    let header: Header = serde_json::from_slice(bytes)?;
    if header.format_version != FORMAT_VERSION {
        return Err(TabError::Serialization(format!(
            "unsupported format version {} (expected {})",
            header.format_version, FORMAT_VERSION
        )));
    }
    let envelope: Envelope = serde_json::from_slice(bytes)?;
    Ok((envelope.model, envelope.pipeline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabfit_core::Dataset;
    use tabfit_datasets::{make_binary_classification, make_regression};
    use tabfit_model::{fit, Hyperparameters, ModelKind, OutputKind};
    use tabfit_preprocessing::{ColumnSelector, PipelineSpec, StepKind};

    fn fitted(kind: ModelKind, params: Hyperparameters, data: &Dataset, target: &str) -> (Model, FittedPipeline) {
        let spec = PipelineSpec::new()
            .step(StepKind::PowerTransform, ColumnSelector::AllNumericPredictors)
            .step(StepKind::Normalize, ColumnSelector::AllNumericPredictors);
        let pipeline = FittedPipeline::fit(&spec, data, Some(target)).unwrap();
        let model = fit(kind, &params, &pipeline.apply(data).unwrap(), target).unwrap();
        (model, pipeline)
    }

    #[test]
    fn test_round_trip_predicts_identically() {
        let train = make_binary_classification(80, 3, 1.5, 1).unwrap();
        let fresh = make_binary_classification(25, 3, 1.5, 2).unwrap();
        let cases = [
            (ModelKind::LogisticRegression, Hyperparameters::new().with("penalty", 0.1)),
            (ModelKind::Knn, Hyperparameters::new().with("neighbors", 7usize)),
            (ModelKind::SvmRbf, Hyperparameters::new().with("cost", 2.0).with("rbf_sigma", 0.3)),
        ];
        for (kind, params) in cases {
            let (model, pipeline) = fitted(kind, params, &train, "class");
            let (model2, pipeline2) = load(&save(&model, &pipeline).unwrap()).unwrap();
            assert_eq!(model2, model);
            assert_eq!(pipeline2, pipeline);

            let before = model.predict(&pipeline.apply(&fresh).unwrap(), OutputKind::ClassProbability);
            let after = model2.predict(&pipeline2.apply(&fresh).unwrap(), OutputKind::ClassProbability);
            assert_eq!(before.unwrap(), after.unwrap());
        }
    }

    #[test]
    fn test_round_trip_regression() {
        let train = make_regression(60, 2, 0.3, 3).unwrap();
        let (model, pipeline) = fitted(ModelKind::LinearRegression, Hyperparameters::new(), &train, "y");
        let (model2, pipeline2) = load(&save(&model, &pipeline).unwrap()).unwrap();
        let before = model.predict(&pipeline.apply(&train).unwrap(), OutputKind::NumericValue).unwrap();
        let after = model2.predict(&pipeline2.apply(&train).unwrap(), OutputKind::NumericValue).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let train = make_regression(30, 1, 0.3, 3).unwrap();
        let (model, pipeline) = fitted(ModelKind::LinearRegression, Hyperparameters::new(), &train, "y");
        let mut value: serde_json::Value = serde_json::from_slice(&save(&model, &pipeline).unwrap()).unwrap();
        value["format_version"] = serde_json::json!(2);
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(load(&bytes), Err(TabError::Serialization(_))));
        assert!(matches!(load(b"not json"), Err(TabError::Serialization(_))));
    }
}

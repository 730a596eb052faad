//! Preprocessing pipelines: an ordered list of step descriptors, fitted once
//! on training data into immutable parameters and replayed on any dataset.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tabfit_core::{Column, ColumnKind, Dataset, TabError, TabResult};
use tracing::debug;

use crate::encoder::OneHotEncoder;
use crate::filter::{ColumnDropper, ZeroVarianceFilter};
use crate::impute::{ImputeStrategy, Imputer};
use crate::power::PowerTransformer;
use crate::scaler::Normalizer;

/// A fitted preprocessing step.
pub trait Transformer {
    /// Columns the step reads; each must be present when it is applied.
    fn input_columns(&self) -> Vec<String>;

    /// Apply the fitted parameters to `dataset`. Row count is preserved.
    fn transform(&self, dataset: Dataset) -> TabResult<Dataset>;
}

/// Look up a column needed by a fitted step, reporting absence or a kind
/// change as a schema mismatch.
pub(crate) fn applied_column<'a>(
    dataset: &'a Dataset,
    name: &str,
    kind: Option<ColumnKind>,
) -> TabResult<&'a Column> {
    let col = dataset.column(name).map_err(|_| {
        TabError::schema_mismatch(name, "column used by a fitted preprocessing step is absent")
    })?;
    match kind {
        Some(k) if col.kind() != k => Err(TabError::schema_mismatch(
            name,
            format!("fitted as {} but found {}", k, col.kind()),
        )),
        _ => Ok(col),
    }
}

/// The closed set of preprocessing step kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StepKind {
    ImputeMedian,
    ImputeMean,
    ImputeMode,
    PowerTransform,
    Normalize,
    OneHotEncode,
    DropColumns,
    ZeroVarianceFilter,
}

impl StepKind {
    pub const ALL: [StepKind; 8] = [
        StepKind::ImputeMedian,
        StepKind::ImputeMean,
        StepKind::ImputeMode,
        StepKind::PowerTransform,
        StepKind::Normalize,
        StepKind::OneHotEncode,
        StepKind::DropColumns,
        StepKind::ZeroVarianceFilter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::ImputeMedian => "impute_median",
            StepKind::ImputeMean => "impute_mean",
            StepKind::ImputeMode => "impute_mode",
            StepKind::PowerTransform => "power_transform",
            StepKind::Normalize => "normalize",
            StepKind::OneHotEncode => "one_hot_encode",
            StepKind::DropColumns => "drop_columns",
            StepKind::ZeroVarianceFilter => "zero_variance_filter",
        }
    }

    /// Column kinds this step can be fitted on.
    pub fn accepts(&self, kind: ColumnKind) -> bool {
        match self {
            StepKind::ImputeMedian
            | StepKind::ImputeMean
            | StepKind::PowerTransform
            | StepKind::Normalize => kind == ColumnKind::Numeric,
            StepKind::OneHotEncode => kind == ColumnKind::Categorical,
            StepKind::ImputeMode | StepKind::DropColumns | StepKind::ZeroVarianceFilter => true,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = TabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepKind::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| TabError::UnknownStepKind(s.to_string()))
    }
}

impl TryFrom<String> for StepKind {
    type Error = TabError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Which columns a step applies to. Role-based selectors never include the
/// outcome column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSelector {
    Columns(Vec<String>),
    AllPredictors,
    AllNumericPredictors,
    AllNominalPredictors,
}

impl ColumnSelector {
    pub fn names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        ColumnSelector::Columns(names.into_iter().map(Into::into).collect())
    }

    fn matches(&self, kind: ColumnKind) -> bool {
        match self {
            ColumnSelector::AllNumericPredictors => kind == ColumnKind::Numeric,
            ColumnSelector::AllNominalPredictors => kind == ColumnKind::Categorical,
            ColumnSelector::AllPredictors | ColumnSelector::Columns(_) => true,
        }
    }
}

/// One step descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub kind: StepKind,
    pub columns: ColumnSelector,
}

impl StepSpec {
    pub fn new(kind: StepKind, columns: ColumnSelector) -> Self {
        StepSpec { kind, columns }
    }

    /// Build a step from its textual kind, e.g. `"normalize"`.
    pub fn parse(kind: &str, columns: ColumnSelector) -> TabResult<Self> {
        Ok(StepSpec::new(kind.parse()?, columns))
    }

    /// Resolve the selector against the current schema.
    fn resolve(&self, current: &Dataset, outcome: Option<&str>) -> TabResult<Vec<String>> {
        match &self.columns {
            ColumnSelector::Columns(names) => {
                let mut resolved: Vec<String> = Vec::with_capacity(names.len());
                for name in names {
                    if Some(name.as_str()) == outcome {
                        return Err(TabError::invalid_argument(
                            "pipeline",
                            format!("step `{}` names the outcome column `{}`", self.kind, name),
                        ));
                    }
                    let col = current.column(name)?;
                    if !self.kind.accepts(col.kind()) {
                        return Err(TabError::schema_mismatch(
                            name,
                            format!("step `{}` cannot be fitted on a {} column", self.kind, col.kind()),
                        ));
                    }
                    if !resolved.contains(name) {
                        resolved.push(name.clone());
                    }
                }
                Ok(resolved)
            }
            selector => Ok(current
                .columns()
                .iter()
                .filter(|c| Some(c.name()) != outcome)
                .filter(|c| selector.matches(c.kind()) && self.kind.accepts(c.kind()))
                .map(|c| c.name().to_string())
                .collect()),
        }
    }
}

/// Ordered list of step descriptors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineSpec {
    steps: Vec<StepSpec>,
}

impl PipelineSpec {
    pub fn new() -> Self {
        PipelineSpec { steps: Vec::new() }
    }

    /// Append a step.
    pub fn step(mut self, kind: StepKind, columns: ColumnSelector) -> Self {
        self.steps.push(StepSpec::new(kind, columns));
        self
    }

    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Column names referenced explicitly by any step.
    pub fn named_columns(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|s| match &s.columns {
                ColumnSelector::Columns(names) => Some(names.iter().map(String::as_str)),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

impl FromIterator<StepSpec> for PipelineSpec {
    fn from_iter<I: IntoIterator<Item = StepSpec>>(iter: I) -> Self {
        PipelineSpec {
            steps: iter.into_iter().collect(),
        }
    }
}

/// Parameters of one fitted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum FittedStep {
    Impute(Imputer),
    PowerTransform(PowerTransformer),
    Normalize(Normalizer),
    OneHotEncode(OneHotEncoder),
    DropColumns(ColumnDropper),
    ZeroVarianceFilter(ZeroVarianceFilter),
}

impl FittedStep {
    fn fit(kind: StepKind, train: &Dataset, columns: &[String]) -> TabResult<Self> {
        Ok(match kind {
            StepKind::ImputeMedian => FittedStep::Impute(Imputer::fit(ImputeStrategy::Median, train, columns)?),
            StepKind::ImputeMean => FittedStep::Impute(Imputer::fit(ImputeStrategy::Mean, train, columns)?),
            StepKind::ImputeMode => FittedStep::Impute(Imputer::fit(ImputeStrategy::Mode, train, columns)?),
            StepKind::PowerTransform => FittedStep::PowerTransform(PowerTransformer::fit(train, columns)?),
            StepKind::Normalize => FittedStep::Normalize(Normalizer::fit(train, columns)?),
            StepKind::OneHotEncode => FittedStep::OneHotEncode(OneHotEncoder::fit(train, columns)?),
            StepKind::DropColumns => FittedStep::DropColumns(ColumnDropper::fit(train, columns)?),
            StepKind::ZeroVarianceFilter => {
                FittedStep::ZeroVarianceFilter(ZeroVarianceFilter::fit(train, columns)?)
            }
        })
    }

    pub fn kind(&self) -> StepKind {
        match self {
            FittedStep::Impute(imp) => match imp.strategy() {
                ImputeStrategy::Median => StepKind::ImputeMedian,
                ImputeStrategy::Mean => StepKind::ImputeMean,
                ImputeStrategy::Mode => StepKind::ImputeMode,
            },
            FittedStep::PowerTransform(_) => StepKind::PowerTransform,
            FittedStep::Normalize(_) => StepKind::Normalize,
            FittedStep::OneHotEncode(_) => StepKind::OneHotEncode,
            FittedStep::DropColumns(_) => StepKind::DropColumns,
            FittedStep::ZeroVarianceFilter(_) => StepKind::ZeroVarianceFilter,
        }
    }

    fn transformer(&self) -> &dyn Transformer {
        match self {
            FittedStep::Impute(t) => t,
            FittedStep::PowerTransform(t) => t,
            FittedStep::Normalize(t) => t,
            FittedStep::OneHotEncode(t) => t,
            FittedStep::DropColumns(t) => t,
            FittedStep::ZeroVarianceFilter(t) => t,
        }
    }
}

impl Transformer for FittedStep {
    fn input_columns(&self) -> Vec<String> {
        self.transformer().input_columns()
    }

    fn transform(&self, dataset: Dataset) -> TabResult<Dataset> {
        self.transformer().transform(dataset)
    }
}

/// A pipeline whose parameters were learned from one training dataset.
///
/// Immutable after [`FittedPipeline::fit`]; `apply` never changes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    steps: Vec<FittedStep>,
    outcome: Option<String>,
    output_columns: Vec<String>,
}

impl FittedPipeline {
    /// Fit every step in order; later steps are fitted on the output of
    /// earlier ones. Only `train` is read.
    pub fn fit(spec: &PipelineSpec, train: &Dataset, outcome: Option<&str>) -> TabResult<Self> {
        if let Some(name) = outcome {
            train.column(name)?;
        }
        let mut current = train.clone();
        let mut steps = Vec::with_capacity(spec.steps().len());
        for step in spec.steps() {
            let columns = step.resolve(&current, outcome)?;
            debug!(step = %step.kind, columns = ?columns, "fitting preprocessing step");
            let fitted = FittedStep::fit(step.kind, &current, &columns)?;
            current = fitted.transform(current)?;
            steps.push(fitted);
        }
        Ok(FittedPipeline {
            steps,
            outcome: outcome.map(str::to_string),
            output_columns: current.column_names(),
        })
    }

    /// Replay the fitted steps on `dataset`.
    pub fn apply(&self, dataset: &Dataset) -> TabResult<Dataset> {
        self.steps
            .iter()
            .try_fold(dataset.clone(), |current, step| step.transform(current))
    }

    pub fn steps(&self) -> &[FittedStep] {
        &self.steps
    }

    pub fn outcome(&self) -> Option<&str> {
        self.outcome.as_deref()
    }

    /// Column names produced on the training data, outcome included.
    pub fn output_columns(&self) -> &[String] {
        &self.output_columns
    }

    /// Output columns other than the outcome.
    pub fn predictor_columns(&self) -> Vec<String> {
        self.output_columns
            .iter()
            .filter(|c| Some(c.as_str()) != self.outcome.as_deref())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train() -> Dataset {
        Dataset::builder()
            .numeric_opt("x", vec![Some(1.0), None, Some(3.0), Some(5.0)])
            .numeric("z", vec![10.0, 20.0, 30.0, 40.0])
            .categorical("group", &["a", "b", "a", "b"])
            .numeric("y", vec![1.0, 2.0, 3.0, 4.0])
            .build()
            .unwrap()
    }

    fn spec() -> PipelineSpec {
        PipelineSpec::new()
            .step(StepKind::ImputeMedian, ColumnSelector::AllNumericPredictors)
            .step(StepKind::OneHotEncode, ColumnSelector::AllNominalPredictors)
            .step(StepKind::Normalize, ColumnSelector::AllNumericPredictors)
    }

    #[test]
    fn test_unknown_step_kind() {
        let err = StepSpec::parse("box_cox", ColumnSelector::AllPredictors).unwrap_err();
        assert_eq!(err, TabError::UnknownStepKind("box_cox".into()));
        assert_eq!("one_hot_encode".parse::<StepKind>().unwrap(), StepKind::OneHotEncode);
    }

    #[test]
    fn test_later_steps_see_earlier_outputs() {
        let fitted = FittedPipeline::fit(&spec(), &train(), Some("y")).unwrap();
        assert_eq!(
            fitted.output_columns(),
            &["x", "z", "group_a", "group_b", "group_unseen", "y"]
        );
        match &fitted.steps()[2] {
            FittedStep::Normalize(n) => {
                let cols: Vec<&str> = n.scales().iter().map(|s| s.column.as_str()).collect();
                assert_eq!(cols, vec!["x", "z", "group_a", "group_b", "group_unseen"]);
                assert_eq!(n.zero_variance_columns(), vec!["group_unseen"]);
            }
            other => panic!("unexpected step {:?}", other.kind()),
        }
        assert_eq!(fitted.predictor_columns().len(), 5);
    }

    #[test]
    fn test_outcome_untouched() {
        let fitted = FittedPipeline::fit(&spec(), &train(), Some("y")).unwrap();
        let out = fitted.apply(&train()).unwrap();
        assert_eq!(out.column("y").unwrap(), train().column("y").unwrap());
    }

    #[test]
    fn test_naming_outcome_rejected() {
        let spec = PipelineSpec::new().step(StepKind::Normalize, ColumnSelector::names(["y"]));
        assert!(matches!(
            FittedPipeline::fit(&spec, &train(), Some("y")),
            Err(TabError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_column_not_found_at_fit() {
        let spec = PipelineSpec::new().step(StepKind::Normalize, ColumnSelector::names(["missing"]));
        assert_eq!(
            FittedPipeline::fit(&spec, &train(), None).unwrap_err(),
            TabError::ColumnNotFound("missing".into())
        );
    }

    #[test]
    fn test_wrong_kind_at_fit() {
        let spec = PipelineSpec::new().step(StepKind::Normalize, ColumnSelector::names(["group"]));
        assert!(matches!(
            FittedPipeline::fit(&spec, &train(), None),
            Err(TabError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_apply_is_pure_and_idempotent() {
        let fitted = FittedPipeline::fit(&spec(), &train(), Some("y")).unwrap();
        let snapshot = fitted.clone();
        let test = Dataset::builder()
            .numeric_opt("x", vec![Some(100.0), None])
            .numeric("z", vec![-5.0, 1e6])
            .categorical("group", &["c", "a"])
            .build()
            .unwrap();
        let first = fitted.apply(&test).unwrap();
        let second = fitted.apply(&test).unwrap();
        assert_eq!(first, second);
        assert_eq!(fitted, snapshot);
        assert_eq!(first.column("group_unseen").unwrap().present_numeric()[0], 1.0);
        assert!(!first.has_column("group_c"));
    }

    #[test]
    fn test_missing_column_at_apply() {
        let fitted = FittedPipeline::fit(&spec(), &train(), Some("y")).unwrap();
        let test = train().without_columns(&["z".to_string()]);
        let err = fitted.apply(&test).unwrap_err();
        assert_eq!(
            err,
            TabError::schema_mismatch("z", "column used by a fitted preprocessing step is absent")
        );
    }

    #[test]
    fn test_spec_from_json() {
        let json = r#"[
            {"kind": "impute_mode", "columns": {"columns": ["group"]}},
            {"kind": "power_transform", "columns": "all_numeric_predictors"},
            {"kind": "drop_columns", "columns": {"columns": ["z"]}}
        ]"#;
        let spec: PipelineSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.steps().len(), 3);
        assert_eq!(spec.steps()[1].kind, StepKind::PowerTransform);
        assert_eq!(spec.named_columns(), vec!["group", "z"]);

        let bad = r#"[{"kind": "box_cox", "columns": "all_predictors"}]"#;
        let err = serde_json::from_str::<PipelineSpec>(bad).unwrap_err();
        assert!(err.to_string().contains("box_cox"));
    }
}

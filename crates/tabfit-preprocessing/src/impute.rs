use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tabfit_core::{Column, ColumnData, ColumnKind, Dataset, TabError, TabResult};
use tracing::debug;

use crate::pipeline::{applied_column, Transformer};
use crate::stats;

/// How the fill value of an imputed column is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    Mean,
    Median,
    Mode,
}

/// Value substituted for missing cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FillValue {
    Numeric(f64),
    Categorical(String),
}

impl FillValue {
    fn kind(&self) -> ColumnKind {
        match self {
            FillValue::Numeric(_) => ColumnKind::Numeric,
            FillValue::Categorical(_) => ColumnKind::Categorical,
        }
    }
}

/// Replaces missing values with a statistic learned from training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Imputer {
    strategy: ImputeStrategy,
    fills: Vec<(String, FillValue)>,
}

impl Imputer {
    pub fn fit(strategy: ImputeStrategy, train: &Dataset, columns: &[String]) -> TabResult<Self> {
        let mut fills = Vec::with_capacity(columns.len());
        for name in columns {
            let col = train.column(name)?;
            let fill = match strategy {
                ImputeStrategy::Mean | ImputeStrategy::Median => {
                    let present = no_values_guard(col, col.expect_numeric()?.iter().flatten().copied().collect())?;
                    let v = if strategy == ImputeStrategy::Mean {
                        stats::mean(&present)
                    } else {
                        stats::median(&present)
                    };
                    FillValue::Numeric(v)
                }
                ImputeStrategy::Mode => mode(col)?,
            };
            debug!(column = %name, ?strategy, fill = ?fill, "fitted imputer");
            fills.push((name.clone(), fill));
        }
        Ok(Imputer { strategy, fills })
    }

    pub fn strategy(&self) -> ImputeStrategy {
        self.strategy
    }

    pub fn fill_values(&self) -> &[(String, FillValue)] {
        &self.fills
    }
}

fn no_values_guard(col: &Column, present: Vec<f64>) -> TabResult<Vec<f64>> {
    if present.is_empty() {
        return Err(TabError::FitFailure(format!(
            "cannot impute `{}`: no values present in training data",
            col.name()
        )));
    }
    Ok(present)
}

/// Most frequent present value; ties go to the smallest value.
fn mode(col: &Column) -> TabResult<FillValue> {
    match col.data() {
        ColumnData::Numeric(values) => {
            let present = no_values_guard(col, values.iter().flatten().copied().collect())?;
            let mut counts: Vec<(f64, usize)> = Vec::new();
            for v in stats::sorted(&present) {
                match counts.last_mut() {
                    Some((last, n)) if *last == v => *n += 1,
                    _ => counts.push((v, 1)),
                }
            }
            let best = counts
                .iter()
                .fold((f64::NAN, 0usize), |acc, &(v, n)| if n > acc.1 { (v, n) } else { acc });
            Ok(FillValue::Numeric(best.0))
        }
        ColumnData::Categorical(values) => {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for s in values.iter().flatten() {
                *counts.entry(s.as_str()).or_insert(0) += 1;
            }
            let best = counts
                .iter()
                .fold(None::<(&str, usize)>, |acc, (&s, &n)| match acc {
                    Some((_, m)) if m >= n => acc,
                    _ => Some((s, n)),
                });
            match best {
                Some((s, _)) => Ok(FillValue::Categorical(s.to_string())),
                None => Err(TabError::FitFailure(format!(
                    "cannot impute `{}`: no values present in training data",
                    col.name()
                ))),
            }
        }
    }
}

impl Transformer for Imputer {
    fn input_columns(&self) -> Vec<String> {
        self.fills.iter().map(|(name, _)| name.clone()).collect()
    }

    fn transform(&self, dataset: Dataset) -> TabResult<Dataset> {
        let mut out = dataset;
        for (name, fill) in &self.fills {
            let col = applied_column(&out, name, Some(fill.kind()))?;
            let filled = match (col.data(), fill) {
                (ColumnData::Numeric(values), FillValue::Numeric(f)) => {
                    Column::numeric_opt(name.as_str(), values.iter().map(|v| Some(v.unwrap_or(*f))).collect())
                }
                (ColumnData::Categorical(values), FillValue::Categorical(f)) => Column::categorical_opt(
                    name.as_str(),
                    values
                        .iter()
                        .map(|v| Some(v.clone().unwrap_or_else(|| f.clone())))
                        .collect(),
                ),
                _ => {
                    return Err(TabError::schema_mismatch(
                        name,
                        "column kind differs from the fitted fill value",
                    ))
                }
            };
            out = out.with_column(filled)?;
        }
        Ok(out)
    }
}

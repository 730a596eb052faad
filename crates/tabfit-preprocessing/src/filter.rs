use serde::{Deserialize, Serialize};
use tabfit_core::{ColumnData, Dataset, TabResult};
use tracing::debug;

use crate::pipeline::{applied_column, Transformer};

/// Removes a fixed set of columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDropper {
    columns: Vec<String>,
}

impl ColumnDropper {
    pub fn fit(train: &Dataset, columns: &[String]) -> TabResult<Self> {
        for name in columns {
            train.column(name)?;
        }
        Ok(ColumnDropper {
            columns: columns.to_vec(),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Transformer for ColumnDropper {
    fn input_columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn transform(&self, dataset: Dataset) -> TabResult<Dataset> {
        for name in &self.columns {
            applied_column(&dataset, name, None)?;
        }
        Ok(dataset.without_columns(&self.columns))
    }
}

/// Drops columns that hold a single distinct value in the training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroVarianceFilter {
    checked: Vec<String>,
    removed: Vec<String>,
}

impl ZeroVarianceFilter {
    pub fn fit(train: &Dataset, columns: &[String]) -> TabResult<Self> {
        let mut removed = Vec::new();
        for name in columns {
            let distinct = match train.column(name)?.data() {
                ColumnData::Numeric(values) => {
                    let mut v: Vec<f64> = values.iter().flatten().copied().collect();
                    v.sort_by(|a, b| a.total_cmp(b));
                    v.dedup();
                    v.len()
                }
                ColumnData::Categorical(values) => {
                    let mut v: Vec<&String> = values.iter().flatten().collect();
                    v.sort();
                    v.dedup();
                    v.len()
                }
            };
            if distinct < 2 {
                debug!(column = %name, "zero-variance column removed");
                removed.push(name.clone());
            }
        }
        Ok(ZeroVarianceFilter {
            checked: columns.to_vec(),
            removed,
        })
    }

    pub fn removed(&self) -> &[String] {
        &self.removed
    }
}

impl Transformer for ZeroVarianceFilter {
    fn input_columns(&self) -> Vec<String> {
        self.checked.clone()
    }

    fn transform(&self, dataset: Dataset) -> TabResult<Dataset> {
        for name in &self.checked {
            applied_column(&dataset, name, None)?;
        }
        Ok(dataset.without_columns(&self.removed))
    }
}

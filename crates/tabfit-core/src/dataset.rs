use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{TabError, TabResult};
use crate::matrix::Matrix;

/// A single cell value as seen through the record view of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Numeric(f64),
    Categorical(String),
    Missing,
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Numeric(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Categorical(v.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(v) => write!(f, "{}", v),
            Value::Categorical(s) => write!(f, "{}", s),
            Value::Missing => write!(f, "NA"),
        }
    }
}

/// Semantic type shared by every present value of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// Typed column storage. `None` marks a missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Column {
            name: name.into(),
            data,
        }
    }

    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Column::new(name, ColumnData::Numeric(values.into_iter().map(Some).collect()))
    }

    pub fn numeric_opt(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Column::new(name, ColumnData::Numeric(values))
    }

    pub fn categorical<S: AsRef<str>>(name: impl Into<String>, values: &[S]) -> Self {
        Column::new(
            name,
            ColumnData::Categorical(values.iter().map(|s| Some(s.as_ref().to_string())).collect()),
        )
    }

    pub fn categorical_opt(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Column::new(name, ColumnData::Categorical(values))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn kind(&self) -> ColumnKind {
        match self.data {
            ColumnData::Numeric(_) => ColumnKind::Numeric,
            ColumnData::Categorical(_) => ColumnKind::Categorical,
        }
    }

    pub fn len(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match &self.data {
            ColumnData::Numeric(v) => Some(v),
            ColumnData::Categorical(_) => None,
        }
    }

    pub fn as_categorical(&self) -> Option<&[Option<String>]> {
        match &self.data {
            ColumnData::Categorical(v) => Some(v),
            ColumnData::Numeric(_) => None,
        }
    }

    /// Numeric values, failing with `SchemaMismatch` for a categorical column.
    pub fn expect_numeric(&self) -> TabResult<&[Option<f64>]> {
        self.as_numeric().ok_or_else(|| {
            TabError::schema_mismatch(&self.name, "expected a numeric column, found categorical")
        })
    }

    /// Categorical values, failing with `SchemaMismatch` for a numeric column.
    pub fn expect_categorical(&self) -> TabResult<&[Option<String>]> {
        self.as_categorical().ok_or_else(|| {
            TabError::schema_mismatch(&self.name, "expected a categorical column, found numeric")
        })
    }

    /// Present numeric values, skipping missing entries.
    pub fn present_numeric(&self) -> Vec<f64> {
        match &self.data {
            ColumnData::Numeric(v) => v.iter().flatten().copied().collect(),
            ColumnData::Categorical(_) => Vec::new(),
        }
    }

    pub fn missing_count(&self) -> usize {
        match &self.data {
            ColumnData::Numeric(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Categorical(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    pub fn get(&self, row: usize) -> Value {
        match &self.data {
            ColumnData::Numeric(v) => match v.get(row) {
                Some(Some(x)) => Value::Numeric(*x),
                _ => Value::Missing,
            },
            ColumnData::Categorical(v) => match v.get(row) {
                Some(Some(s)) => Value::Categorical(s.clone()),
                _ => Value::Missing,
            },
        }
    }

    /// Gather the given rows (in the given order) into a new column.
    pub fn select_rows(&self, indices: &[usize]) -> Column {
        let data = match &self.data {
            ColumnData::Numeric(v) => ColumnData::Numeric(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Categorical(v) => {
                ColumnData::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
            }
        };
        Column::new(self.name.clone(), data)
    }

    /// Distinct present categories in first-seen order.
    pub fn levels(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut levels = Vec::new();
        if let ColumnData::Categorical(v) = &self.data {
            for s in v.iter().flatten() {
                if seen.insert(s.as_str()) {
                    levels.push(s.clone());
                }
            }
        }
        levels
    }
}

/// An ordered collection of equally long, uniquely named columns.
///
/// Every record (row) has the same column set; each column holds values of a
/// single [`ColumnKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Dataset {
    pub fn new(columns: Vec<Column>) -> TabResult<Self> {
        let n_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        let mut names = HashSet::new();
        for col in &columns {
            if col.len() != n_rows {
                return Err(TabError::DimensionMismatch(format!(
                    "column `{}` has {} rows, expected {}",
                    col.name(),
                    col.len(),
                    n_rows
                )));
            }
            if !names.insert(col.name().to_string()) {
                return Err(TabError::invalid_argument(
                    col.name(),
                    "duplicate column name",
                ));
            }
        }
        Ok(Dataset { columns, n_rows })
    }

    /// Build a dataset from row records. Column kinds are inferred from the
    /// present values; a column mixing numeric and categorical values is rejected.
    pub fn from_records(names: &[&str], records: &[Vec<Value>]) -> TabResult<Self> {
        let mut kinds: Vec<Option<ColumnKind>> = vec![None; names.len()];
        for (r, record) in records.iter().enumerate() {
            if record.len() != names.len() {
                return Err(TabError::DimensionMismatch(format!(
                    "record {} has {} values, expected {}",
                    r,
                    record.len(),
                    names.len()
                )));
            }
            for (j, value) in record.iter().enumerate() {
                let kind = match value {
                    Value::Numeric(_) => ColumnKind::Numeric,
                    Value::Categorical(_) => ColumnKind::Categorical,
                    Value::Missing => continue,
                };
                match kinds[j] {
                    None => kinds[j] = Some(kind),
                    Some(k) if k != kind => {
                        return Err(TabError::schema_mismatch(
                            names[j],
                            format!("record {} holds a {} value in a {} column", r, kind, k),
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        let columns = names
            .iter()
            .enumerate()
            .map(|(j, name)| match kinds[j].unwrap_or(ColumnKind::Numeric) {
                ColumnKind::Numeric => Column::numeric_opt(
                    *name,
                    records
                        .iter()
                        .map(|rec| match &rec[j] {
                            Value::Numeric(v) => Some(*v),
                            _ => None,
                        })
                        .collect(),
                ),
                ColumnKind::Categorical => Column::categorical_opt(
                    *name,
                    records
                        .iter()
                        .map(|rec| match &rec[j] {
                            Value::Categorical(s) => Some(s.clone()),
                            _ => None,
                        })
                        .collect(),
                ),
            })
            .collect();
        Dataset::new(columns)
    }

    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::default()
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name() == name)
    }

    pub fn column(&self, name: &str) -> TabResult<&Column> {
        self.columns
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| TabError::ColumnNotFound(name.to_string()))
    }

    /// One record as a list of values in column order.
    pub fn row(&self, i: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.get(i)).collect()
    }

    /// Gather rows by index. Indices must be in range.
    pub fn select_rows(&self, indices: &[usize]) -> Dataset {
        Dataset {
            columns: self.columns.iter().map(|c| c.select_rows(indices)).collect(),
            n_rows: indices.len(),
        }
    }

    /// Replace the column with the same name, or append it.
    pub fn with_column(mut self, column: Column) -> TabResult<Dataset> {
        if !self.columns.is_empty() && column.len() != self.n_rows {
            return Err(TabError::DimensionMismatch(format!(
                "column `{}` has {} rows, dataset has {}",
                column.name(),
                column.len(),
                self.n_rows
            )));
        }
        if self.columns.is_empty() {
            self.n_rows = column.len();
        }
        match self.columns.iter().position(|c| c.name() == column.name()) {
            Some(pos) => self.columns[pos] = column,
            None => self.columns.push(column),
        }
        Ok(self)
    }

    /// Replace column `name` by `replacement` columns at the same position.
    pub fn splice_column(mut self, name: &str, replacement: Vec<Column>) -> TabResult<Dataset> {
        let pos = self
            .columns
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| TabError::ColumnNotFound(name.to_string()))?;
        self.columns.remove(pos);
        for (offset, col) in replacement.into_iter().enumerate() {
            self.columns.insert(pos + offset, col);
        }
        Dataset::new(self.columns)
    }

    /// Drop columns by name; names not present are ignored.
    pub fn without_columns(&self, names: &[String]) -> Dataset {
        Dataset {
            columns: self
                .columns
                .iter()
                .filter(|c| !names.iter().any(|n| n == c.name()))
                .cloned()
                .collect(),
            n_rows: self.n_rows,
        }
    }

    /// Dense row-major feature matrix over `names`, in that order.
    ///
    /// Every referenced column must exist, be numeric, and have no missing values.
    pub fn numeric_matrix(&self, names: &[String]) -> TabResult<Matrix> {
        let mut cols = Vec::with_capacity(names.len());
        for name in names {
            let col = self.column(name).map_err(|_| {
                TabError::schema_mismatch(name, "column required by the model is absent")
            })?;
            cols.push(col.expect_numeric()?);
        }
        let mut data = Vec::with_capacity(self.n_rows * names.len());
        for i in 0..self.n_rows {
            for (j, col) in cols.iter().enumerate() {
                match col[i] {
                    Some(v) => data.push(v),
                    None => {
                        return Err(TabError::schema_mismatch(
                            &names[j],
                            format!("missing value at row {}", i),
                        ))
                    }
                }
            }
        }
        Matrix::new(data, self.n_rows, names.len())
    }

    /// Sorted distinct categories of a categorical column.
    pub fn class_labels(&self, name: &str) -> TabResult<Vec<String>> {
        let col = self.column(name)?;
        if col.kind() != ColumnKind::Categorical {
            return Err(TabError::schema_mismatch(name, "class labels need a categorical column"));
        }
        let mut labels = col.levels();
        labels.sort();
        Ok(labels)
    }
}

/// Incremental construction of a [`Dataset`].
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    columns: Vec<Column>,
}

impl DatasetBuilder {
    pub fn numeric(mut self, name: &str, values: Vec<f64>) -> Self {
        self.columns.push(Column::numeric(name, values));
        self
    }

    pub fn numeric_opt(mut self, name: &str, values: Vec<Option<f64>>) -> Self {
        self.columns.push(Column::numeric_opt(name, values));
        self
    }

    pub fn categorical<S: AsRef<str>>(mut self, name: &str, values: &[S]) -> Self {
        self.columns.push(Column::categorical(name, values));
        self
    }

    pub fn categorical_opt(mut self, name: &str, values: Vec<Option<String>>) -> Self {
        self.columns.push(Column::categorical_opt(name, values));
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn build(self) -> TabResult<Dataset> {
        Dataset::new(self.columns)
    }
}

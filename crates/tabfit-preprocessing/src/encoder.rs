use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tabfit_core::{Column, ColumnKind, Dataset, TabResult};
use tracing::{debug, warn};

use crate::pipeline::{applied_column, Transformer};

/// Suffix of the indicator column that collects categories never seen in training.
pub const UNSEEN_LEVEL: &str = "unseen";

/// Training categories of one encoded column, sorted, with the names of
/// their indicator columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub column: String,
    pub levels: Vec<String>,
    /// One name per level, then the unseen bucket. Unique within the dataset.
    indicators: Vec<String>,
}

impl Vocabulary {
    pub fn indicator_names(&self) -> &[String] {
        &self.indicators
    }

    pub fn unseen_indicator(&self) -> &str {
        &self.indicators[self.levels.len()]
    }
}

/// `base`, or `base_1`, `base_2`, ... when `base` is already taken.
fn claim_name(base: String, taken: &mut HashSet<String>) -> String {
    let mut name = base.clone();
    let mut k = 1;
    while taken.contains(&name) {
        name = format!("{}_{}", base, k);
        k += 1;
    }
    if name != base {
        debug!(requested = %base, assigned = %name, "indicator name already in use");
    }
    taken.insert(name.clone());
    name
}

/// One-hot encoding of categorical columns.
///
/// Each column is replaced, in place, by one binary column per training
/// category plus an `<column>_unseen` bucket. Names are fixed at fit time and
/// get a numeric suffix when they would clash with a column of the training
/// data or with another indicator. Missing values stay missing in every
/// indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    vocabularies: Vec<Vocabulary>,
}

impl OneHotEncoder {
    pub fn fit(train: &Dataset, columns: &[String]) -> TabResult<Self> {
        let mut taken: HashSet<String> = train.column_names().into_iter().collect();
        let mut vocabularies = Vec::with_capacity(columns.len());
        for name in columns {
            let mut levels = train.column(name)?.expect_categorical()?.iter().flatten().cloned().collect::<Vec<_>>();
            levels.sort();
            levels.dedup();
            let indicators = levels
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(UNSEEN_LEVEL))
                .map(|level| claim_name(format!("{}_{}", name, level), &mut taken))
                .collect();
            debug!(column = %name, n_levels = levels.len(), "fitted one-hot vocabulary");
            vocabularies.push(Vocabulary {
                column: name.clone(),
                levels,
                indicators,
            });
        }
        Ok(OneHotEncoder { vocabularies })
    }

    pub fn vocabularies(&self) -> &[Vocabulary] {
        &self.vocabularies
    }
}

impl Transformer for OneHotEncoder {
    fn input_columns(&self) -> Vec<String> {
        self.vocabularies.iter().map(|v| v.column.clone()).collect()
    }

    fn transform(&self, dataset: Dataset) -> TabResult<Dataset> {
        let mut out = dataset;
        for vocab in &self.vocabularies {
            let values = applied_column(&out, &vocab.column, Some(ColumnKind::Categorical))?.expect_categorical()?;
            let index: HashMap<&str, usize> = vocab
                .levels
                .iter()
                .enumerate()
                .map(|(i, level)| (level.as_str(), i))
                .collect();
            let unseen = vocab.levels.len();
            let mut indicators = vec![Vec::with_capacity(values.len()); unseen + 1];
            let mut n_unseen = 0usize;
            for v in values {
                match v {
                    None => indicators.iter_mut().for_each(|col| col.push(None)),
                    Some(s) => {
                        let hot = index.get(s.as_str()).copied().unwrap_or_else(|| {
                            n_unseen += 1;
                            unseen
                        });
                        for (k, col) in indicators.iter_mut().enumerate() {
                            col.push(Some(if k == hot { 1.0 } else { 0.0 }));
                        }
                    }
                }
            }
            if n_unseen > 0 {
                warn!(
                    column = %vocab.column,
                    bucket = %vocab.unseen_indicator(),
                    n_unseen,
                    "categories not seen in training routed to the unseen bucket"
                );
            }
            let replacement = vocab
                .indicator_names()
                .iter()
                .zip(indicators)
                .map(|(name, data)| Column::numeric_opt(name.clone(), data))
                .collect();
            out = out.splice_column(&vocab.column, replacement)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train() -> Dataset {
        Dataset::builder()
            .numeric("x", vec![1.0, 2.0, 3.0])
            .categorical("color", &["red", "blue", "red"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_one_hot_columns() {
        let enc = OneHotEncoder::fit(&train(), &["color".to_string()]).unwrap();
        let out = enc.transform(train()).unwrap();
        assert_eq!(
            out.column_names(),
            vec!["x", "color_blue", "color_red", "color_unseen"]
        );
        assert_eq!(out.column("color_red").unwrap().present_numeric(), vec![1.0, 0.0, 1.0]);
        assert_eq!(out.column("color_unseen").unwrap().present_numeric(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_unseen_category_routes_to_bucket() {
        let enc = OneHotEncoder::fit(&train(), &["color".to_string()]).unwrap();
        let test = Dataset::builder()
            .numeric("x", vec![9.0])
            .categorical("color", &["green"])
            .build()
            .unwrap();
        let out = enc.transform(test).unwrap();
        assert_eq!(out.n_cols(), 4);
        assert_eq!(out.column("color_unseen").unwrap().present_numeric(), vec![1.0]);
        assert_eq!(out.column("color_red").unwrap().present_numeric(), vec![0.0]);
        assert!(!out.has_column("color_green"));
    }

    #[test]
    fn test_missing_stays_missing() {
        let enc = OneHotEncoder::fit(&train(), &["color".to_string()]).unwrap();
        let test = Dataset::builder()
            .numeric("x", vec![1.0])
            .categorical_opt("color", vec![None])
            .build()
            .unwrap();
        let out = enc.transform(test).unwrap();
        assert_eq!(out.column("color_blue").unwrap().missing_count(), 1);
    }

    #[test]
    fn test_level_named_unseen_keeps_its_own_column() {
        let train = Dataset::builder()
            .categorical("status", &["seen", "unseen", "seen"])
            .build()
            .unwrap();
        let enc = OneHotEncoder::fit(&train, &["status".to_string()]).unwrap();
        let vocab = &enc.vocabularies()[0];
        assert_eq!(vocab.indicator_names(), ["status_seen", "status_unseen", "status_unseen_1"]);
        assert_eq!(vocab.unseen_indicator(), "status_unseen_1");

        let out = enc.transform(train).unwrap();
        assert_eq!(out.column("status_unseen").unwrap().present_numeric(), vec![0.0, 1.0, 0.0]);

        let test = Dataset::builder().categorical("status", &["gone"]).build().unwrap();
        let out = enc.transform(test).unwrap();
        assert_eq!(out.column("status_unseen").unwrap().present_numeric(), vec![0.0]);
        assert_eq!(out.column("status_unseen_1").unwrap().present_numeric(), vec![1.0]);
    }

    #[test]
    fn test_indicator_avoids_existing_column() {
        let train = Dataset::builder()
            .numeric("color_red", vec![0.5, 0.25])
            .categorical("color", &["red", "blue"])
            .build()
            .unwrap();
        let enc = OneHotEncoder::fit(&train, &["color".to_string()]).unwrap();
        let out = enc.transform(train).unwrap();
        assert_eq!(
            out.column_names(),
            vec!["color_red", "color_blue", "color_red_1", "color_unseen"]
        );
        assert_eq!(out.column("color_red").unwrap().present_numeric(), vec![0.5, 0.25]);
        assert_eq!(out.column("color_red_1").unwrap().present_numeric(), vec![1.0, 0.0]);
    }
}

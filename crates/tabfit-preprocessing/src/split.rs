use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tabfit_core::{ColumnData, Dataset, TabError, TabResult};
use tracing::debug;

use crate::stats;

/// Number of quantile bins used to stratify on a numeric column.
pub const DEFAULT_STRATA_BINS: usize = 4;

/// A partition of row indices into disjoint train and test sets.
///
/// Both index lists are sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Split {
    pub fn n_train(&self) -> usize {
        self.train.len()
    }

    pub fn n_test(&self) -> usize {
        self.test.len()
    }

    pub fn train_data(&self, dataset: &Dataset) -> Dataset {
        dataset.select_rows(&self.train)
    }

    pub fn test_data(&self, dataset: &Dataset) -> Dataset {
        dataset.select_rows(&self.test)
    }
}

/// Stratum assignment for every row, with a printable label per stratum id.
#[derive(Debug, Clone, PartialEq)]
pub struct Strata {
    pub ids: Vec<usize>,
    pub labels: Vec<String>,
}

impl Strata {
    pub fn n_strata(&self) -> usize {
        self.labels.len()
    }
}

/// Assign each row of `dataset` to a stratum derived from `column`.
///
/// Categorical columns use one stratum per category (first-seen order).
/// Numeric columns are cut into `bins` quantile bins. Missing values form
/// their own stratum in both cases.
pub fn strata(dataset: &Dataset, column: &str, bins: usize) -> TabResult<Strata> {
    if bins == 0 {
        return Err(TabError::invalid_argument("strata_bins", "must be at least 1"));
    }
    let col = dataset.column(column)?;
    let mut labels: Vec<String> = Vec::new();
    let mut ids = Vec::with_capacity(col.len());

    match col.data() {
        ColumnData::Categorical(values) => {
            let mut lookup: HashMap<Option<&str>, usize> = HashMap::new();
            for v in values {
                let key = v.as_deref();
                let next = lookup.len();
                let id = *lookup.entry(key).or_insert_with(|| {
                    labels.push(key.unwrap_or("NA").to_string());
                    next
                });
                ids.push(id);
            }
        }
        ColumnData::Numeric(values) => {
            let present = stats::sorted(&col.present_numeric());
            let breaks: Vec<f64> = if present.is_empty() {
                Vec::new()
            } else {
                (1..bins)
                    .map(|k| stats::quantile_sorted(&present, k as f64 / bins as f64))
                    .collect()
            };
            let mut raw = Vec::with_capacity(values.len());
            for v in values {
                raw.push(match v {
                    Some(x) => breaks.iter().filter(|&&b| *x > b).count(),
                    None => bins,
                });
            }
            // Compact to the bins actually used, keeping bin order.
            let used: BTreeMap<usize, usize> = {
                let mut keys: Vec<usize> = raw.clone();
                keys.sort_unstable();
                keys.dedup();
                keys.into_iter().enumerate().map(|(id, bin)| (bin, id)).collect()
            };
            for (&bin, _) in &used {
                labels.push(if bin == bins {
                    "NA".to_string()
                } else {
                    format!("q{}", bin + 1)
                });
            }
            ids = raw.iter().map(|b| used[b]).collect();
        }
    }

    Ok(Strata { ids, labels })
}

/// Group row indices by stratum id, in ascending id order.
fn group_rows(ids: &[usize]) -> BTreeMap<usize, Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &id) in ids.iter().enumerate() {
        groups.entry(id).or_default().push(row);
    }
    groups
}

/// Split a dataset into train and test partitions.
///
/// Rows are shuffled within each stratum by a generator seeded with `seed`,
/// so identical inputs always give identical splits.
pub fn initial_split(
    dataset: &Dataset,
    train_fraction: f64,
    stratify_column: Option<&str>,
    seed: u64,
) -> TabResult<Split> {
    initial_split_with_bins(dataset, train_fraction, stratify_column, DEFAULT_STRATA_BINS, seed)
}

/// [`initial_split`] with an explicit quantile bin count for numeric strata.
pub fn initial_split_with_bins(
    dataset: &Dataset,
    train_fraction: f64,
    stratify_column: Option<&str>,
    bins: usize,
    seed: u64,
) -> TabResult<Split> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(TabError::invalid_argument(
            "train_fraction",
            format!("{} is outside the open interval (0, 1)", train_fraction),
        ));
    }
    let strata = match stratify_column {
        Some(column) => strata(dataset, column, bins)?,
        None => Strata {
            ids: vec![0; dataset.n_rows()],
            labels: vec!["all".to_string()],
        },
    };
    split_strata(&strata, train_fraction, seed)
}

/// Allocate per-stratum train counts.
///
/// Each stratum starts at `floor(m * f)` clamped to `[1, m - 1]`; the
/// remaining rows go to the strata with the largest fractional remainders
/// until the total reaches `round(n * f)`.
fn allocate(sizes: &[usize], train_fraction: f64) -> Vec<usize> {
    let n: usize = sizes.iter().sum();
    let s = sizes.len();
    let target = ((n as f64 * train_fraction).round() as usize).clamp(s, n - s);

    let ideal: Vec<f64> = sizes.iter().map(|&m| m as f64 * train_fraction).collect();
    let mut counts: Vec<usize> = sizes
        .iter()
        .zip(&ideal)
        .map(|(&m, &x)| (x.floor() as usize).clamp(1, m - 1))
        .collect();
    let mut total: usize = counts.iter().sum();

    while total < target {
        let mut best: Option<usize> = None;
        for i in 0..s {
            if counts[i] + 1 >= sizes[i] {
                continue;
            }
            let rem = ideal[i] - counts[i] as f64;
            if best.map_or(true, |b| rem > ideal[b] - counts[b] as f64) {
                best = Some(i);
            }
        }
        match best {
            Some(i) => counts[i] += 1,
            None => break,
        }
        total += 1;
    }
    while total > target {
        let mut best: Option<usize> = None;
        for i in 0..s {
            if counts[i] <= 1 {
                continue;
            }
            let rem = ideal[i] - counts[i] as f64;
            if best.map_or(true, |b| rem < ideal[b] - counts[b] as f64) {
                best = Some(i);
            }
        }
        match best {
            Some(i) => counts[i] -= 1,
            None => break,
        }
        total -= 1;
    }
    counts
}

fn split_strata(strata: &Strata, train_fraction: f64, seed: u64) -> TabResult<Split> {
    let n = strata.ids.len();
    if n < 2 {
        return Err(TabError::InsufficientData(format!(
            "{} record(s) cannot be split into two non-empty partitions",
            n
        )));
    }
    let groups = group_rows(&strata.ids);
    for (id, rows) in &groups {
        if rows.len() < 2 {
            return Err(TabError::InsufficientData(format!(
                "stratum `{}` has {} record(s); at least 2 are needed",
                strata.labels[*id],
                rows.len()
            )));
        }
    }

    let sizes: Vec<usize> = groups.values().map(|rows| rows.len()).collect();
    let counts = allocate(&sizes, train_fraction);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n);
    let mut test = Vec::with_capacity(n);
    for ((_, rows), &k) in groups.iter().zip(&counts) {
        let mut rows = rows.clone();
        rows.shuffle(&mut rng);
        train.extend_from_slice(&rows[..k]);
        test.extend_from_slice(&rows[k..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    debug!(
        n_train = train.len(),
        n_test = test.len(),
        n_strata = groups.len(),
        "initial split"
    );
    Ok(Split { train, test })
}

/// V-fold cross-validation splits over `n` rows.
///
/// Each fold's `test` set is the assessment set; `train` holds all other rows.
/// When `strata` is given, rows are dealt round-robin to folds stratum by
/// stratum so each fold mirrors the stratum mix.
pub fn vfold_splits(
    n: usize,
    folds: usize,
    strata: Option<&[usize]>,
    seed: u64,
) -> TabResult<Vec<Split>> {
    if folds < 2 {
        return Err(TabError::invalid_argument(
            "cv_folds",
            format!("{} folds requested, at least 2 are needed", folds),
        ));
    }
    if n < folds {
        return Err(TabError::InsufficientData(format!(
            "{} record(s) cannot fill {} folds",
            n, folds
        )));
    }
    let ids: Vec<usize> = match strata {
        Some(ids) if ids.len() != n => {
            return Err(TabError::DimensionMismatch(format!(
                "{} strata ids for {} rows",
                ids.len(),
                n
            )))
        }
        Some(ids) => ids.to_vec(),
        None => vec![0; n],
    };

    let mut rng = StdRng::seed_from_u64(seed);
    let mut fold_of = vec![0usize; n];
    let mut dealt = 0usize;
    for (_, mut rows) in group_rows(&ids) {
        rows.shuffle(&mut rng);
        for row in rows {
            fold_of[row] = dealt % folds;
            dealt += 1;
        }
    }

    Ok((0..folds)
        .map(|k| {
            let (test, train): (Vec<usize>, Vec<usize>) = (0..n).partition(|&i| fold_of[i] == k);
            Split { train, test }
        })
        .collect())
}

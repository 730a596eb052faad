use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tabfit_core::{squared_distance, Matrix, TabError, TabResult};
use tracing::debug;

/// How the k nearest neighbours are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightFunction {
    /// Every neighbour counts equally.
    Rectangular,
    /// Neighbours count by inverse distance; exact matches take all weight.
    Inverse,
}

impl fmt::Display for WeightFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightFunction::Rectangular => write!(f, "rectangular"),
            WeightFunction::Inverse => write!(f, "inverse"),
        }
    }
}

impl FromStr for WeightFunction {
    type Err = TabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rectangular" => Ok(WeightFunction::Rectangular),
            "inverse" => Ok(WeightFunction::Inverse),
            other => Err(TabError::invalid_hyperparameter(
                "weight_func",
                other,
                "expected `rectangular` or `inverse`",
            )),
        }
    }
}

/// Stored training data shared by the classifier and regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Neighbourhood {
    k: usize,
    weight_func: WeightFunction,
    x_train: Matrix,
}

impl Neighbourhood {
    fn new(x: &Matrix, n_targets: usize, k: usize, weight_func: WeightFunction) -> TabResult<Self> {
        if x.rows() != n_targets {
            return Err(TabError::DimensionMismatch(format!(
                "{} feature rows but {} targets",
                x.rows(),
                n_targets
            )));
        }
        if x.rows() == 0 {
            return Err(TabError::InsufficientData("no training rows".into()));
        }
        if k == 0 || k > x.rows() {
            return Err(TabError::invalid_hyperparameter(
                "neighbors",
                k,
                format!("must be between 1 and the number of training rows ({})", x.rows()),
            ));
        }
        if !x.is_finite() {
            return Err(TabError::FitFailure("feature matrix contains non-finite values".into()));
        }
        Ok(Neighbourhood {
            k,
            weight_func,
            x_train: x.clone(),
        })
    }

    fn check_width(&self, x: &Matrix) -> TabResult<()> {
        if x.cols() != self.x_train.cols() {
            return Err(TabError::DimensionMismatch(format!(
                "model was fitted on {} features but got {}",
                self.x_train.cols(),
                x.cols()
            )));
        }
        Ok(())
    }

    /// The k nearest training rows with their weights. Equal distances are
    /// broken by training row order.
    fn neighbours(&self, row: &[f64]) -> Vec<(usize, f64)> {
        let mut dists: Vec<(f64, usize)> = (0..self.x_train.rows())
            .map(|j| (squared_distance(row, self.x_train.row(j)), j))
            .collect();
        dists.sort_by(|a, b| a.0.total_cmp(&b.0));
        dists.truncate(self.k);

        match self.weight_func {
            WeightFunction::Rectangular => dists.into_iter().map(|(_, j)| (j, 1.0)).collect(),
            WeightFunction::Inverse => {
                if dists.iter().any(|(d, _)| *d == 0.0) {
                    dists
                        .into_iter()
                        .filter(|(d, _)| *d == 0.0)
                        .map(|(_, j)| (j, 1.0))
                        .collect()
                } else {
                    dists.into_iter().map(|(d, j)| (j, 1.0 / d.sqrt())).collect()
                }
            }
        }
    }
}

/// K-nearest-neighbours classifier over class indices `0..n_classes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnClassifier {
    neighbourhood: Neighbourhood,
    y_train: Vec<usize>,
    n_classes: usize,
}

impl KnnClassifier {
    pub fn fit(
        x: &Matrix,
        y: &[usize],
        n_classes: usize,
        k: usize,
        weight_func: WeightFunction,
    ) -> TabResult<Self> {
        let neighbourhood = Neighbourhood::new(x, y.len(), k, weight_func)?;
        if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(TabError::FitFailure(format!(
                "class index {} outside 0..{}",
                bad, n_classes
            )));
        }
        debug!(n = x.rows(), k, %weight_func, n_classes, "fitted knn classifier");
        Ok(KnnClassifier {
            neighbourhood,
            y_train: y.to_vec(),
            n_classes,
        })
    }

    /// Weighted vote share of each class, one row per observation.
    pub fn predict_proba(&self, x: &Matrix) -> TabResult<Vec<Vec<f64>>> {
        self.neighbourhood.check_width(x)?;
        Ok((0..x.rows())
            .map(|i| {
                let mut votes = vec![0.0; self.n_classes];
                for (j, w) in self.neighbourhood.neighbours(x.row(i)) {
                    votes[self.y_train[j]] += w;
                }
                let total: f64 = votes.iter().sum();
                votes.iter().map(|v| v / total).collect()
            })
            .collect())
    }

    /// Class with the largest vote share; ties go to the lowest class index.
    pub fn predict(&self, x: &Matrix) -> TabResult<Vec<usize>> {
        Ok(self.predict_proba(x)?.iter().map(|p| argmax(p)).collect())
    }

    pub fn k(&self) -> usize {
        self.neighbourhood.k
    }

    pub fn weight_func(&self) -> WeightFunction {
        self.neighbourhood.weight_func
    }
}

/// Index of the first maximum.
pub fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

/// K-nearest-neighbours regressor: weighted mean of the neighbours' targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnRegressor {
    neighbourhood: Neighbourhood,
    y_train: Vec<f64>,
}

impl KnnRegressor {
    pub fn fit(x: &Matrix, y: &[f64], k: usize, weight_func: WeightFunction) -> TabResult<Self> {
        let neighbourhood = Neighbourhood::new(x, y.len(), k, weight_func)?;
        debug!(n = x.rows(), k, %weight_func, "fitted knn regressor");
        Ok(KnnRegressor {
            neighbourhood,
            y_train: y.to_vec(),
        })
    }

    pub fn predict(&self, x: &Matrix) -> TabResult<Vec<f64>> {
        self.neighbourhood.check_width(x)?;
        Ok((0..x.rows())
            .map(|i| {
                let neighbours = self.neighbourhood.neighbours(x.row(i));
                let total: f64 = neighbours.iter().map(|(_, w)| w).sum();
                neighbours.iter().map(|(j, w)| w * self.y_train[*j]).sum::<f64>() / total
            })
            .collect())
    }

    pub fn k(&self) -> usize {
        self.neighbourhood.k
    }

    pub fn weight_func(&self) -> WeightFunction {
        self.neighbourhood.weight_func
    }
}

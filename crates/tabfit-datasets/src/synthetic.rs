use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tabfit_core::{Column, Dataset, TabError, TabResult};

/// Standard normal draw by the Box-Muller transform.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-10);
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn feature_names(n_features: usize) -> Vec<String> {
    (1..=n_features).map(|f| format!("x{}", f)).collect()
}

fn assemble(features: Vec<Vec<f64>>, target: Column) -> TabResult<Dataset> {
    let mut columns: Vec<Column> = feature_names(features.len())
        .into_iter()
        .zip(features)
        .map(|(name, values)| Column::numeric(name, values))
        .collect();
    columns.push(target);
    Dataset::new(columns)
}

/// Regression data `y = Xw + noise` with numeric columns `x1..xp` and `y`.
///
/// Features are right-skewed (exponentials of uniforms) so power transforms
/// have something to do; the true weights are drawn from `[-5, 5)`.
pub fn make_regression(n_samples: usize, n_features: usize, noise: f64, seed: u64) -> TabResult<Dataset> {
    if n_features == 0 {
        return Err(TabError::invalid_argument("n_features", "must be at least 1"));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let true_weights: Vec<f64> = (0..n_features).map(|_| rng.gen::<f64>() * 10.0 - 5.0).collect();

    let mut features = vec![Vec::with_capacity(n_samples); n_features];
    let mut y = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        let mut target = 0.0;
        for (f, column) in features.iter_mut().enumerate() {
            let x = (rng.gen::<f64>() * 2.0).exp();
            column.push(x);
            target += x * true_weights[f];
        }
        y.push(target + standard_normal(&mut rng) * noise);
    }
    assemble(features, Column::numeric("y", y))
}

/// Two-class data with numeric columns `x1..xp` and categorical `class`
/// (`"yes"` / `"no"`, roughly balanced). Class means differ by `separation`
/// in every feature.
pub fn make_binary_classification(
    n_samples: usize,
    n_features: usize,
    separation: f64,
    seed: u64,
) -> TabResult<Dataset> {
    if n_features == 0 {
        return Err(TabError::invalid_argument("n_features", "must be at least 1"));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut features = vec![Vec::with_capacity(n_samples); n_features];
    let mut labels = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        let positive = rng.gen_bool(0.5);
        let centre = if positive { separation / 2.0 } else { -separation / 2.0 };
        for column in features.iter_mut() {
            column.push(centre + standard_normal(&mut rng));
        }
        labels.push(if positive { "yes" } else { "no" });
    }
    assemble(features, Column::categorical("class", &labels))
}

/// Data with an exact number of rows per class, in shuffled order.
///
/// Column `class` holds the labels; class `i` is centred at `2 * i` in every
/// feature.
pub fn make_imbalanced_classes(counts: &[(&str, usize)], n_features: usize, seed: u64) -> TabResult<Dataset> {
    if counts.is_empty() {
        return Err(TabError::invalid_argument("counts", "at least one class is required"));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut labels: Vec<(usize, &str)> = counts
        .iter()
        .enumerate()
        .flat_map(|(i, &(label, n))| std::iter::repeat((i, label)).take(n))
        .collect();
    labels.shuffle(&mut rng);

    let mut features = vec![Vec::with_capacity(labels.len()); n_features];
    for &(class, _) in &labels {
        for column in features.iter_mut() {
            column.push(2.0 * class as f64 + standard_normal(&mut rng));
        }
    }
    let names: Vec<&str> = labels.iter().map(|&(_, l)| l).collect();
    assemble(features, Column::categorical("class", &names))
}

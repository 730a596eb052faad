use tabfit_core::{TabError, TabResult};
use tracing::warn;

fn check(truth: &[f64], estimate: &[f64]) -> TabResult<()> {
    if truth.len() != estimate.len() {
        return Err(TabError::DimensionMismatch(format!(
            "{} truth values but {} predictions",
            truth.len(),
            estimate.len()
        )));
    }
    if truth.is_empty() {
        return Err(TabError::InsufficientData("no rows to score".into()));
    }
    Ok(())
}

/// Root mean squared error.
pub fn rmse(truth: &[f64], estimate: &[f64]) -> TabResult<f64> {
    check(truth, estimate)?;
    let mse = truth
        .iter()
        .zip(estimate)
        .map(|(t, e)| (t - e) * (t - e))
        .sum::<f64>()
        / truth.len() as f64;
    Ok(mse.sqrt())
}

/// Mean absolute error.
pub fn mae(truth: &[f64], estimate: &[f64]) -> TabResult<f64> {
    check(truth, estimate)?;
    Ok(truth.iter().zip(estimate).map(|(t, e)| (t - e).abs()).sum::<f64>() / truth.len() as f64)
}

/// Squared Pearson correlation between truth and estimate, in `[0, 1]`.
///
/// Reported as 0 when either side has zero variance.
pub fn rsq(truth: &[f64], estimate: &[f64]) -> TabResult<f64> {
    check(truth, estimate)?;
    let n = truth.len() as f64;
    let mt = truth.iter().sum::<f64>() / n;
    let me = estimate.iter().sum::<f64>() / n;
    let (mut stt, mut see, mut ste) = (0.0, 0.0, 0.0);
    for (t, e) in truth.iter().zip(estimate) {
        stt += (t - mt) * (t - mt);
        see += (e - me) * (e - me);
        ste += (t - mt) * (e - me);
    }
    if stt < 1e-15 || see < 1e-15 {
        warn!("rsq undefined for a constant input, reporting 0");
        return Ok(0.0);
    }
    Ok((ste * ste / (stt * see)).clamp(0.0, 1.0))
}

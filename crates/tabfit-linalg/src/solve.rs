use tabfit_core::{Matrix, TabError, TabResult};

use crate::decomposition::{lu, LuDecomposition};

fn substitute(decomp: &LuDecomposition, b: &[f64]) -> Vec<f64> {
    let n = b.len();

    // Forward substitution: L * y = P * b
    let mut y = vec![0.0; n];
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += decomp.l.get(i, j) * y[j];
        }
        y[i] = b[decomp.pivot[i]] - sum;
    }

    // Back substitution: U * x = y
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += decomp.u.get(i, j) * x[j];
        }
        x[i] = (y[i] - sum) / decomp.u.get(i, i);
    }
    x
}

/// Solve the linear system Ax = b using LU decomposition.
pub fn solve(a: &Matrix, b: &[f64]) -> TabResult<Vec<f64>> {
    if b.len() != a.rows() {
        return Err(TabError::DimensionMismatch(format!(
            "solve: b has {} elements but A is {}x{}",
            b.len(),
            a.rows(),
            a.cols()
        )));
    }
    let decomp = lu(a)?;
    let x = substitute(&decomp, b);
    if x.iter().any(|v| !v.is_finite()) {
        return Err(TabError::SingularMatrix);
    }
    Ok(x)
}

use tabfit_core::{Matrix, TabError, TabResult};

/// LU decomposition result: P * A = L * U
pub struct LuDecomposition {
    pub l: Matrix,
    pub u: Matrix,
    pub pivot: Vec<usize>,
}

/// LU decomposition with partial pivoting.
///
/// A pivot smaller than `n * EPSILON` times the largest entry of `A` is
/// treated as zero and reported as [`TabError::SingularMatrix`].
pub fn lu(a: &Matrix) -> TabResult<LuDecomposition> {
    let n = a.rows();
    if n != a.cols() {
        return Err(TabError::DimensionMismatch(format!(
            "LU requires a square matrix, got {}x{}",
            n,
            a.cols()
        )));
    }

    let scale = a.data().iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let threshold = (n.max(1) as f64) * f64::EPSILON * scale.max(f64::MIN_POSITIVE);

    let mut u = a.data().to_vec();
    let mut l = vec![0.0; n * n];
    let mut pivot: Vec<usize> = (0..n).collect();

    for k in 0..n {
        let mut max_val = u[k * n + k].abs();
        let mut max_row = k;
        for i in (k + 1)..n {
            let v = u[i * n + k].abs();
            if v > max_val {
                max_val = v;
                max_row = i;
            }
        }

        if max_val <= threshold {
            return Err(TabError::SingularMatrix);
        }

        if max_row != k {
            pivot.swap(k, max_row);
            for j in 0..n {
                u.swap(k * n + j, max_row * n + j);
            }
            for j in 0..k {
                l.swap(k * n + j, max_row * n + j);
            }
        }

        l[k * n + k] = 1.0;

        for i in (k + 1)..n {
            let factor = u[i * n + k] / u[k * n + k];
            l[i * n + k] = factor;
            for j in k..n {
                u[i * n + j] -= factor * u[k * n + j];
            }
        }
    }

    Ok(LuDecomposition {
        l: Matrix::new(l, n, n)?,
        u: Matrix::new(u, n, n)?,
        pivot,
    })
}

/// Relative residual below which a Gram column is considered linearly
/// dependent on the columns before it.
pub const ALIAS_TOLERANCE: f64 = 1e-9;

/// Indices of a maximal linearly independent set of columns, chosen greedily
/// in column order from the Gram matrix `XᵀX`.
///
/// Runs a Cholesky factorisation that skips any column whose residual
/// diagonal is at most `ALIAS_TOLERANCE` times its original diagonal.
pub fn independent_columns(gram: &Matrix) -> TabResult<Vec<usize>> {
    let n = gram.rows();
    if n != gram.cols() {
        return Err(TabError::DimensionMismatch(format!(
            "Gram matrix must be square, got {}x{}",
            n,
            gram.cols()
        )));
    }

    let mut kept: Vec<usize> = Vec::with_capacity(n);
    // rows[t] holds the Cholesky row of kept[t], length t + 1
    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(n);

    for j in 0..n {
        let diag = gram.get(j, j);
        if !(diag > 0.0) {
            continue;
        }
        let mut row = Vec::with_capacity(kept.len() + 1);
        for (t, &k) in kept.iter().enumerate() {
            let sum: f64 = (0..t).map(|s| row[s] * rows[t][s]).sum();
            row.push((gram.get(j, k) - sum) / rows[t][t]);
        }
        let residual = diag - row.iter().map(|v| v * v).sum::<f64>();
        if residual > ALIAS_TOLERANCE * diag {
            row.push(residual.sqrt());
            rows.push(row);
            kept.push(j);
        }
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_lu_reconstructs() {
        let a = Matrix::from_rows(&[vec![0.0, 2.0], vec![3.0, 1.0]]).unwrap();
        let d = lu(&a).unwrap();
        let lu = d.l.matmul(&d.u).unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert_abs_diff_eq!(lu.get(i, j), a.get(d.pivot[i], j), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_lu_singular() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 4.0]]).unwrap();
        assert!(matches!(lu(&a), Err(TabError::SingularMatrix)));
    }

    #[test]
    fn test_independent_columns_skips_aliased() {
        // columns: ones, x, 2x, z
        let x = Matrix::from_rows(&[
            vec![1.0, 1.0, 2.0, 0.0],
            vec![1.0, 2.0, 4.0, 1.0],
            vec![1.0, 3.0, 6.0, 0.0],
            vec![1.0, 4.0, 8.0, 1.0],
        ])
        .unwrap();
        let gram = x.transpose().matmul(&x).unwrap();
        assert_eq!(independent_columns(&gram).unwrap(), vec![0, 1, 3]);
    }

    #[test]
    fn test_independent_columns_skips_zero_column() {
        let x = Matrix::from_rows(&[vec![1.0, 0.0], vec![1.0, 0.0]]).unwrap();
        let gram = x.transpose().matmul(&x).unwrap();
        assert_eq!(independent_columns(&gram).unwrap(), vec![0]);
    }
}

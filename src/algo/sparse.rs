//! Sparse matrix assembly and direct solvers.
//!
//! Systems are assembled as triplet lists into a lightweight CSR matrix
//! (duplicates are summed), then handed to `faer` for a sparse Cholesky or
//! LU factorization. A factorization is owned by the solve that builds it.

use faer::col::ColMut;
use faer::linalg::solvers::Solve;
use faer::sparse::linalg::solvers::{Llt, Lu};
use faer::sparse::{SparseColMat, Triplet};
use faer::Side;
use nalgebra::DVector;

use crate::error::{ParamError, Result};

/// Compressed Sparse Row (CSR) matrix.
///
/// Stores a sparse matrix in CSR format for efficient matrix-vector multiplication.
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    /// Number of rows.
    rows: usize,
    /// Number of columns.
    cols: usize,
    /// Row pointers: row_ptr[i] is the index in col_idx/values where row i starts.
    /// Length is rows + 1, with row_ptr[rows] = nnz.
    row_ptr: Vec<usize>,
    /// Column indices for each non-zero value.
    col_idx: Vec<usize>,
    /// Non-zero values.
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Create a CSR matrix from triplets (row, col, value).
    ///
    /// Duplicate entries at the same (row, col) are summed.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, f64)>) -> Self {
        triplets.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            debug_assert!(row < rows && col < cols, "triplet ({row}, {col}) out of bounds");
            match (last, values.last_mut()) {
                (Some(prev), Some(acc)) if prev == (row, col) => *acc += val,
                _ => {
                    col_idx.push(col);
                    values.push(val);
                    row_ptr[row + 1] += 1;
                    last = Some((row, col));
                }
            }
        }

        // Prefix sum of per-row counts
        for r in 0..rows {
            row_ptr[r + 1] += row_ptr[r];
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Get the number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Get the number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Get the number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Value at `(row, col)`, zero when the entry is not stored.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        match self.col_idx[range.clone()].binary_search(&col) {
            Ok(k) => self.values[range.start + k],
            Err(_) => 0.0,
        }
    }

    /// Iterate over the stored entries of one row as `(col, value)`.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        self.col_idx[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Iterate over all stored entries as `(row, col, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.rows).flat_map(move |r| self.row(r).map(move |(c, v)| (r, c, v)))
    }

    /// Multiply matrix by vector: y = A * x.
    pub fn mul_vec(&self, x: &DVector<f64>) -> DVector<f64> {
        assert_eq!(x.len(), self.cols, "Vector dimension mismatch");

        let mut y = DVector::zeros(self.rows);
        for i in 0..self.rows {
            y[i] = self.row(i).map(|(c, v)| v * x[c]).sum();
        }
        y
    }

    fn to_faer(&self, context: &'static str) -> Result<SparseColMat<usize, f64>> {
        let triplets: Vec<Triplet<usize, usize, f64>> = self
            .iter()
            .map(|(r, c, v)| Triplet::new(r, c, v))
            .collect();
        SparseColMat::<usize, f64>::try_new_from_triplets(self.rows, self.cols, &triplets)
            .map_err(|_| ParamError::Assembly { context })
    }
}

/// A sparse factorization ready to solve against any number of right-hand sides.
pub enum Factorization {
    /// Cholesky factor of a symmetric positive definite matrix.
    Cholesky(Llt<usize, f64>),
    /// LU factor of a general square matrix.
    Lu(Lu<usize, f64>),
}

impl Factorization {
    /// Factorize a symmetric positive definite matrix (lower triangle is read).
    pub fn cholesky(a: &CsrMatrix, context: &'static str) -> Result<Self> {
        let mat = a.to_faer(context)?;
        let llt = mat
            .sp_cholesky(Side::Lower)
            .map_err(|_| ParamError::Factorization { context })?;
        Ok(Factorization::Cholesky(llt))
    }

    /// Factorize a general square matrix.
    pub fn lu(a: &CsrMatrix, context: &'static str) -> Result<Self> {
        let mat = a.to_faer(context)?;
        let lu = mat.sp_lu().map_err(|_| ParamError::Factorization { context })?;
        Ok(Factorization::Lu(lu))
    }

    /// Solve in place: `rhs` is overwritten with the solution.
    pub fn solve_in_place(&self, rhs: &mut [f64]) {
        let col = ColMut::from_slice_mut(rhs);
        match self {
            Factorization::Cholesky(llt) => llt.solve_in_place(col.as_mat_mut()),
            Factorization::Lu(lu) => lu.solve_in_place(col.as_mat_mut()),
        }
    }

    /// Solve and return a fresh vector, failing on non-finite output.
    pub fn solve(&self, rhs: &[f64], context: &'static str) -> Result<Vec<f64>> {
        let mut x = rhs.to_vec();
        self.solve_in_place(&mut x);
        if x.iter().all(|v| v.is_finite()) {
            Ok(x)
        } else {
            Err(ParamError::NonFinite { context })
        }
    }
}

impl std::fmt::Debug for Factorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Factorization::Cholesky(_) => f.write_str("Factorization::Cholesky"),
            Factorization::Lu(_) => f.write_str("Factorization::Lu"),
        }
    }
}

/// Accumulates the normal equations `AᵀA x = Aᵀb` of a least-squares system
/// one row at a time, with some variables locked to known values.
///
/// Each row is given as `(variable, coefficient)` pairs; locked variables are
/// moved to the right-hand side.
#[derive(Debug, Clone)]
pub struct LeastSquares {
    /// Maps a variable to its column among the free unknowns.
    free_index: Vec<Option<usize>>,
    locked_value: Vec<f64>,
    nfree: usize,
    triplets: Vec<(usize, usize, f64)>,
    rhs: Vec<f64>,
}

impl LeastSquares {
    /// Create a system over `nvars` variables, all free.
    pub fn new(nvars: usize) -> Self {
        Self::with_locked(nvars, &[])
    }

    /// Create a system over `nvars` variables with `(variable, value)` pairs fixed.
    pub fn with_locked(nvars: usize, locked: &[(usize, f64)]) -> Self {
        let mut locked_value = vec![0.0; nvars];
        let mut is_locked = vec![false; nvars];
        for &(var, value) in locked {
            locked_value[var] = value;
            is_locked[var] = true;
        }

        let mut nfree = 0;
        let free_index = is_locked
            .iter()
            .map(|&l| {
                if l {
                    None
                } else {
                    nfree += 1;
                    Some(nfree - 1)
                }
            })
            .collect();

        Self {
            free_index,
            locked_value,
            nfree,
            triplets: Vec::new(),
            rhs: vec![0.0; nfree],
        }
    }

    /// Number of free unknowns.
    pub fn num_free(&self) -> usize {
        self.nfree
    }

    /// Add the row `Σ coef·x[var] = b`.
    pub fn add_row(&mut self, row: &[(usize, f64)], b: f64) {
        let mut b = b;
        for &(var, coef) in row {
            if self.free_index[var].is_none() {
                b -= coef * self.locked_value[var];
            }
        }
        for &(vi, ci) in row {
            let Some(i) = self.free_index[vi] else {
                continue;
            };
            self.rhs[i] += ci * b;
            for &(vj, cj) in row {
                if let Some(j) = self.free_index[vj] {
                    self.triplets.push((i, j, ci * cj));
                }
            }
        }
    }

    /// Factorize and solve; returns the value of every variable, locked ones included.
    pub fn solve(self, context: &'static str) -> Result<Vec<f64>> {
        let n = self.nfree;
        let mut x = self.locked_value;
        if n == 0 {
            return Ok(x);
        }
        let a = CsrMatrix::from_triplets(n, n, self.triplets);
        let factor = Factorization::cholesky(&a, context)?;
        let solution = factor.solve(&self.rhs, context)?;
        for (var, slot) in self.free_index.iter().enumerate() {
            if let Some(i) = slot {
                x[var] = solution[*i];
            }
        }
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csr_from_triplets() {
        // 2x2 matrix:
        // [ 4  1 ]
        // [ 1  3 ]
        let triplets = vec![(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)];
        let a = CsrMatrix::from_triplets(2, 2, triplets);

        assert_eq!(a.nrows(), 2);
        assert_eq!(a.ncols(), 2);
        assert_eq!(a.nnz(), 4);
        assert_eq!(a.get(1, 1), 3.0);
    }

    #[test]
    fn test_csr_from_triplets_with_duplicates() {
        let triplets = vec![
            (1, 1, 3.0),
            (0, 0, 2.0),
            (0, 1, 1.0),
            (0, 0, 2.0), // Duplicate: should sum to 4.0
            (1, 0, 1.0),
        ];
        let a = CsrMatrix::from_triplets(2, 2, triplets);

        assert_eq!(a.nnz(), 4);
        assert!((a.get(0, 0) - 4.0).abs() < 1e-12);

        let y = a.mul_vec(&DVector::from_vec(vec![1.0, 0.0]));
        assert!((y[0] - 4.0).abs() < 1e-10);
        assert!((y[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_csr_empty_rows() {
        let a = CsrMatrix::from_triplets(4, 4, vec![(3, 0, 1.0), (1, 2, 2.0)]);
        assert_eq!(a.row(0).count(), 0);
        assert_eq!(a.row(2).count(), 0);
        assert_eq!(a.get(1, 2), 2.0);
        assert_eq!(a.get(3, 0), 1.0);
        assert_eq!(a.iter().count(), 2);
    }

    #[test]
    fn test_cholesky_solve() {
        // [ 4  1 ] x = [ 1 ]   -> x = (1/11, 7/11)
        // [ 1  3 ]     [ 2 ]
        let a = CsrMatrix::from_triplets(
            2,
            2,
            vec![(0, 0, 4.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)],
        );
        let factor = Factorization::cholesky(&a, "test").unwrap();
        let x = factor.solve(&[1.0, 2.0], "test").unwrap();

        assert!((x[0] - 1.0 / 11.0).abs() < 1e-12);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_lu_solve_indefinite() {
        // [ 0  1 ] x = [ 2 ]  -> x = (3, 2)
        // [ 1  0 ]     [ 3 ]
        let a = CsrMatrix::from_triplets(2, 2, vec![(0, 1, 1.0), (1, 0, 1.0)]);
        let factor = Factorization::lu(&a, "test").unwrap();
        let x = factor.solve(&[2.0, 3.0], "test").unwrap();

        assert!((x[0] - 3.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_least_squares_with_lock() {
        // x0 locked to 1, rows: x1 - x0 = 1, x1 = 2 -> x1 = 2 exactly
        let mut ls = LeastSquares::with_locked(2, &[(0, 1.0)]);
        assert_eq!(ls.num_free(), 1);
        ls.add_row(&[(1, 1.0), (0, -1.0)], 1.0);
        ls.add_row(&[(1, 1.0)], 2.0);

        let x = ls.solve("test").unwrap();
        assert_eq!(x[0], 1.0);
        assert!((x[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_least_squares_overdetermined() {
        // x = 1, x = 3 -> x = 2
        let mut ls = LeastSquares::new(1);
        ls.add_row(&[(0, 1.0)], 1.0);
        ls.add_row(&[(0, 1.0)], 3.0);
        let x = ls.solve("test").unwrap();
        assert!((x[0] - 2.0).abs() < 1e-12);
    }
}

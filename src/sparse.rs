// Copyright 2022 Lucas Javaudin
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// https://creativecommons.org/licenses/by-nc-nd/4.0/legalcode

//! Sparse matrices used to store the Jacobians of the system.
//!
//! Matrices are assembled as a [TripletMatrix] (random-access writes) and then compressed into a
//! column-compressed [SparseMatrix] for the linear algebra of the adjoint method.
use hashbrown::HashMap;
use sprs::prod::{mul_acc_mat_vec_csc, mul_acc_mat_vec_csr};
use sprs::{CsMat, TriMat};

use crate::error::{check_dimension, AdjointError, AdjointResult};

/// Sparse matrix under construction.
///
/// Writing a value replaces any previous value at the same coordinates and writing `0.0` removes
/// the entry.
#[derive(Clone, Debug, Default)]
pub struct TripletMatrix {
    nrows: usize,
    ncols: usize,
    entries: HashMap<(usize, usize), f64>,
}

impl TripletMatrix {
    /// Creates an empty [TripletMatrix] with the given dimensions.
    pub fn new(nrows: usize, ncols: usize) -> Self {
        TripletMatrix {
            nrows,
            ncols,
            entries: HashMap::new(),
        }
    }

    /// Sets the value at the given coordinates.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        assert!(
            row < self.nrows && col < self.ncols,
            "Coordinates ({row}, {col}) out of bounds for a {}x{} matrix",
            self.nrows,
            self.ncols
        );
        if value == 0.0 {
            self.entries.remove(&(row, col));
        } else {
            self.entries.insert((row, col), value);
        }
    }

    /// Returns the value at the given coordinates (`0.0` if there is no entry).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.entries.get(&(row, col)).copied().unwrap_or(0.0)
    }

    /// Returns the number of non-zero entries.
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    /// Compresses the matrix.
    pub fn to_sparse(&self) -> SparseMatrix {
        let mut triplets = TriMat::with_capacity((self.nrows, self.ncols), self.entries.len());
        for (&(row, col), &value) in self.entries.iter() {
            triplets.add_triplet(row, col, value);
        }
        SparseMatrix(triplets.to_csc())
    }
}

/// Sparse matrix in column-compressed format.
///
/// Row indices are sorted within each column.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseMatrix(CsMat<f64>);

impl SparseMatrix {
    /// Returns the number of rows.
    pub fn nrows(&self) -> usize {
        self.0.rows()
    }

    /// Returns the number of columns.
    pub fn ncols(&self) -> usize {
        self.0.cols()
    }

    /// Returns the number of non-zero entries.
    pub fn nnz(&self) -> usize {
        self.0.nnz()
    }

    /// Returns the underlying [CsMat].
    pub const fn as_csc(&self) -> &CsMat<f64> {
        &self.0
    }

    /// Returns an iterator over the `(row, value)` entries of a column.
    pub fn column(&self, col: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.0.indptr().outer_inds_sz(col);
        self.0.indices()[range.clone()]
            .iter()
            .copied()
            .zip(self.0.data()[range].iter().copied())
    }

    /// Returns the value at the given coordinates (`0.0` if there is no entry).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.0.get(row, col).copied().unwrap_or(0.0)
    }

    /// Returns an iterator over the `(row, col, value)` entries, in column-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.ncols()).flat_map(move |col| self.column(col).map(move |(row, v)| (row, col, v)))
    }

    /// Computes `A x`.
    pub fn mul_vec(&self, x: &[f64]) -> AdjointResult<Vec<f64>> {
        check_dimension(self.ncols(), x.len())?;
        let mut y = vec![0.0; self.nrows()];
        mul_acc_mat_vec_csc(self.0.view(), x, &mut y);
        Ok(y)
    }

    /// Computes `A^T y`.
    pub fn transpose_mul_vec(&self, y: &[f64]) -> AdjointResult<Vec<f64>> {
        check_dimension(self.nrows(), y.len())?;
        let mut x = vec![0.0; self.ncols()];
        // The transpose of a CSC matrix is a CSR view on the same storage.
        mul_acc_mat_vec_csr(self.0.transpose_view(), y, &mut x);
        Ok(x)
    }

    /// Solves `A^T x = b` where `A` is a square lower-triangular matrix.
    ///
    /// Column `j` of `A` is row `j` of `A^T`, so the system is solved by back substitution, from
    /// the last unknown to the first.
    pub fn solve_lower_transposed(&self, b: &[f64]) -> AdjointResult<Vec<f64>> {
        if self.nrows() != self.ncols() {
            return Err(AdjointError::Configuration(format!(
                "Cannot solve a triangular system with a {}x{} matrix",
                self.nrows(),
                self.ncols()
            )));
        }
        check_dimension(self.nrows(), b.len())?;
        let mut x = vec![0.0; self.ncols()];
        for j in (0..self.ncols()).rev() {
            let mut diagonal = 0.0;
            let mut acc = b[j];
            for (row, v) in self.column(j) {
                match row.cmp(&j) {
                    std::cmp::Ordering::Less => {
                        return Err(AdjointError::Configuration(format!(
                            "Matrix is not lower triangular (entry at ({row}, {j}))"
                        )));
                    }
                    std::cmp::Ordering::Equal => diagonal = v,
                    std::cmp::Ordering::Greater => acc -= v * x[row],
                }
            }
            if diagonal == 0.0 {
                return Err(AdjointError::NumericalInvalidity {
                    what: "diagonal of the triangular system",
                    value: diagonal,
                });
            }
            x[j] = acc / diagonal;
        }
        Ok(x)
    }
}

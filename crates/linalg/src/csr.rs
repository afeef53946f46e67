//! Compressed sparse row matrices.

use ndarray::Array2;
use rayon::prelude::*;

use crate::error::LinalgError;

/// Real matrix in compressed sparse row (CSR) format.
///
/// Column indices within each row are strictly increasing and explicit
/// zeros are never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl CsrMatrix {
    /// Builds a matrix from raw CSR arrays, checking their consistency.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::InvalidStructure`] if `indptr` has the wrong
    /// length or is not monotone, if `indices` and `data` differ in length,
    /// or if a row's column indices are out of range or not strictly
    /// increasing.
    pub fn try_new(
        nrows: usize,
        ncols: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<f64>,
    ) -> Result<Self, LinalgError> {
        if indptr.len() != nrows + 1 {
            return Err(LinalgError::InvalidStructure {
                reason: format!(
                    "indptr has length {}, expected {}",
                    indptr.len(),
                    nrows + 1
                ),
            });
        }
        if indices.len() != data.len() {
            return Err(LinalgError::InvalidStructure {
                reason: format!(
                    "{} column indices but {} values",
                    indices.len(),
                    data.len()
                ),
            });
        }
        if indptr[0] != 0 || indptr[nrows] != indices.len() {
            return Err(LinalgError::InvalidStructure {
                reason: "indptr must start at 0 and end at the number of entries".to_string(),
            });
        }
        for row in 0..nrows {
            let (start, end) = (indptr[row], indptr[row + 1]);
            if start > end {
                return Err(LinalgError::InvalidStructure {
                    reason: format!("indptr decreases at row {row}"),
                });
            }
            let cols = &indices[start..end];
            if cols.iter().any(|&c| c >= ncols) {
                return Err(LinalgError::InvalidStructure {
                    reason: format!("row {row} has a column index >= {ncols}"),
                });
            }
            if cols.windows(2).any(|w| w[0] >= w[1]) {
                return Err(LinalgError::InvalidStructure {
                    reason: format!("column indices of row {row} are not strictly increasing"),
                });
            }
        }

        let mut m = Self {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        };
        m.prune();
        Ok(m)
    }

    /// Builds a matrix from `(row, col, value)` triplets.
    ///
    /// Duplicate entries are summed; entries that sum to zero are dropped.
    pub fn from_triplets<I>(nrows: usize, ncols: usize, entries: I) -> Result<Self, LinalgError>
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        let mut sorted: Vec<(usize, usize, f64)> = entries.into_iter().collect();
        if let Some(&(row, col, _)) = sorted.iter().find(|&&(r, c, _)| r >= nrows || c >= ncols) {
            return Err(LinalgError::IndexOutOfBounds {
                row,
                col,
                rows: nrows,
                cols: ncols,
            });
        }
        sorted.sort_by_key(|&(r, c, _)| (r, c));

        let mut indptr = vec![0usize; nrows + 1];
        let mut indices: Vec<usize> = Vec::with_capacity(sorted.len());
        let mut data: Vec<f64> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;

        for (r, c, v) in sorted {
            if last == Some((r, c)) {
                if let Some(value) = data.last_mut() {
                    *value += v;
                }
                continue;
            }
            indptr[r + 1] += 1;
            indices.push(c);
            data.push(v);
            last = Some((r, c));
        }
        for i in 1..=nrows {
            indptr[i] += indptr[i - 1];
        }

        let mut m = Self {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        };
        m.prune();
        Ok(m)
    }

    /// Converts a dense matrix, keeping its nonzero entries.
    pub fn from_dense(a: &Array2<f64>) -> Self {
        let (nrows, ncols) = a.dim();
        let mut indptr = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for row in a.rows() {
            for (j, &v) in row.iter().enumerate() {
                if v != 0.0 {
                    indices.push(j);
                    data.push(v);
                }
            }
            indptr.push(indices.len());
        }
        Self {
            nrows,
            ncols,
            indptr,
            indices,
            data,
        }
    }

    /// Returns the `n x n` identity matrix.
    pub fn identity(n: usize) -> Self {
        Self {
            nrows: n,
            ncols: n,
            indptr: (0..=n).collect(),
            indices: (0..n).collect(),
            data: vec![1.0; n],
        }
    }

    // Removes stored zeros, keeping the arrays consistent.
    fn prune(&mut self) {
        if self.data.iter().all(|&v| v != 0.0) {
            return;
        }
        let mut indptr = Vec::with_capacity(self.nrows + 1);
        let mut indices = Vec::with_capacity(self.indices.len());
        let mut data = Vec::with_capacity(self.data.len());
        indptr.push(0);
        for row in 0..self.nrows {
            for k in self.indptr[row]..self.indptr[row + 1] {
                if self.data[k] != 0.0 {
                    indices.push(self.indices[k]);
                    data.push(self.data[k]);
                }
            }
            indptr.push(indices.len());
        }
        self.indptr = indptr;
        self.indices = indices;
        self.data = data;
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns.
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Row pointer array of length `nrows + 1`.
    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    /// Column indices of the stored entries.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Values of the stored entries.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Iterates over the `(column, value)` pairs stored in row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= nrows`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.indptr[i]..self.indptr[i + 1];
        self.indices[range.clone()]
            .iter()
            .copied()
            .zip(self.data[range].iter().copied())
    }

    /// Returns entry `(i, j)`, zero when it is not stored.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        if i >= self.nrows {
            return 0.0;
        }
        let range = self.indptr[i]..self.indptr[i + 1];
        match self.indices[range.clone()].binary_search(&j) {
            Ok(pos) => self.data[range.start + pos],
            Err(_) => 0.0,
        }
    }

    /// Sum of each row.
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.nrows).map(|i| self.row(i).map(|(_, v)| v).sum()).collect()
    }

    /// Computes `y = A x`, evaluating rows in parallel.
    ///
    /// # Panics
    ///
    /// Panics if `x.len() != ncols` or `y.len() != nrows`.
    pub fn matvec(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.ncols, "matvec: x has the wrong length");
        assert_eq!(y.len(), self.nrows, "matvec: y has the wrong length");
        y.par_iter_mut().enumerate().for_each(|(i, yi)| {
            let (start, end) = (self.indptr[i], self.indptr[i + 1]);
            *yi = self.indices[start..end]
                .iter()
                .zip(&self.data[start..end])
                .map(|(&j, &v)| v * x[j])
                .sum();
        });
    }

    /// Returns the transpose.
    pub fn transpose(&self) -> Self {
        let mut counts = vec![0usize; self.ncols + 1];
        for &j in &self.indices {
            counts[j + 1] += 1;
        }
        for j in 1..=self.ncols {
            counts[j] += counts[j - 1];
        }
        let indptr = counts.clone();
        let mut next = counts;
        let mut indices = vec![0usize; self.nnz()];
        let mut data = vec![0.0; self.nnz()];
        // Rows are visited in order, so each transposed row stays sorted.
        for i in 0..self.nrows {
            for k in self.indptr[i]..self.indptr[i + 1] {
                let j = self.indices[k];
                let dest = next[j];
                indices[dest] = i;
                data[dest] = self.data[k];
                next[j] += 1;
            }
        }
        Self {
            nrows: self.ncols,
            ncols: self.nrows,
            indptr,
            indices,
            data,
        }
    }

    /// Returns `diag(left) A diag(right)`, preserving the sparsity pattern.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::DimensionMismatch`] if the scaling vectors do
    /// not match the matrix shape.
    pub fn scale(&self, left: &[f64], right: &[f64]) -> Result<Self, LinalgError> {
        if left.len() != self.nrows {
            return Err(LinalgError::DimensionMismatch {
                expected: self.nrows,
                got: left.len(),
            });
        }
        if right.len() != self.ncols {
            return Err(LinalgError::DimensionMismatch {
                expected: self.ncols,
                got: right.len(),
            });
        }
        let mut out = self.clone();
        for i in 0..self.nrows {
            for k in self.indptr[i]..self.indptr[i + 1] {
                out.data[k] *= left[i] * right[self.indices[k]];
            }
        }
        out.prune();
        Ok(out)
    }

    /// Extracts the block with the given rows and columns, in the given
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::IndexOutOfBounds`] for an index outside the
    /// matrix.
    pub fn submatrix(&self, rows: &[usize], cols: &[usize]) -> Result<Self, LinalgError> {
        let mut col_map: Vec<Option<usize>> = vec![None; self.ncols];
        for (new, &c) in cols.iter().enumerate() {
            if c >= self.ncols {
                return Err(LinalgError::IndexOutOfBounds {
                    row: 0,
                    col: c,
                    rows: self.nrows,
                    cols: self.ncols,
                });
            }
            col_map[c] = Some(new);
        }

        let mut triplets = Vec::new();
        for (new_row, &r) in rows.iter().enumerate() {
            if r >= self.nrows {
                return Err(LinalgError::IndexOutOfBounds {
                    row: r,
                    col: 0,
                    rows: self.nrows,
                    cols: self.ncols,
                });
            }
            for (c, v) in self.row(r) {
                if let Some(new_col) = col_map[c] {
                    triplets.push((new_row, new_col, v));
                }
            }
        }
        Self::from_triplets(rows.len(), cols.len(), triplets)
    }

    /// Expands to a dense matrix.
    pub fn to_dense(&self) -> Array2<f64> {
        let mut a = Array2::zeros((self.nrows, self.ncols));
        for i in 0..self.nrows {
            for (j, v) in self.row(i) {
                a[[i, j]] = v;
            }
        }
        a
    }
}

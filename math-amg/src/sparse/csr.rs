//! Compressed Sparse Row (CSR) matrix format
//!
//! CSR format stores:
//! - `values`: Non-zero entries in row-major order
//! - `col_indices`: Column index for each value, sorted and unique within a row
//! - `row_ptrs`: Index into values/col_indices where each row starts

use crate::error::{AmgError, Result};
use crate::parallel::{PARALLEL_ROW_THRESHOLD, parallel_fill};
use crate::traits::LinearOperator;
use ndarray::{Array1, Array2};
use std::ops::Range;

/// Relative magnitude below which products in [`CsrMatrix::matmul`] are dropped
const PRODUCT_DROP_TOL: f64 = 1e-14;

/// Compressed Sparse Row (CSR) matrix format
///
/// Memory-efficient storage for sparse matrices with O(nnz) space complexity.
/// Every constructor keeps column indices sorted and unique within each row.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    /// Number of rows
    pub num_rows: usize,
    /// Number of columns
    pub num_cols: usize,
    /// Non-zero values in row-major order
    pub values: Vec<f64>,
    /// Column indices for each value
    pub col_indices: Vec<usize>,
    /// Row pointers: row_ptrs[i] is the start index in values/col_indices for row i
    /// row_ptrs[num_rows] = nnz (total number of non-zeros)
    pub row_ptrs: Vec<usize>,
}

impl CsrMatrix {
    /// Create a new empty CSR matrix
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            num_rows,
            num_cols,
            values: Vec::new(),
            col_indices: Vec::new(),
            row_ptrs: vec![0; num_rows + 1],
        }
    }

    /// Create a CSR matrix from raw components
    ///
    /// The arrays are validated: `row_ptrs` must be non-decreasing with
    /// `num_rows + 1` entries ending at `nnz`, column indices must be in range
    /// and strictly increasing within each row, and values must be finite.
    pub fn from_raw_parts(
        num_rows: usize,
        num_cols: usize,
        row_ptrs: Vec<usize>,
        col_indices: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if row_ptrs.len() != num_rows + 1 {
            return Err(AmgError::DimensionMismatch {
                context: "row_ptrs",
                expected: num_rows + 1,
                got: row_ptrs.len(),
            });
        }
        if col_indices.len() != values.len() {
            return Err(AmgError::DimensionMismatch {
                context: "col_indices",
                expected: values.len(),
                got: col_indices.len(),
            });
        }
        if row_ptrs[0] != 0 || row_ptrs[num_rows] != values.len() {
            return Err(AmgError::malformed(format!(
                "row_ptrs must start at 0 and end at nnz = {}",
                values.len()
            )));
        }

        for i in 0..num_rows {
            let (start, end) = (row_ptrs[i], row_ptrs[i + 1]);
            if start > end {
                return Err(AmgError::malformed(format!(
                    "row_ptrs decreases at row {i}"
                )));
            }
            for idx in start..end {
                let j = col_indices[idx];
                if j >= num_cols {
                    return Err(AmgError::malformed(format!(
                        "column index {j} out of range in row {i} ({num_cols} columns)"
                    )));
                }
                if idx > start && col_indices[idx - 1] >= j {
                    return Err(AmgError::malformed(format!(
                        "column indices of row {i} are not sorted and unique"
                    )));
                }
                if !values[idx].is_finite() {
                    return Err(AmgError::NonFiniteValue { row: i, col: j });
                }
            }
        }

        Ok(Self {
            num_rows,
            num_cols,
            row_ptrs,
            col_indices,
            values,
        })
    }

    /// Create a CSR matrix from a dense matrix
    ///
    /// Only stores entries with magnitude > threshold
    pub fn from_dense(dense: &Array2<f64>, threshold: f64) -> Self {
        let num_rows = dense.nrows();
        let num_cols = dense.ncols();

        let mut values = Vec::new();
        let mut col_indices = Vec::new();
        let mut row_ptrs = vec![0usize; num_rows + 1];

        for i in 0..num_rows {
            for j in 0..num_cols {
                let val = dense[[i, j]];
                if val.abs() > threshold {
                    values.push(val);
                    col_indices.push(j);
                }
            }
            row_ptrs[i + 1] = values.len();
        }

        Self {
            num_rows,
            num_cols,
            values,
            col_indices,
            row_ptrs,
        }
    }

    /// Create a CSR matrix from COO (Coordinate) format triplets
    ///
    /// Triplets are (row, col, value). Duplicate entries are summed. Indices
    /// out of range and non-finite values are rejected.
    pub fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        triplets: Vec<(usize, usize, f64)>,
    ) -> Result<Self> {
        for &(row, col, val) in &triplets {
            if row >= num_rows || col >= num_cols {
                return Err(AmgError::malformed(format!(
                    "triplet ({row}, {col}) outside a {num_rows}x{num_cols} matrix"
                )));
            }
            if !val.is_finite() {
                return Err(AmgError::NonFiniteValue { row, col });
            }
        }
        Ok(Self::assemble(num_rows, num_cols, triplets))
    }

    /// Assemble triplets already known to be in range
    pub(crate) fn assemble(
        num_rows: usize,
        num_cols: usize,
        mut triplets: Vec<(usize, usize, f64)>,
    ) -> Self {
        triplets.sort_unstable_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut col_indices: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut row_counts = vec![0usize; num_rows + 1];

        let mut prev = None;
        for (row, col, val) in triplets {
            if prev == Some((row, col)) {
                if let Some(last) = values.last_mut() {
                    *last += val;
                }
            } else {
                values.push(val);
                col_indices.push(col);
                row_counts[row + 1] += 1;
                prev = Some((row, col));
            }
        }

        for i in 0..num_rows {
            row_counts[i + 1] += row_counts[i];
        }

        Self {
            num_rows,
            num_cols,
            values,
            col_indices,
            row_ptrs: row_counts,
        }
    }

    /// Number of non-zero entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Average number of stored entries per row
    pub fn average_row_density(&self) -> f64 {
        if self.num_rows == 0 {
            0.0
        } else {
            self.nnz() as f64 / self.num_rows as f64
        }
    }

    /// Get the range of indices in values/col_indices for a given row
    pub fn row_range(&self, row: usize) -> Range<usize> {
        self.row_ptrs[row]..self.row_ptrs[row + 1]
    }

    /// Get the (col, value) pairs for a row
    pub fn row_entries(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.row_range(row);
        self.col_indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Column indices of a row
    pub fn row_cols(&self, row: usize) -> &[usize] {
        &self.col_indices[self.row_range(row)]
    }

    /// Check that the operator is square
    pub fn ensure_square(&self) -> Result<()> {
        if self.num_rows != self.num_cols {
            return Err(AmgError::malformed(format!(
                "operator must be square, got {}x{}",
                self.num_rows, self.num_cols
            )));
        }
        Ok(())
    }

    /// Check that every stored value is finite
    pub fn ensure_finite(&self) -> Result<()> {
        for i in 0..self.num_rows {
            for (j, v) in self.row_entries(i) {
                if !v.is_finite() {
                    return Err(AmgError::NonFiniteValue { row: i, col: j });
                }
            }
        }
        Ok(())
    }

    /// Numerical symmetry check: |a_ij - a_ji| <= tol * max|a|
    pub fn is_symmetric(&self, tol: f64) -> bool {
        if self.num_rows != self.num_cols {
            return false;
        }
        let scale = self.values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let limit = tol * scale.max(f64::MIN_POSITIVE);
        (0..self.num_rows).all(|i| {
            self.row_entries(i)
                .all(|(j, a_ij)| (a_ij - self.get(j, i)).abs() <= limit)
        })
    }

    /// Matrix-vector product: y = A * x
    ///
    /// Rows are processed in parallel when the `rayon` feature is enabled and
    /// the matrix is large enough to benefit from it.
    pub fn matvec(&self, x: &Array1<f64>) -> Array1<f64> {
        let mut y = Array1::zeros(self.num_rows);
        self.matvec_into(x, &mut y);
        y
    }

    /// Matrix-vector product into an existing buffer: y = A * x
    pub fn matvec_into(&self, x: &Array1<f64>, y: &mut Array1<f64>) {
        assert_eq!(x.len(), self.num_cols, "Input vector size mismatch");
        assert_eq!(y.len(), self.num_rows, "Output vector size mismatch");

        if self.num_rows >= PARALLEL_ROW_THRESHOLD {
            if let Some(out) = y.as_slice_mut() {
                parallel_fill(out, |i| self.row_dot(i, x));
                return;
            }
        }

        for i in 0..self.num_rows {
            y[i] = self.row_dot(i, x);
        }
    }

    /// Residual into an existing buffer: r = b - A * x
    pub fn residual_into(&self, x: &Array1<f64>, b: &Array1<f64>, r: &mut Array1<f64>) {
        assert_eq!(b.len(), self.num_rows, "Right-hand side size mismatch");
        self.matvec_into(x, r);
        for (ri, bi) in r.iter_mut().zip(b.iter()) {
            *ri = *bi - *ri;
        }
    }

    /// Residual: r = b - A * x
    pub fn residual(&self, x: &Array1<f64>, b: &Array1<f64>) -> Array1<f64> {
        let mut r = Array1::zeros(self.num_rows);
        self.residual_into(x, b, &mut r);
        r
    }

    /// Inner product of row i with x
    #[inline]
    pub fn row_dot(&self, i: usize, x: &Array1<f64>) -> f64 {
        let mut sum = 0.0;
        for idx in self.row_range(i) {
            sum += self.values[idx] * x[self.col_indices[idx]];
        }
        sum
    }

    /// Matrix-vector product with accumulation: y += A * x
    pub fn matvec_add(&self, x: &Array1<f64>, y: &mut Array1<f64>) {
        assert_eq!(x.len(), self.num_cols, "Input vector size mismatch");
        assert_eq!(y.len(), self.num_rows, "Output vector size mismatch");

        for i in 0..self.num_rows {
            y[i] += self.row_dot(i, x);
        }
    }

    /// Transpose matrix-vector product: y = A^T * x
    pub fn matvec_transpose(&self, x: &Array1<f64>) -> Array1<f64> {
        assert_eq!(x.len(), self.num_rows, "Input vector size mismatch");

        let mut y = Array1::zeros(self.num_cols);

        for i in 0..self.num_rows {
            for idx in self.row_range(i) {
                let j = self.col_indices[idx];
                y[j] += self.values[idx] * x[i];
            }
        }

        y
    }

    /// Get element at (i, j), returns 0 if not stored
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let range = self.row_range(i);
        match self.col_indices[range.clone()].binary_search(&j) {
            Ok(pos) => self.values[range.start + pos],
            Err(_) => 0.0,
        }
    }

    /// Extract diagonal elements
    pub fn diagonal(&self) -> Array1<f64> {
        let n = self.num_rows.min(self.num_cols);
        Array1::from_iter((0..n).map(|i| self.get(i, i)))
    }

    /// Scale row i by s[i]: A <- diag(s) * A
    pub fn scale_rows(&mut self, s: &Array1<f64>) {
        assert_eq!(s.len(), self.num_rows, "Row scaling size mismatch");
        for i in 0..self.num_rows {
            let range = self.row_range(i);
            for v in &mut self.values[range] {
                *v *= s[i];
            }
        }
    }

    /// Compute self + alpha * other, merging the sorted row patterns
    pub fn add_scaled(&self, alpha: f64, other: &CsrMatrix) -> CsrMatrix {
        assert_eq!(self.num_rows, other.num_rows, "Row count mismatch");
        assert_eq!(self.num_cols, other.num_cols, "Column count mismatch");

        let mut builder =
            CsrBuilder::with_capacity(self.num_rows, self.num_cols, self.nnz() + other.nnz());
        let mut merged: Vec<(usize, f64)> = Vec::new();

        for i in 0..self.num_rows {
            merged.clear();
            let mut a = self.row_entries(i).peekable();
            let mut b = other.row_entries(i).peekable();
            loop {
                match (a.peek().copied(), b.peek().copied()) {
                    (Some((ja, va)), Some((jb, vb))) => {
                        if ja == jb {
                            merged.push((ja, va + alpha * vb));
                            a.next();
                            b.next();
                        } else if ja < jb {
                            merged.push((ja, va));
                            a.next();
                        } else {
                            merged.push((jb, alpha * vb));
                            b.next();
                        }
                    }
                    (Some((ja, va)), None) => {
                        merged.push((ja, va));
                        a.next();
                    }
                    (None, Some((jb, vb))) => {
                        merged.push((jb, alpha * vb));
                        b.next();
                    }
                    (None, None) => break,
                }
            }
            builder.add_row_entries(merged.iter().copied());
        }

        builder.finish()
    }

    /// Create identity matrix in CSR format
    pub fn identity(n: usize) -> Self {
        Self {
            num_rows: n,
            num_cols: n,
            values: vec![1.0; n],
            col_indices: (0..n).collect(),
            row_ptrs: (0..=n).collect(),
        }
    }

    /// Create diagonal matrix from vector
    pub fn from_diagonal(diag: &Array1<f64>) -> Self {
        let n = diag.len();
        Self {
            num_rows: n,
            num_cols: n,
            values: diag.to_vec(),
            col_indices: (0..n).collect(),
            row_ptrs: (0..=n).collect(),
        }
    }

    /// Convert to dense matrix (for coarse solves and small matrices)
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.num_rows, self.num_cols));

        for i in 0..self.num_rows {
            for (j, v) in self.row_entries(i) {
                dense[[i, j]] = v;
            }
        }

        dense
    }

    /// Transpose in O(nnz) with a counting sort over columns
    ///
    /// Rows of the result come out with sorted column indices.
    pub fn transpose(&self) -> CsrMatrix {
        let m = self.num_rows;
        let n = self.num_cols;
        let nnz = self.nnz();

        let mut row_ptrs = vec![0usize; n + 1];
        for &j in &self.col_indices {
            row_ptrs[j + 1] += 1;
        }
        for j in 0..n {
            row_ptrs[j + 1] += row_ptrs[j];
        }

        let mut next = row_ptrs.clone();
        let mut col_indices = vec![0usize; nnz];
        let mut values = vec![0.0; nnz];
        for i in 0..m {
            for (j, v) in self.row_entries(i) {
                let dst = next[j];
                col_indices[dst] = i;
                values[dst] = v;
                next[j] += 1;
            }
        }

        CsrMatrix {
            num_rows: n,
            num_cols: m,
            values,
            col_indices,
            row_ptrs,
        }
    }

    /// Sparse matrix-matrix multiplication: C = A * B
    ///
    /// Row-by-row Gustavson product with a dense accumulator and marker array.
    /// Entries whose magnitude falls below a tiny fraction of the row maximum
    /// (cancellation noise from the Galerkin product) are dropped.
    pub fn matmul(&self, other: &CsrMatrix) -> CsrMatrix {
        assert_eq!(
            self.num_cols, other.num_rows,
            "Matrix dimension mismatch: A.cols ({}) != B.rows ({})",
            self.num_cols, other.num_rows
        );

        let m = self.num_rows;
        let n = other.num_cols;

        if m == 0 || n == 0 || self.nnz() == 0 || other.nnz() == 0 {
            return CsrMatrix::new(m, n);
        }

        let mut accumulator = vec![0.0; n];
        let mut marker = vec![usize::MAX; n];
        let mut touched: Vec<usize> = Vec::new();
        let mut builder = CsrBuilder::with_capacity(m, n, self.nnz() + other.nnz());

        for i in 0..m {
            touched.clear();
            for (k, a_ik) in self.row_entries(i) {
                for (j, b_kj) in other.row_entries(k) {
                    if marker[j] != i {
                        marker[j] = i;
                        accumulator[j] = 0.0;
                        touched.push(j);
                    }
                    accumulator[j] += a_ik * b_kj;
                }
            }

            touched.sort_unstable();
            let row_max = touched
                .iter()
                .fold(0.0_f64, |acc, &j| acc.max(accumulator[j].abs()));
            let drop_below = PRODUCT_DROP_TOL * row_max;

            builder.add_row_entries(
                touched
                    .iter()
                    .map(|&j| (j, accumulator[j]))
                    .filter(|&(_, v)| v.abs() > drop_below),
            );
        }

        builder.finish()
    }
}

impl LinearOperator for CsrMatrix {
    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn num_cols(&self) -> usize {
        self.num_cols
    }

    fn apply(&self, x: &Array1<f64>) -> Array1<f64> {
        self.matvec(x)
    }

    fn apply_transpose(&self, x: &Array1<f64>) -> Array1<f64> {
        self.matvec_transpose(x)
    }
}

/// Builder for constructing CSR matrices row by row
pub struct CsrBuilder {
    num_rows: usize,
    num_cols: usize,
    values: Vec<f64>,
    col_indices: Vec<usize>,
    row_ptrs: Vec<usize>,
    current_row: usize,
}

impl CsrBuilder {
    /// Create a new CSR builder
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self::with_capacity(num_rows, num_cols, 0)
    }

    /// Create a new CSR builder with estimated non-zeros
    pub fn with_capacity(num_rows: usize, num_cols: usize, nnz_estimate: usize) -> Self {
        let mut row_ptrs = Vec::with_capacity(num_rows + 1);
        row_ptrs.push(0);
        Self {
            num_rows,
            num_cols,
            values: Vec::with_capacity(nnz_estimate),
            col_indices: Vec::with_capacity(nnz_estimate),
            row_ptrs,
            current_row: 0,
        }
    }

    /// Add entries for the current row (must be added in increasing column order)
    ///
    /// Exact zeros are not stored.
    pub fn add_row_entries(&mut self, entries: impl Iterator<Item = (usize, f64)>) {
        debug_assert!(self.current_row < self.num_rows, "Too many rows added");
        for (col, val) in entries {
            debug_assert!(col < self.num_cols, "Column index out of range");
            if val != 0.0 {
                self.values.push(val);
                self.col_indices.push(col);
            }
        }
        self.row_ptrs.push(self.values.len());
        self.current_row += 1;
    }

    /// Finish building and return the CSR matrix
    pub fn finish(mut self) -> CsrMatrix {
        // Fill remaining rows if not all rows were added
        while self.current_row < self.num_rows {
            self.row_ptrs.push(self.values.len());
            self.current_row += 1;
        }

        CsrMatrix {
            num_rows: self.num_rows,
            num_cols: self.num_cols,
            values: self.values,
            col_indices: self.col_indices,
            row_ptrs: self.row_ptrs,
        }
    }
}

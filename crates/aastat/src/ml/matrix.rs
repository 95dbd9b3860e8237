use std::fmt::{self, Debug};
use std::ops::{Index, IndexMut};

/// Small dense row-major matrix, sized for the normal equations of a
/// handful of fit parameters
#[derive(Clone, PartialEq)]
pub struct Matrix {
    data: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
}

impl Matrix {
    /// # Panics
    ///
    /// * Panics if `values` does not hold exactly `rows * cols` entries
    pub fn new<T: Into<Vec<f64>>>(values: T, rows: usize, cols: usize) -> Matrix {
        let data = values.into();
        assert_eq!(data.len(), rows * cols, "expected a {}x{} matrix", rows, cols);
        Matrix { data, rows, cols }
    }

    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix::new(vec![0.0; rows * cols], rows, cols)
    }

    pub fn identity(n: usize) -> Matrix {
        let mut identity = Matrix::zeros(n, n);
        (0..n).for_each(|i| identity[(i, i)] = 1.0);
        identity
    }

    pub fn col_vector(values: Vec<f64>) -> Matrix {
        let rows = values.len();
        Matrix::new(values, rows, 1)
    }

    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.rows.min(self.cols))
            .map(|i| self[(i, i)])
            .collect()
    }

    /// Largest absolute entry, used to scale the singularity threshold
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0, |acc: f64, x| acc.max(x.abs()))
    }

    pub fn swap_rows(&mut self, i: usize, j: usize) {
        for k in 0..self.cols {
            self.data.swap(self.cols * i + k, self.cols * j + k);
        }
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &Self::Output {
        &self.data[self.cols * row + col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut Self::Output {
        &mut self.data[self.cols * row + col]
    }
}

impl Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries((0..self.rows).map(|row| self.row(row)))
            .finish()
    }
}

#[cfg(test)]
impl Matrix {
    pub fn is_close(&self, rhs: &Self, eps: f64) -> bool {
        self.shape() == rhs.shape()
            && self
                .data
                .iter()
                .zip(&rhs.data)
                .all(|(l, r)| (l - r).abs() <= eps)
    }
}

//! Gauss-Jordan elimination for solution of systems of linear equations
//!
//! Used for the damped normal equations of the Gaussian peak fit, and for
//! inverting `JᵀJ` to obtain the parameter covariance.

use super::matrix::Matrix;

/// Entries smaller than this (relative to the largest entry of the system)
/// are treated as zero pivots
const RELATIVE_PIVOT_EPS: f64 = 1e-12;
const IDENTITY_EPS: f64 = 1e-9;

#[derive(Debug)]
pub struct Gauss {
    pub left: Matrix,
    pub right: Matrix,
    eps: f64,
}

impl Gauss {
    /// Solve `left · x = right` for `x`. Returns `None` when `left` is
    /// not square, the shapes disagree, or `left` is (numerically) singular
    pub fn solve(left: Matrix, right: Matrix) -> Option<Matrix> {
        if left.rows != left.cols || left.rows != right.rows {
            return None;
        }
        let eps = left.max_abs() * RELATIVE_PIVOT_EPS;
        let mut g = Gauss { left, right, eps };
        g.echelon();
        g.reduce();
        g.backfill();

        // If `left` is the identity matrix, then `right` contains
        // the solution to the system of equations
        match g.left_solved() {
            true => Some(g.right),
            false => None,
        }
    }

    /// Invert a square matrix
    pub fn invert(matrix: Matrix) -> Option<Matrix> {
        let n = matrix.rows;
        Gauss::solve(matrix, Matrix::identity(n))
    }

    fn is_zero(&self, x: f64) -> bool {
        x.abs() <= self.eps
    }

    // Is `left` the identity matrix? Singular systems leave a zero on the diagonal
    fn left_solved(&self) -> bool {
        let n = self.left.cols;
        for i in 0..n {
            for j in 0..n {
                let x = self.left[(i, j)];
                let expected = if i == j { 1.0 } else { 0.0 };
                if !((x - expected).abs() <= IDENTITY_EPS) {
                    return false;
                }
            }
        }
        (0..self.right.rows).all(|r| self.right.row(r).iter().all(|x| x.is_finite()))
    }

    fn echelon(&mut self) {
        let (m, n) = self.left.shape();
        let mut h = 0;
        let mut k = 0;

        while h < m && k < n {
            // find the row with the largest magnitude in the current pivot column (k)
            let mut max = (h, 0.0);
            for i in h..m {
                let x = self.left[(i, k)].abs();
                if x > max.1 {
                    max = (i, x)
                }
            }
            let i = max.0;
            if self.is_zero(self.left[(i, k)]) {
                k += 1;
                continue;
            }

            // Swap rows (partial pivoting)
            if h != i {
                self.left.swap_rows(h, i);
                self.right.swap_rows(h, i);
            }

            // Clear rows below pivot row
            for i in h + 1..m {
                let factor = self.left[(i, k)] / self.left[(h, k)];
                self.left[(i, k)] = 0.0;
                for j in k + 1..n {
                    self.left[(i, j)] -= self.left[(h, j)] * factor;
                }
                for j in 0..self.right.cols {
                    self.right[(i, j)] -= self.right[(h, j)] * factor;
                }
            }
            h += 1;
            k += 1;
        }
    }

    // Reduce left matrix to reduced echelon form - leading entries are all ones
    fn reduce(&mut self) {
        for i in (0..self.left.rows).rev() {
            for j in 0..self.left.cols {
                let x = self.left[(i, j)];
                if self.is_zero(x) {
                    continue;
                }
                for k in j..self.left.cols {
                    self.left[(i, k)] /= x;
                }
                for k in 0..self.right.cols {
                    self.right[(i, k)] /= x;
                }
                break;
            }
        }
    }

    // Solve the upper triangular matrix
    fn backfill(&mut self) {
        for i in (0..self.left.rows).rev() {
            for j in 0..self.left.cols {
                if self.is_zero(self.left[(i, j)]) {
                    continue;
                }
                for k in 0..i {
                    let factor = self.left[(k, j)] / self.left[(i, j)];
                    for h in 0..self.left.cols {
                        self.left[(k, h)] -= self.left[(i, h)] * factor;
                    }
                    for h in 0..self.right.cols {
                        self.right[(k, h)] -= self.right[(i, h)] * factor;
                    }
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn solve_system() {
        #[rustfmt::skip]
        let left = Matrix::new([
            2., 1., -1.,
            -3., -1., 2.,
            -2., 1., 2.,
        ], 3, 3);
        let right = Matrix::col_vector(vec![8., -11., -3.]);

        let x = Gauss::solve(left, right).unwrap();
        assert!(
            x.is_close(&Matrix::col_vector(vec![2., 3., -1.]), 1e-9),
            "{:?}",
            x
        );
    }

    #[test]
    fn pivots_on_magnitude() {
        // A leading zero pivot with a negative entry below it
        let left = Matrix::new([0., 1., -4., 1.], 2, 2);
        let right = Matrix::col_vector(vec![3., 5.]);
        let x = Gauss::solve(left, right).unwrap();
        assert!(x.is_close(&Matrix::col_vector(vec![-0.5, 3.]), 1e-9));
    }

    #[test]
    fn invert() {
        let a = Matrix::new([4., 7., 2., 6.], 2, 2);
        let inv = Gauss::invert(a).unwrap();
        assert!(inv.is_close(&Matrix::new([0.6, -0.7, -0.2, 0.4], 2, 2), 1e-9));
    }

    #[test]
    fn singular() {
        let a = Matrix::new([1., 2., 2., 4.], 2, 2);
        assert!(Gauss::invert(a).is_none());

        let zeros = Matrix::zeros(3, 3);
        assert!(Gauss::invert(zeros).is_none());

        let nan = Matrix::new([f64::NAN, 0., 0., 1.], 2, 2);
        assert!(Gauss::invert(nan).is_none());
    }
}

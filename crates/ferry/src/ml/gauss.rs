//! Gauss-Jordan elimination for solution of systems of linear equations
//!
//! Used to solve the normal equations of least-squares problems. Multiple
//! right-hand sides are solved at once, one per column of `right`.

use super::matrix::Matrix;

/// Pivots smaller than this (relative to the largest entry) are treated as zero
const EPSILON: f64 = 1E-12;

#[derive(Debug)]
pub struct Gauss {
    pub left: Matrix,
    pub right: Matrix,
    tolerance: f64,
}

impl Gauss {
    /// Solve `left.dot(x) = right` for `x`, returning `None` if `left` is
    /// singular
    pub fn solve(left: Matrix, right: Matrix) -> Option<Matrix> {
        assert_eq!(
            left.rows, right.rows,
            "left has {} rows, right has {} rows",
            left.rows, right.rows
        );
        let scale = (0..left.rows)
            .flat_map(|i| left.row_slice(i).iter().copied())
            .fold(0.0f64, |acc, x| acc.max(x.abs()));
        let mut g = Gauss {
            left,
            right,
            tolerance: scale * EPSILON,
        };
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

    // Is `left` an identity matrix?
    fn left_solved(&self) -> bool {
        let n = self.left.cols;
        if self.left.rows != n {
            return false;
        }
        for i in 0..n {
            for j in 0..n {
                let x = self.left[(i, j)];
                if i == j {
                    if x != 1.0 {
                        return false;
                    }
                } else if x != 0.0 {
                    return false;
                }
            }
        }
        true
    }

    fn echelon(&mut self) {
        let (m, n) = self.left.shape();
        let mut h = 0;
        let mut k = 0;

        while h < m && k < n {
            // find the row with the largest magnitude in the current pivot column (k)
            let mut max = (h, 0.0f64);
            for i in h..m {
                if self.left[(i, k)].abs() > max.1 {
                    max = (i, self.left[(i, k)].abs())
                }
            }
            let i = max.0;
            if max.1 <= self.tolerance {
                for i in h..m {
                    self.left[(i, k)] = 0.0;
                }
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

    // Reduce left matrix to reduced echelon form - diagonal is all ones
    fn reduce(&mut self) {
        for i in (0..self.left.rows).rev() {
            for j in 0..self.left.cols {
                let x = self.left[(i, j)];
                if x.abs() <= self.tolerance {
                    self.left[(i, j)] = 0.0;
                    continue;
                }
                for k in j..self.left.cols {
                    self.left[(i, k)] /= x;
                }
                self.left[(i, j)] = 1.0;
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
                if self.left[(i, j)] == 0.0 {
                    continue;
                }
                for k in 0..i {
                    let factor = self.left[(k, j)] / self.left[(i, j)];
                    for h in 0..self.left.cols {
                        self.left[(k, h)] -= self.left[(i, h)] * factor;
                    }
                    self.left[(k, j)] = 0.0;
                    for h in 0..self.right.cols {
                        self.right[(k, h)] -= self.right[(i, h)] * factor;
                    }
                }
                break;
            }
        }
    }
}

use rayon::prelude::*;
use std::fmt::{self, Debug};
use std::ops::{Index, IndexMut};

/// Dense, row-major matrix of `f64`
#[derive(Clone, PartialEq)]
pub struct Matrix {
    data: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
}

impl Matrix {
    /// # Panics
    ///
    /// * Panics if `data` does not hold exactly `rows * cols` values
    pub fn new<T: Into<Vec<f64>>>(data: T, rows: usize, cols: usize) -> Matrix {
        let data = data.into();
        assert_eq!(
            data.len(),
            rows * cols,
            "{} values cannot fill a ({}, {}) matrix",
            data.len(),
            rows,
            cols
        );
        Matrix { data, rows, cols }
    }

    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix::new(vec![0.0; rows * cols], rows, cols)
    }

    pub fn identity(size: usize) -> Matrix {
        let mut matrix = Matrix::zeros(size, size);
        (0..size).for_each(|i| matrix[(i, i)] = 1.0);
        matrix
    }

    pub fn col_vector(data: Vec<f64>) -> Matrix {
        let rows = data.len();
        Matrix::new(data, rows, 1)
    }

    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn row_slice(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Values of column `col`, top to bottom
    pub fn col(&self, col: usize) -> impl Iterator<Item = f64> + '_ {
        let stride = self.cols.max(1);
        self.data
            .iter()
            .skip(col)
            .step_by(stride)
            .take(self.rows)
            .copied()
    }

    pub fn swap_rows(&mut self, i: usize, j: usize) {
        for k in 0..self.cols {
            self.data.swap(self.cols * i + k, self.cols * j + k);
        }
    }

    /// Consume the matrix, returning the underlying row-major data
    pub fn take(self) -> Vec<f64> {
        self.data
    }

    pub fn transpose(&self) -> Matrix {
        let mut mat = Matrix::zeros(self.cols, self.rows);
        for row in 0..self.rows {
            for col in 0..self.cols {
                mat[(col, row)] = self[(row, col)];
            }
        }
        mat
    }

    /// Multiply row `i` by `weights[i]`
    pub fn scale_rows(&self, weights: &[f64]) -> Matrix {
        assert_eq!(
            self.rows,
            weights.len(),
            "matrix has {} rows, but {} weights were supplied",
            self.rows,
            weights.len()
        );
        let mut mat = self.clone();
        for (row, w) in weights.iter().enumerate() {
            let start = row * self.cols;
            mat.data[start..start + self.cols]
                .iter_mut()
                .for_each(|x| *x *= w);
        }
        mat
    }

    pub fn dot(&self, rhs: &Matrix) -> Matrix {
        assert_eq!(
            self.cols, rhs.rows,
            "lhs has shape ({},{}), rhs has shape ({},{})",
            self.rows, self.cols, rhs.rows, rhs.cols
        );
        let mut data = vec![0.0; self.rows * rhs.cols];
        data.par_chunks_mut(rhs.cols.max(1))
            .enumerate()
            .for_each(|(row, out)| {
                let lhs = self.row_slice(row);
                for (col, value) in out.iter_mut().enumerate() {
                    *value = lhs.iter().zip(rhs.col(col)).map(|(x, y)| x * y).sum();
                }
            });
        Matrix::new(data, self.rows, rhs.cols)
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
        writeln!(f, "({}, {}) [", self.rows, self.cols)?;
        for row in 0..self.rows {
            writeln!(f, "  {:?}", self.row_slice(row))?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn transpose() {
        let mut mat = Matrix::new([1., 2., 3., 4., 5., 6.], 3, 2);
        assert_eq!(mat[(0, 1)], 2.);
        assert_eq!(mat[(2, 0)], 5.);
        assert_eq!(mat.col(1).collect::<Vec<_>>(), vec![2., 4., 6.]);

        mat = mat.transpose();
        assert_eq!(mat.shape(), (2, 3));
        assert_eq!(mat.row_slice(0), &[1., 3., 5.]);
        assert_eq!(mat.row_slice(1), &[2., 4., 6.]);
    }

    #[test]
    fn dot() {
        #[rustfmt::skip]
        let a = Matrix::new([
            1., 0., 1.,
            2., 1., 1.,
            0., 1., 1.,
            1., 1., 2.
        ], 4, 3);

        #[rustfmt::skip]
        let b = Matrix::new([
            1., 2., 1.,
            2., 3., 1.,
            4., 2., 2.
        ], 3, 3);

        let c = a.dot(&b);
        assert_eq!(c.shape(), (4, 3));
        #[rustfmt::skip]
        assert_eq!(
            c.take(),
            vec![
                5., 4., 3.,
                8., 9., 5.,
                6., 5., 3.,
                11., 9., 6.
            ]
        );

        let d = Matrix::new([1., 2., 3., 4., 5., 6.], 2, 3);
        let e = Matrix::col_vector(vec![7., 9., 11.]);
        assert_eq!(d.dot(&e), Matrix::new([58., 139.], 2, 1));
        assert_eq!(d.dot(&Matrix::zeros(3, 0)).shape(), (2, 0));
    }

    #[test]
    fn row_operations() {
        let mut a = Matrix::new([1., 2., 3., 4.], 2, 2);
        a.swap_rows(0, 1);
        assert_eq!(a.row_slice(0), &[3., 4.]);
        let b = a.scale_rows(&[2.0, 0.5]);
        assert_eq!(b.take(), vec![6., 8., 0.5, 1.]);
    }
}

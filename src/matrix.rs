//! Dense row-major matrix handed to the external analysis step.

use crate::error::{EnsembleError, EnsembleResult};

/// Dense `rows x cols` matrix of `f64`, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Zero-filled matrix
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Build from nested rows; all rows must have the same length
    pub fn from_rows(rows: Vec<Vec<f64>>) -> EnsembleResult<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(EnsembleError::configuration(format!(
                    "row {i} has {} columns, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    /// Set one cell; out-of-range positions are a configuration error
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> EnsembleResult<()> {
        if row >= self.rows || col >= self.cols {
            return Err(EnsembleError::configuration(format!(
                "cell ({row}, {col}) outside {}x{} matrix",
                self.rows, self.cols
            )));
        }
        self.data[row * self.cols + col] = value;
        Ok(())
    }

    pub fn row(&self, row: usize) -> Option<&[f64]> {
        if row < self.rows {
            Some(&self.data[row * self.cols..(row + 1) * self.cols])
        } else {
            None
        }
    }

    pub fn column(&self, col: usize) -> Option<Vec<f64>> {
        if col < self.cols {
            Some((0..self.rows).map(|r| self.data[r * self.cols + col]).collect())
        } else {
            None
        }
    }

    /// Per-row mean across columns
    pub fn row_means(&self) -> Vec<f64> {
        (0..self.rows)
            .map(|r| {
                let row = &self.data[r * self.cols..(r + 1) * self.cols];
                if row.is_empty() {
                    0.0
                } else {
                    row.iter().sum::<f64>() / row.len() as f64
                }
            })
            .collect()
    }

    /// Same shape and every cell within `tol`
    pub fn approx_eq(&self, other: &Matrix, tol: f64) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| (a - b).abs() <= tol)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_and_access() {
        let m = Matrix::from_rows(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 3);
        assert_eq!(m.get(1, 2), Some(6.0));
        assert_eq!(m.get(2, 0), None);
        assert_eq!(m.row(0).unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(m.column(1).unwrap(), vec![2.0, 5.0]);
        assert_eq!(m.row_means(), vec![2.0, 5.0]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        assert!(Matrix::from_rows(vec![vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_set_out_of_range() {
        let mut m = Matrix::new(1, 1);
        assert!(m.set(0, 0, 3.0).is_ok());
        assert!(m.set(0, 1, 3.0).is_err());
        assert_eq!(m.as_slice(), &[3.0]);
    }

    #[test]
    fn test_approx_eq() {
        let a = Matrix::from_rows(vec![vec![1.0, 2.0]]).unwrap();
        let b = Matrix::from_rows(vec![vec![1.0 + 1e-12, 2.0]]).unwrap();
        assert!(a.approx_eq(&b, 1e-9));
        assert!(!a.approx_eq(&Matrix::new(2, 1), 1e-9));
    }
}

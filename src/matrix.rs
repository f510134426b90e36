//! Dense row-major matrix container
//!
//! Weight matrices are logically `w[output][input]` with `dim1` output rows
//! and `dim2` columns, where the last column holds the bias term. The same
//! container carries both the float weights of a trained layer and their
//! int8 quantized form.

use num_traits::Num;
use serde::{Deserialize, Serialize};

use crate::error::{ReconocerError, Result};

/// Dense 2-D matrix stored row-major in a flat buffer
///
/// # Examples
///
/// ```
/// use reconocer::Matrix;
///
/// let m = Matrix::from_vec(2, 3, vec![
///     1.0_f32, 2.0, 3.0,
///     4.0, 5.0, 6.0,
/// ]).unwrap();
///
/// assert_eq!(m.dim1(), 2);
/// assert_eq!(m.dim2(), 3);
/// assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix<T: Num> {
    /// Flattened data in row-major order
    data: Vec<T>,
    /// Number of rows (outputs)
    dim1: usize,
    /// Number of columns (inputs plus the bias column)
    dim2: usize,
}

impl<T: Num + Copy> Matrix<T> {
    /// Create a matrix from a flat row-major vector
    ///
    /// # Errors
    ///
    /// Returns `Err` if `data.len() != dim1 * dim2`.
    pub fn from_vec(dim1: usize, dim2: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != dim1 * dim2 {
            return Err(ReconocerError::InvalidShape {
                reason: format!(
                    "data length {} does not match {}x{}",
                    data.len(),
                    dim1,
                    dim2
                ),
            });
        }
        Ok(Self { data, dim1, dim2 })
    }

    /// Create a zero-filled matrix
    #[must_use]
    pub fn zeros(dim1: usize, dim2: usize) -> Self {
        Self {
            data: vec![T::zero(); dim1 * dim2],
            dim1,
            dim2,
        }
    }

    /// Number of rows
    #[must_use]
    pub fn dim1(&self) -> usize {
        self.dim1
    }

    /// Number of columns
    #[must_use]
    pub fn dim2(&self) -> usize {
        self.dim2
    }

    /// Borrow one row
    ///
    /// # Panics
    ///
    /// Panics if `i >= dim1`.
    #[must_use]
    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.dim2..(i + 1) * self.dim2]
    }

    /// Read one element
    ///
    /// # Panics
    ///
    /// Panics if the indices are out of bounds.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> T {
        assert!(i < self.dim1 && j < self.dim2, "index out of bounds");
        self.data[i * self.dim2 + j]
    }

    /// Write one element
    ///
    /// # Panics
    ///
    /// Panics if the indices are out of bounds.
    pub fn put(&mut self, i: usize, j: usize, value: T) {
        assert!(i < self.dim1 && j < self.dim2, "index out of bounds");
        self.data[i * self.dim2 + j] = value;
    }

    /// Borrow the flat row-major buffer
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

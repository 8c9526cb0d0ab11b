//! Dataset shape metadata.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Shape of a prepared dataset array, `(N, V, L)`.
///
/// # Example
///
/// ```rust
/// use mlstm_core::DatasetShape;
///
/// let shape = DatasetShape::from_dims(&[10, 3, 50]).unwrap();
/// assert_eq!(shape.samples(), 10);
/// assert_eq!(shape.steps(), 50);
/// assert_eq!(shape.sample_dims(), [3, 50]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetShape {
    samples: usize,
    vars: usize,
    steps: usize,
}

impl DatasetShape {
    /// Create a new shape.
    #[must_use]
    pub const fn new(samples: usize, vars: usize, steps: usize) -> Self {
        Self {
            samples,
            vars,
            steps,
        }
    }

    /// Create a shape from a dimension slice such as `ndarray::Array3::shape()`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DimensionError`] unless `dims` has exactly three entries.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        match dims {
            &[samples, vars, steps] => Ok(Self::new(samples, vars, steps)),
            _ => Err(CoreError::DimensionError {
                expected: 3,
                got: dims.len(),
            }),
        }
    }

    /// Number of samples.
    #[must_use]
    pub const fn samples(&self) -> usize {
        self.samples
    }

    /// Number of variables.
    #[must_use]
    pub const fn vars(&self) -> usize {
        self.vars
    }

    /// Number of time steps.
    #[must_use]
    pub const fn steps(&self) -> usize {
        self.steps
    }

    /// Per-sample dimensions `[V, L]`.
    #[must_use]
    pub const fn sample_dims(&self) -> [usize; 2] {
        [self.vars, self.steps]
    }

    /// Total number of elements.
    #[must_use]
    pub const fn numel(&self) -> usize {
        self.samples * self.vars * self.steps
    }

    /// Check that `other` describes samples of the same `[V, L]` layout.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ShapeMismatch`] when variables or steps differ.
    pub fn ensure_same_layout(&self, other: &Self) -> Result<()> {
        if self.sample_dims() != other.sample_dims() {
            return Err(CoreError::ShapeMismatch(format!(
                "expected samples of {:?}, got {:?}",
                self.sample_dims(),
                other.sample_dims()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for DatasetShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.samples, self.vars, self.steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dims_rejects_wrong_rank() {
        assert!(DatasetShape::from_dims(&[1, 2]).is_err());
        assert!(DatasetShape::from_dims(&[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn test_numel_and_display() {
        let shape = DatasetShape::new(4, 3, 5);
        assert_eq!(shape.numel(), 60);
        assert_eq!(shape.to_string(), "(4, 3, 5)");
    }

    #[test]
    fn test_same_layout() {
        let train = DatasetShape::new(75, 13, 93);
        let test = DatasetShape::new(25, 13, 93);
        assert!(train.ensure_same_layout(&test).is_ok());
        assert!(train
            .ensure_same_layout(&DatasetShape::new(25, 13, 90))
            .is_err());
    }
}

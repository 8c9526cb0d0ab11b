//! Reconciling sequence length with a model's expected input length.

use std::fmt;
use std::str::FromStr;

use ndarray::{s, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

/// Which end of an over-long sequence to drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cutoff {
    /// Drop leading steps, keeping the last `target_len`.
    Pre,
    /// Drop trailing steps, keeping the first `target_len`.
    Post,
}

impl FromStr for Cutoff {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pre" => Ok(Self::Pre),
            "post" => Ok(Self::Post),
            other => Err(DataError::InvalidCutoff(other.to_string())),
        }
    }
}

impl fmt::Display for Cutoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => write!(f, "pre"),
            Self::Post => write!(f, "post"),
        }
    }
}

/// Trim the time axis of `(N, V, L)` data to `target_len`.
///
/// Data that is already short enough is returned unchanged.
#[must_use]
pub fn cutoff_sequence(x: &Array3<f32>, target_len: usize, cutoff: Cutoff) -> Array3<f32> {
    let len = x.shape()[2];
    if len <= target_len {
        return x.clone();
    }
    match cutoff {
        Cutoff::Pre => x.slice(s![.., .., len - target_len..]).to_owned(),
        Cutoff::Post => x.slice(s![.., .., ..target_len]).to_owned(),
    }
}

/// Right-pad the time axis of `(N, V, L)` data with zeros up to `target_len`.
///
/// # Errors
///
/// Returns [`DataError::InvalidShape`] if the data is longer than `target_len`.
pub fn pad_sequences(x: &Array3<f32>, target_len: usize) -> Result<Array3<f32>> {
    let (n, v, len) = (x.shape()[0], x.shape()[1], x.shape()[2]);
    if len > target_len {
        return Err(DataError::InvalidShape(format!(
            "cannot pad {} steps down to {}",
            len, target_len
        )));
    }
    let mut out = Array3::zeros((n, v, target_len));
    out.slice_mut(s![.., .., ..len]).assign(x);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(len: usize) -> Array3<f32> {
        Array3::from_shape_fn((1, 2, len), |(_, v, t)| (v * 100 + t) as f32)
    }

    #[test]
    fn test_parse() {
        assert_eq!("pre".parse::<Cutoff>().unwrap(), Cutoff::Pre);
        assert_eq!("post".parse::<Cutoff>().unwrap(), Cutoff::Post);
        assert!(matches!(
            "middle".parse::<Cutoff>(),
            Err(DataError::InvalidCutoff(_))
        ));
        assert_eq!(Cutoff::Pre.to_string(), "pre");
    }

    #[test]
    fn test_pre_keeps_tail() {
        let out = cutoff_sequence(&steps(6), 4, Cutoff::Pre);
        assert_eq!(out.shape(), &[1, 2, 4]);
        assert_eq!(out[[0, 0, 0]], 2.0);
        assert_eq!(out[[0, 1, 3]], 105.0);
    }

    #[test]
    fn test_post_keeps_head() {
        let out = cutoff_sequence(&steps(6), 4, Cutoff::Post);
        assert_eq!(out[[0, 0, 0]], 0.0);
        assert_eq!(out[[0, 1, 3]], 103.0);
    }

    #[test]
    fn test_pad_sequences() {
        let out = pad_sequences(&steps(3), 5).unwrap();
        assert_eq!(out.shape(), &[1, 2, 5]);
        assert_eq!(out[[0, 1, 2]], 102.0);
        assert_eq!(out[[0, 1, 3]], 0.0);
        assert!(pad_sequences(&steps(6), 5).is_err());
    }
}

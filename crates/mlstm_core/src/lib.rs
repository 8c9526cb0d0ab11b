//! # mlstm_core
//!
//! Core types shared by the mlstm-rs crates.
//!
//! This crate provides:
//! - [`Seed`] for deterministic, key-derived random streams
//! - [`DatasetShape`] for `(N, V, L)` array shape metadata
//! - [`CoreError`] and the crate [`Result`] alias
//! - Backend aliases used by the binaries and tests
//!
//! ## Shape Convention
//!
//! Prepared datasets follow the convention `(N, V, L)`:
//! - `N`: number of samples
//! - `V`: variables (sensor channels)
//! - `L`: time steps, right-padded with zeros to a common length
//!
//! ## Example
//!
//! ```rust
//! use mlstm_core::{DatasetShape, Seed};
//!
//! let seed = Seed::new(42);
//! let shape = DatasetShape::new(6600, 13, 93);
//! assert_eq!(shape.vars(), 13);
//! assert_ne!(seed.derive("split"), seed.derive("train"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod seed;
mod shape;

pub use error::{CoreError, Result};
pub use seed::Seed;
pub use shape::DatasetShape;

/// Backend type aliases for convenience.
pub mod backend {
    #[cfg(feature = "backend-ndarray")]
    pub use burn_ndarray::NdArray;

    /// CPU backend used for inference and evaluation.
    #[cfg(feature = "backend-ndarray")]
    pub type CpuBackend = burn_ndarray::NdArray<f32>;

    /// CPU backend with automatic differentiation, used for training.
    #[cfg(feature = "backend-ndarray")]
    pub type TrainBackend = burn_autodiff::Autodiff<CpuBackend>;
}

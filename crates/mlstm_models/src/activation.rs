//! Activation, output and initializer choices.

use burn::nn::{Initializer, PaddingConfig1d};
use burn::prelude::*;
use burn::tensor::activation::{gelu, relu, sigmoid, softmax, tanh};
use serde::{Deserialize, Serialize};

/// Hidden-layer activation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Rectified linear unit.
    #[default]
    Relu,
    /// Hyperbolic tangent.
    Tanh,
    /// Logistic sigmoid.
    Sigmoid,
    /// Gaussian error linear unit.
    Gelu,
    /// Identity.
    Linear,
}

impl Activation {
    /// Apply the activation elementwise.
    pub fn apply<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Relu => relu(x),
            Self::Tanh => tanh(x),
            Self::Sigmoid => sigmoid(x),
            Self::Gelu => gelu(x),
            Self::Linear => x,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::Tanh => "tanh",
            Self::Sigmoid => "sigmoid",
            Self::Gelu => "gelu",
            Self::Linear => "linear",
        }
    }
}

/// Activation of the classifier and of squeeze-excite gates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputActivation {
    /// Independent logistic scores.
    #[default]
    Sigmoid,
    /// Scores normalized over the last axis.
    Softmax,
    /// Raw scores.
    Linear,
}

impl OutputActivation {
    /// Apply to `[batch, features]` scores.
    pub fn apply<B: Backend>(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Self::Sigmoid => sigmoid(x),
            Self::Softmax => softmax(x, 1),
            Self::Linear => x,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sigmoid => "sigmoid",
            Self::Softmax => "softmax",
            Self::Linear => "linear",
        }
    }
}

impl core::fmt::Display for Activation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl core::fmt::Display for OutputActivation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

use burn::constant;

constant!(Activation);
constant!(OutputActivation);

/// Weight initialization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelInit {
    /// Uniform in `±sqrt(6 / fan_in)`.
    HeUniform,
    /// Normal with std `sqrt(2 / fan_in)`.
    HeNormal,
    /// Uniform in `±sqrt(6 / (fan_in + fan_out))`.
    GlorotUniform,
    /// Normal with std `sqrt(2 / (fan_in + fan_out))`.
    GlorotNormal,
}

impl KernelInit {
    /// The matching burn initializer.
    #[must_use]
    pub fn initializer(&self) -> Initializer {
        match self {
            Self::HeUniform => Initializer::KaimingUniform {
                gain: std::f64::consts::SQRT_2,
                fan_out_only: false,
            },
            Self::HeNormal => Initializer::KaimingNormal {
                gain: std::f64::consts::SQRT_2,
                fan_out_only: false,
            },
            Self::GlorotUniform => Initializer::XavierUniform { gain: 1.0 },
            Self::GlorotNormal => Initializer::XavierNormal { gain: 1.0 },
        }
    }
}

/// Convolution padding mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvPadding {
    /// No padding; the time axis shrinks by `kernel - 1`.
    #[default]
    Valid,
    /// Symmetric zero padding of `(kernel - 1) / 2` steps on each side.
    Same,
}

impl ConvPadding {
    /// Padding applied to each side for `kernel`.
    #[must_use]
    pub fn amount(&self, kernel: usize) -> usize {
        match self {
            Self::Valid => 0,
            Self::Same => kernel.saturating_sub(1) / 2,
        }
    }

    /// The burn padding configuration for `kernel`.
    #[must_use]
    pub fn config(&self, kernel: usize) -> PaddingConfig1d {
        match self {
            Self::Valid => PaddingConfig1d::Valid,
            Self::Same => PaddingConfig1d::Explicit(self.amount(kernel)),
        }
    }

    /// Output steps for an input of `len`, or `None` when nothing is left.
    #[must_use]
    pub fn output_len(&self, len: usize, kernel: usize, stride: usize) -> Option<usize> {
        let padded = len + 2 * self.amount(kernel);
        if stride == 0 || padded < kernel {
            return None;
        }
        Some((padded - kernel) / stride + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_output_len() {
        assert_eq!(ConvPadding::Valid.output_len(93, 8, 1), Some(86));
        assert_eq!(ConvPadding::Valid.output_len(7, 8, 1), None);
        assert_eq!(ConvPadding::Same.output_len(13, 8, 2), Some(6));
        assert_eq!(ConvPadding::Same.output_len(10, 3, 1), Some(10));
        assert_eq!(ConvPadding::Same.output_len(10, 3, 0), None);
    }

    #[test]
    fn test_activation_apply() {
        let device = Default::default();
        let x = Tensor::<B, 2>::from_floats([[-1.0, 0.0, 2.0]], &device);
        let relu: Vec<f32> = Activation::Relu.apply(x.clone()).into_data().to_vec().unwrap();
        assert_eq!(relu, vec![0.0, 0.0, 2.0]);
        let linear: Vec<f32> = Activation::Linear.apply(x.clone()).into_data().to_vec().unwrap();
        assert_eq!(linear, vec![-1.0, 0.0, 2.0]);

        let soft: Vec<f32> = OutputActivation::Softmax.apply(x).into_data().to_vec().unwrap();
        assert!((soft.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_serde_names() {
        let act: Activation = serde_json::from_str("\"tanh\"").unwrap();
        assert_eq!(act, Activation::Tanh);
        let init: KernelInit = serde_json::from_str("\"he_uniform\"").unwrap();
        assert_eq!(init, KernelInit::HeUniform);
    }
}

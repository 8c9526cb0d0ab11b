//! Convolution stages of the fully convolutional tower.

use burn::nn::{
    conv::{Conv1d, Conv1dConfig},
    pool::{AdaptiveAvgPool1d, AdaptiveAvgPool1dConfig},
    BatchNorm, BatchNormConfig, Linear, LinearConfig,
};
use burn::prelude::*;

use crate::activation::{Activation, ConvPadding, KernelInit, OutputActivation};

/// Convolution, batch normalization and activation.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv1d<B>,
    bn: BatchNorm<B, 1>,
    #[module(skip)]
    activation: Activation,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a block mapping `in_channels` to `filters`.
    pub fn new(
        in_channels: usize,
        filters: usize,
        kernel: usize,
        padding: ConvPadding,
        init: KernelInit,
        activation: Activation,
        device: &B::Device,
    ) -> Self {
        let conv = Conv1dConfig::new(in_channels, filters, kernel)
            .with_padding(padding.config(kernel))
            .with_initializer(init.initializer())
            .init(device);
        let bn = BatchNormConfig::new(filters)
            .with_momentum(0.01)
            .with_epsilon(1e-3)
            .init(device);
        Self {
            conv,
            bn,
            activation,
        }
    }

    /// `[batch, in_channels, steps]` to `[batch, filters, steps']`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let out = self.conv.forward(x);
        let out = self.bn.forward(out);
        self.activation.apply(out)
    }
}

/// Squeeze-and-excitation channel gate.
///
/// Averages each channel over time, passes the channel vector through a
/// bottleneck and rescales the channels by the resulting gate.
#[derive(Module, Debug)]
pub struct SqueezeExcite<B: Backend> {
    pool: AdaptiveAvgPool1d,
    reduce: Linear<B>,
    expand: Linear<B>,
    #[module(skip)]
    activation: Activation,
    #[module(skip)]
    gate: OutputActivation,
}

impl<B: Backend> SqueezeExcite<B> {
    /// Create a gate for `channels` with a `channels / ratio` bottleneck.
    pub fn new(
        channels: usize,
        ratio: usize,
        init: KernelInit,
        bias: bool,
        activation: Activation,
        gate: OutputActivation,
        device: &B::Device,
    ) -> Self {
        let bottleneck = (channels / ratio.max(1)).max(1);
        let reduce = LinearConfig::new(channels, bottleneck)
            .with_bias(bias)
            .with_initializer(init.initializer())
            .init(device);
        let expand = LinearConfig::new(bottleneck, channels)
            .with_bias(bias)
            .with_initializer(init.initializer())
            .init(device);
        Self {
            pool: AdaptiveAvgPool1dConfig::new(1).init(),
            reduce,
            expand,
            activation,
            gate,
        }
    }

    /// Rescale the channels of `[batch, channels, steps]`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, channels, _] = x.dims();
        let squeezed = self.pool.forward(x.clone()).reshape([batch, channels]);
        let hidden = self.activation.apply(self.reduce.forward(squeezed));
        let scale = self.gate.apply(self.expand.forward(hidden));
        x * scale.reshape([batch, channels, 1])
    }
}

/// One stage of the convolutional tower: a block with an optional gate.
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    block: ConvBlock<B>,
    gate: Option<SqueezeExcite<B>>,
}

impl<B: Backend> ConvStage<B> {
    /// Combine a block with an optional gate.
    pub fn new(block: ConvBlock<B>, gate: Option<SqueezeExcite<B>>) -> Self {
        Self { block, gate }
    }

    /// Whether this stage is gated.
    pub fn is_gated(&self) -> bool {
        self.gate.is_some()
    }

    /// Apply the block, then the gate if present.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let out = self.block.forward(x);
        match &self.gate {
            Some(gate) => gate.forward(out),
            None => out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_conv_block_valid_shape() {
        let device = Default::default();
        let block = ConvBlock::<B>::new(
            3,
            16,
            5,
            ConvPadding::Valid,
            KernelInit::HeUniform,
            Activation::Relu,
            &device,
        );
        let x = Tensor::<B, 3>::random([2, 3, 20], Distribution::Normal(0.0, 1.0), &device);
        let out = block.forward(x);
        assert_eq!(out.dims(), [2, 16, 16]);
        let values: Vec<f32> = out.into_data().to_vec().unwrap();
        assert!(values.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_squeeze_excite_preserves_shape_and_bounds() {
        let device = Default::default();
        let se = SqueezeExcite::<B>::new(
            16,
            4,
            KernelInit::HeNormal,
            false,
            Activation::Relu,
            OutputActivation::Sigmoid,
            &device,
        );
        let x = Tensor::<B, 3>::ones([2, 16, 7], &device);
        let out = se.forward(x);
        assert_eq!(out.dims(), [2, 16, 7]);
        // sigmoid gate on an all-ones input keeps every value in (0, 1)
        let values: Vec<f32> = out.into_data().to_vec().unwrap();
        assert!(values.iter().all(|&v| v > 0.0 && v < 1.0));
    }
}

//! MLSTM-FCN: Multivariate LSTM Fully Convolutional Network.
//!
//! Two towers read the same `[batch, vars, steps]` input. The recurrent tower
//! walks the variable axis, reading each variable's time series as one
//! feature vector; the convolutional tower convolves over time with the
//! variables as channels. Their outputs are concatenated and classified.
//!
//! Reference: "Multivariate LSTM-FCNs for Time Series Classification"
//! by Karim et al. (2019)

use burn::nn::{
    conv::{Conv1d, Conv1dConfig},
    pool::{AdaptiveAvgPool1d, AdaptiveAvgPool1dConfig},
    Dropout, DropoutConfig, Initializer, Linear, LinearConfig,
};
use burn::prelude::*;

use crate::activation::{Activation, ConvPadding, OutputActivation};
use crate::blocks::{ConvBlock, ConvStage, SqueezeExcite};
use crate::config::MlstmFcnConfig;
use crate::graph::NetworkGraph;
use crate::recurrent::{timestep_mask, MaskedLstm};

/// MLSTM-FCN classifier.
///
/// # Architecture
///
/// ```text
/// Input (B, V, L)
///       |
///       +---> [PreConv (V -> V/s)]? -> Masking -> LSTM (steps = V) -> Dropout
///       |                                                              |
///       +---> [Conv->BN->Act->SE] x (n-1) -> [Conv->BN->Act] -> GAP    |
///                                                             |        |
///                                                          Concat <----+
///                                                             |
///                                                    Dense -> output activation
/// ```
///
/// # Example
///
/// ```rust,ignore
/// use mlstm_models::MlstmFcnConfig;
///
/// let model = MlstmFcnConfig::new(13, 93, 88).init::<NdArray>(&device)?;
/// let scores = model.forward(x); // [batch, 88]
/// ```
#[derive(Module, Debug)]
pub struct MlstmFcn<B: Backend> {
    pre_conv: Option<Conv1d<B>>,
    lstm: MaskedLstm<B>,
    dropout: Dropout,
    stages: Vec<ConvStage<B>>,
    gap: AdaptiveAvgPool1d,
    classifier: Linear<B>,
    #[module(skip)]
    activation: Activation,
    #[module(skip)]
    output_activation: OutputActivation,
}

impl<B: Backend> MlstmFcn<B> {
    /// Build the modules described by `graph`.
    ///
    /// Use [`MlstmFcnConfig::init`], which builds and validates the graph.
    pub fn new(config: &MlstmFcnConfig, graph: &NetworkGraph, device: &B::Device) -> Self {
        let pre_conv = config.pre_convolve_rnn.then(|| {
            let kernel = config.pre_convolve_kernel();
            Conv1dConfig::new(config.n_vars, config.pre_convolve_filters(), kernel)
                .with_stride(config.pre_convolve_stride)
                .with_padding(ConvPadding::Same.config(kernel))
                .with_bias(config.use_bias)
                .with_initializer(config.kernel_init.initializer())
                .init(device)
        });

        let shape = graph.recurrent_shape();
        let lstm = MaskedLstm::new(shape.features, config.lstm_cells, config.attention, device);

        let mut stages = Vec::with_capacity(config.n_stages());
        let mut in_channels = config.n_vars;
        for (index, (&filters, &kernel)) in config
            .conv_filters
            .iter()
            .zip(&config.conv_kernels)
            .enumerate()
        {
            let block = ConvBlock::new(
                in_channels,
                filters,
                kernel,
                config.conv_padding,
                config.kernel_init,
                config.activation,
                device,
            );
            let gate = config.stage_has_gate(index).then(|| {
                SqueezeExcite::new(
                    filters,
                    config.squeeze_ratio,
                    config.squeeze_init,
                    config.use_bias,
                    config.activation,
                    config.output_activation,
                    device,
                )
            });
            stages.push(ConvStage::new(block, gate));
            in_channels = filters;
        }

        let classifier = LinearConfig::new(config.lstm_cells + in_channels, config.n_classes)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);

        Self {
            pre_conv,
            lstm,
            dropout: DropoutConfig::new(config.dropout).init(),
            stages,
            gap: AdaptiveAvgPool1dConfig::new(1).init(),
            classifier,
            activation: config.activation,
            output_activation: config.output_activation,
        }
    }

    /// Number of gated convolution stages.
    pub fn gated_stages(&self) -> usize {
        self.stages.iter().filter(|s| s.is_gated()).count()
    }

    /// Output-activated class scores `[batch, n_classes]`.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch, _, _] = x.dims();

        let rnn_in = match &self.pre_conv {
            Some(conv) => self.activation.apply(conv.forward(x.clone())),
            None => x.clone(),
        };
        let mask = timestep_mask(&rnn_in);
        let rnn_out = self.dropout.forward(self.lstm.forward(rnn_in, mask));

        let mut conv_out = x;
        for stage in &self.stages {
            conv_out = stage.forward(conv_out);
        }
        let channels = conv_out.dims()[1];
        let conv_out = self.gap.forward(conv_out).reshape([batch, channels]);

        let merged = Tensor::cat(vec![rnn_out, conv_out], 1);
        self.output_activation.apply(self.classifier.forward(merged))
    }

    /// Predicted class per sample.
    pub fn predict(&self, x: Tensor<B, 3>) -> Tensor<B, 1, Int> {
        let [batch, _, _] = x.dims();
        self.forward(x).argmax(1).reshape([batch])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn small() -> MlstmFcnConfig {
        MlstmFcnConfig::new(3, 24, 4)
            .with_lstm_cells(6)
            .with_conv_filters(vec![16, 32, 16])
            .with_squeeze_ratio(4)
    }

    #[test]
    fn test_forward_shape_and_sigmoid_range() {
        let device = Default::default();
        let model = small().init::<B>(&device).unwrap();
        let x = Tensor::<B, 3>::random([5, 3, 24], Distribution::Normal(0.0, 1.0), &device);

        let scores = model.forward(x.clone());
        assert_eq!(scores.dims(), [5, 4]);
        let values: Vec<f32> = scores.into_data().to_vec().unwrap();
        assert!(values.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(model.predict(x).dims(), [5]);
    }

    #[test]
    fn test_last_stage_is_never_gated() {
        let device = Default::default();
        let model = small().init::<B>(&device).unwrap();
        assert_eq!(model.gated_stages(), 2);

        let single = small().with_conv_filters(vec![8]).with_conv_kernels(vec![3]);
        assert_eq!(single.init::<B>(&device).unwrap().gated_stages(), 0);
    }

    #[test]
    fn test_softmax_output_sums_to_one() {
        let device = Default::default();
        let model = small()
            .with_output_activation(OutputActivation::Softmax)
            .with_attention(true)
            .init::<B>(&device)
            .unwrap();
        let x = Tensor::<B, 3>::random([2, 3, 24], Distribution::Normal(0.0, 1.0), &device);
        let sums: Vec<f32> = model.forward(x).sum_dim(1).into_data().to_vec().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_pre_convolve_forward() {
        let device = Default::default();
        let config = MlstmFcnConfig::new(8, 30, 3)
            .with_lstm_cells(4)
            .with_conv_filters(vec![8, 8])
            .with_conv_kernels(vec![5, 3])
            .with_pre_convolve(2);
        let model = config.init::<B>(&device).unwrap();
        let x = Tensor::<B, 3>::random([2, 8, 30], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(model.forward(x).dims(), [2, 3]);
    }

    #[test]
    fn test_init_rejects_collapsing_config() {
        let device = Default::default();
        assert!(MlstmFcnConfig::new(3, 10, 2).init::<B>(&device).is_err());
    }
}

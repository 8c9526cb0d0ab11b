//! MLSTM-FCN configuration.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::activation::{Activation, ConvPadding, KernelInit, OutputActivation};
use crate::error::{ModelError, Result};
use crate::graph::NetworkGraph;
use crate::mlstm_fcn::MlstmFcn;

/// Configuration for an MLSTM-FCN classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlstmFcnConfig {
    /// Number of input variables.
    pub n_vars: usize,
    /// Time steps per sample.
    pub seq_len: usize,
    /// Number of output classes.
    pub n_classes: usize,
    /// Units of the recurrent layer.
    pub lstm_cells: usize,
    /// Dropout applied to the recurrent output.
    pub dropout: f64,
    /// Filters of each convolution stage.
    pub conv_filters: Vec<usize>,
    /// Kernel size of each convolution stage.
    pub conv_kernels: Vec<usize>,
    /// Padding of the convolution stages.
    pub conv_padding: ConvPadding,
    /// Initializer of the convolution kernels.
    pub kernel_init: KernelInit,
    /// Hidden activation.
    pub activation: Activation,
    /// Use the attention-augmented recurrent unit.
    pub attention: bool,
    /// Gate convolution stages with squeeze-and-excitation.
    pub squeeze: bool,
    /// Bottleneck reduction of the squeeze-and-excitation gates.
    pub squeeze_ratio: usize,
    /// Initializer of the squeeze-and-excitation dense layers.
    pub squeeze_init: KernelInit,
    /// Convolve over the variables before the recurrent layer.
    pub pre_convolve_rnn: bool,
    /// Stride of that pre-convolution.
    pub pre_convolve_stride: usize,
    /// Activation of the classifier and of the gates.
    pub output_activation: OutputActivation,
    /// Bias on the pre-convolution and the gate dense layers.
    pub use_bias: bool,
}

impl Default for MlstmFcnConfig {
    fn default() -> Self {
        Self {
            n_vars: 1,
            seq_len: 100,
            n_classes: 2,
            lstm_cells: 8,
            dropout: 0.8,
            conv_filters: vec![128, 256, 128],
            conv_kernels: vec![8, 5, 3],
            conv_padding: ConvPadding::Valid,
            kernel_init: KernelInit::HeUniform,
            activation: Activation::Relu,
            attention: false,
            squeeze: true,
            squeeze_ratio: 16,
            squeeze_init: KernelInit::HeNormal,
            pre_convolve_rnn: false,
            pre_convolve_stride: 2,
            output_activation: OutputActivation::Sigmoid,
            use_bias: false,
        }
    }
}

impl MlstmFcnConfig {
    /// Create a config for the given input and class counts.
    pub fn new(n_vars: usize, seq_len: usize, n_classes: usize) -> Self {
        Self {
            n_vars,
            seq_len,
            n_classes,
            ..Default::default()
        }
    }

    /// Set the recurrent units.
    #[must_use]
    pub fn with_lstm_cells(mut self, cells: usize) -> Self {
        self.lstm_cells = cells;
        self
    }

    /// Set the dropout rate.
    #[must_use]
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Set the convolution filters.
    #[must_use]
    pub fn with_conv_filters(mut self, filters: Vec<usize>) -> Self {
        self.conv_filters = filters;
        self
    }

    /// Set the convolution kernels.
    #[must_use]
    pub fn with_conv_kernels(mut self, kernels: Vec<usize>) -> Self {
        self.conv_kernels = kernels;
        self
    }

    /// Set the convolution padding.
    #[must_use]
    pub fn with_conv_padding(mut self, padding: ConvPadding) -> Self {
        self.conv_padding = padding;
        self
    }

    /// Set the convolution kernel initializer.
    #[must_use]
    pub fn with_kernel_init(mut self, init: KernelInit) -> Self {
        self.kernel_init = init;
        self
    }

    /// Set the hidden activation.
    #[must_use]
    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Enable or disable the attention recurrent unit.
    #[must_use]
    pub fn with_attention(mut self, attention: bool) -> Self {
        self.attention = attention;
        self
    }

    /// Enable or disable squeeze-and-excitation gates.
    #[must_use]
    pub fn with_squeeze(mut self, squeeze: bool) -> Self {
        self.squeeze = squeeze;
        self
    }

    /// Set the squeeze-and-excitation ratio.
    #[must_use]
    pub fn with_squeeze_ratio(mut self, ratio: usize) -> Self {
        self.squeeze_ratio = ratio;
        self
    }

    /// Set the squeeze-and-excitation initializer.
    #[must_use]
    pub fn with_squeeze_init(mut self, init: KernelInit) -> Self {
        self.squeeze_init = init;
        self
    }

    /// Enable the pre-convolution with the given stride.
    #[must_use]
    pub fn with_pre_convolve(mut self, stride: usize) -> Self {
        self.pre_convolve_rnn = true;
        self.pre_convolve_stride = stride;
        self
    }

    /// Set the output activation.
    #[must_use]
    pub fn with_output_activation(mut self, activation: OutputActivation) -> Self {
        self.output_activation = activation;
        self
    }

    /// Set bias use on the pre-convolution and gates.
    #[must_use]
    pub fn with_use_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    /// Number of convolution stages.
    #[must_use]
    pub fn n_stages(&self) -> usize {
        self.conv_filters.len()
    }

    /// Whether stage `index` carries a squeeze-and-excitation gate.
    ///
    /// The final stage never does.
    #[must_use]
    pub fn stage_has_gate(&self, index: usize) -> bool {
        self.squeeze && index + 1 < self.n_stages()
    }

    /// Filters of the pre-convolution.
    #[must_use]
    pub fn pre_convolve_filters(&self) -> usize {
        (self.n_vars / self.pre_convolve_stride.max(1)).max(1)
    }

    /// Kernel of the pre-convolution.
    #[must_use]
    pub fn pre_convolve_kernel(&self) -> usize {
        self.conv_kernels.first().copied().unwrap_or(1)
    }

    /// Check sizes and ranges that do not depend on shape inference.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("n_vars", self.n_vars),
            ("seq_len", self.seq_len),
            ("n_classes", self.n_classes),
            ("lstm_cells", self.lstm_cells),
            ("squeeze_ratio", self.squeeze_ratio),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ModelError::InvalidConfig(format!("{} must be > 0", name)));
        }
        if self.conv_filters.is_empty() {
            return Err(ModelError::InvalidConfig(
                "at least one convolution stage is required".to_string(),
            ));
        }
        if self.conv_filters.len() != self.conv_kernels.len() {
            return Err(ModelError::InvalidConfig(format!(
                "{} conv filters but {} conv kernels",
                self.conv_filters.len(),
                self.conv_kernels.len()
            )));
        }
        if self.conv_filters.contains(&0) || self.conv_kernels.contains(&0) {
            return Err(ModelError::InvalidConfig(
                "conv filters and kernels must be > 0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ModelError::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.pre_convolve_rnn && self.pre_convolve_stride == 0 {
            return Err(ModelError::InvalidConfig(
                "pre_convolve_stride must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate, infer shapes and initialize the model.
    ///
    /// # Errors
    ///
    /// Returns a configuration or shape error.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<MlstmFcn<B>> {
        let graph = NetworkGraph::build(self)?;
        Ok(MlstmFcn::new(self, &graph, device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = MlstmFcnConfig::default();
        assert_eq!(config.lstm_cells, 8);
        assert_eq!(config.dropout, 0.8);
        assert_eq!(config.conv_filters, vec![128, 256, 128]);
        assert_eq!(config.conv_kernels, vec![8, 5, 3]);
        assert!(config.squeeze);
        assert!(!config.attention);
        assert_eq!(config.squeeze_ratio, 16);
        assert_eq!(config.output_activation, OutputActivation::Sigmoid);
        assert!(!config.use_bias);
    }

    #[test]
    fn test_config_builder() {
        let config = MlstmFcnConfig::new(13, 93, 88)
            .with_lstm_cells(64)
            .with_attention(true)
            .with_pre_convolve(4)
            .with_dropout(0.5);
        assert_eq!((config.n_vars, config.seq_len, config.n_classes), (13, 93, 88));
        assert_eq!(config.lstm_cells, 64);
        assert!(config.pre_convolve_rnn);
        assert_eq!(config.pre_convolve_filters(), 3);
        assert_eq!(config.pre_convolve_kernel(), 8);
    }

    #[test]
    fn test_final_stage_never_gated() {
        let config = MlstmFcnConfig::new(2, 50, 3);
        assert!(config.stage_has_gate(0));
        assert!(config.stage_has_gate(1));
        assert!(!config.stage_has_gate(2));

        let single = config.clone().with_conv_filters(vec![16]).with_conv_kernels(vec![3]);
        assert!(!single.stage_has_gate(0));
        assert!(!config.with_squeeze(false).stage_has_gate(0));
    }

    #[test]
    fn test_validate_rejects() {
        let base = MlstmFcnConfig::new(2, 50, 3);
        assert!(base.validate().is_ok());
        assert!(base.clone().with_conv_kernels(vec![3]).validate().is_err());
        assert!(base.clone().with_dropout(1.0).validate().is_err());
        assert!(base.clone().with_lstm_cells(0).validate().is_err());
        assert!(base.clone().with_pre_convolve(0).validate().is_err());
        assert!(base
            .with_conv_filters(vec![])
            .with_conv_kernels(vec![])
            .validate()
            .is_err());
    }

    #[test]
    fn test_serde_partial_json() {
        let config: MlstmFcnConfig =
            serde_json::from_str(r#"{"n_vars": 13, "seq_len": 93, "n_classes": 88}"#).unwrap();
        assert_eq!(config.lstm_cells, 8);
        assert_eq!(config.n_classes, 88);
    }
}

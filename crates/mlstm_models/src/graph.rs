//! Layer graph description with shape inference and parameter counts.
//!
//! Shapes exclude the batch axis and follow the channel-first layout the
//! modules run in: sequences are `[channels, steps]`.

use std::fmt::Write as _;

use crate::activation::{Activation, ConvPadding, OutputActivation};
use crate::config::MlstmFcnConfig;
use crate::error::{ModelError, Result};

/// Kind of a node in the network graph.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    /// Network input.
    Input,
    /// One-dimensional convolution.
    Conv1d {
        /// Output channels.
        filters: usize,
        /// Kernel size.
        kernel: usize,
        /// Stride.
        stride: usize,
        /// Padding mode.
        padding: ConvPadding,
        /// Whether the layer has a bias.
        bias: bool,
    },
    /// Batch normalization over channels.
    BatchNorm,
    /// Elementwise activation.
    Activation(Activation),
    /// Masking of all-zero steps.
    Masking,
    /// Recurrent layer returning its final state.
    Recurrent {
        /// Hidden units.
        units: usize,
        /// Attention-augmented cell.
        attention: bool,
    },
    /// Dropout.
    Dropout(f64),
    /// Mean over the time axis.
    GlobalAvgPool,
    /// Squeeze-and-excitation gate.
    SqueezeExcite {
        /// Bottleneck width.
        bottleneck: usize,
        /// Gate activation.
        gate: OutputActivation,
    },
    /// Concatenation of feature vectors.
    Concatenate,
    /// Fully connected layer.
    Dense {
        /// Output units.
        units: usize,
        /// Activation on the output.
        activation: OutputActivation,
    },
}

impl LayerKind {
    /// Short type name used in summaries.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::Input => "Input".to_string(),
            Self::Conv1d { .. } => "Conv1d".to_string(),
            Self::BatchNorm => "BatchNorm".to_string(),
            Self::Activation(a) => format!("Activation({})", a.name()),
            Self::Masking => "Masking".to_string(),
            Self::Recurrent { attention, .. } => {
                if *attention {
                    "AttentionLSTM".to_string()
                } else {
                    "LSTM".to_string()
                }
            }
            Self::Dropout(p) => format!("Dropout({})", p),
            Self::GlobalAvgPool => "GlobalAvgPool1d".to_string(),
            Self::SqueezeExcite { .. } => "SqueezeExcite".to_string(),
            Self::Concatenate => "Concatenate".to_string(),
            Self::Dense { activation, .. } => format!("Dense({})", activation.name()),
        }
    }
}

/// A named node of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerNode {
    /// Unique name.
    pub name: String,
    /// What the node computes.
    pub kind: LayerKind,
    /// Indices of the nodes feeding this one.
    pub inputs: Vec<usize>,
    /// Output shape without the batch axis.
    pub output_shape: Vec<usize>,
    /// Trainable parameters.
    pub trainable_params: usize,
    /// Non-trainable state (batch-norm running statistics).
    pub non_trainable_params: usize,
}

/// The MLSTM-FCN topology as a DAG of [`LayerNode`]s, in topological order.
///
/// # Example
///
/// ```rust
/// use mlstm_models::{MlstmFcnConfig, NetworkGraph};
///
/// let graph = NetworkGraph::build(&MlstmFcnConfig::new(13, 93, 88)).unwrap();
/// assert_eq!(graph.output_shape(), &[88]);
/// println!("{}", graph.summary());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkGraph {
    nodes: Vec<LayerNode>,
}

/// Sizes the modules need, resolved by shape inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrentShape {
    /// Steps the recurrent unit walks.
    pub steps: usize,
    /// Features per step.
    pub features: usize,
}

impl NetworkGraph {
    /// Validate `config` and assemble its graph.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidConfig`] or [`ModelError::ShapeCollapse`].
    pub fn build(config: &MlstmFcnConfig) -> Result<Self> {
        config.validate()?;
        let mut graph = Self { nodes: Vec::new() };

        let input = graph.push(
            "input",
            LayerKind::Input,
            vec![],
            vec![config.n_vars, config.seq_len],
            0,
        );

        // recurrent tower
        let mut rnn_in = input;
        let (mut steps, mut features) = (config.n_vars, config.seq_len);
        if config.pre_convolve_rnn {
            let filters = config.pre_convolve_filters();
            let kernel = config.pre_convolve_kernel();
            let stride = config.pre_convolve_stride;
            let out_len = ConvPadding::Same
                .output_len(features, kernel, stride)
                .ok_or_else(|| ModelError::ShapeCollapse {
                    layer: "pre_conv".to_string(),
                    input_len: features,
                    kernel,
                    stride,
                })?;
            let params = steps * filters * kernel + if config.use_bias { filters } else { 0 };
            let conv = graph.push(
                "pre_conv",
                LayerKind::Conv1d {
                    filters,
                    kernel,
                    stride,
                    padding: ConvPadding::Same,
                    bias: config.use_bias,
                },
                vec![rnn_in],
                vec![filters, out_len],
                params,
            );
            rnn_in = graph.push(
                "pre_conv_act",
                LayerKind::Activation(config.activation),
                vec![conv],
                vec![filters, out_len],
                0,
            );
            steps = filters;
            features = out_len;
        }

        let masking = graph.push(
            "masking",
            LayerKind::Masking,
            vec![rnn_in],
            vec![steps, features],
            0,
        );
        let units = config.lstm_cells;
        let mut rnn_params = features * 4 * units + units * 4 * units + 4 * units;
        if config.attention {
            rnn_params += features * units + units * units + units + features * 4 * units;
        }
        let rnn = graph.push(
            "lstm",
            LayerKind::Recurrent {
                units,
                attention: config.attention,
            },
            vec![masking],
            vec![units],
            rnn_params,
        );
        let rnn_out = graph.push(
            "lstm_dropout",
            LayerKind::Dropout(config.dropout),
            vec![rnn],
            vec![units],
            0,
        );

        // convolution tower
        let mut current = input;
        let (mut channels, mut len) = (config.n_vars, config.seq_len);
        for (index, (&filters, &kernel)) in config
            .conv_filters
            .iter()
            .zip(&config.conv_kernels)
            .enumerate()
        {
            let stage = index + 1;
            let name = format!("conv{}", stage);
            len = config
                .conv_padding
                .output_len(len, kernel, 1)
                .ok_or_else(|| ModelError::ShapeCollapse {
                    layer: name.clone(),
                    input_len: len,
                    kernel,
                    stride: 1,
                })?;
            let conv = graph.push(
                &name,
                LayerKind::Conv1d {
                    filters,
                    kernel,
                    stride: 1,
                    padding: config.conv_padding,
                    bias: true,
                },
                vec![current],
                vec![filters, len],
                channels * filters * kernel + filters,
            );
            let bn = graph.push(
                &format!("bn{}", stage),
                LayerKind::BatchNorm,
                vec![conv],
                vec![filters, len],
                2 * filters,
            );
            graph.nodes[bn].non_trainable_params = 2 * filters;
            current = graph.push(
                &format!("act{}", stage),
                LayerKind::Activation(config.activation),
                vec![bn],
                vec![filters, len],
                0,
            );

            if config.stage_has_gate(index) {
                let bottleneck = (filters / config.squeeze_ratio).max(1);
                let bias = if config.use_bias { bottleneck + filters } else { 0 };
                current = graph.push(
                    &format!("se{}", stage),
                    LayerKind::SqueezeExcite {
                        bottleneck,
                        gate: config.output_activation,
                    },
                    vec![current],
                    vec![filters, len],
                    2 * filters * bottleneck + bias,
                );
            }
            channels = filters;
        }
        let gap = graph.push(
            "gap",
            LayerKind::GlobalAvgPool,
            vec![current],
            vec![channels],
            0,
        );

        // merge
        let merged = graph.push(
            "concat",
            LayerKind::Concatenate,
            vec![rnn_out, gap],
            vec![units + channels],
            0,
        );
        graph.push(
            "classifier",
            LayerKind::Dense {
                units: config.n_classes,
                activation: config.output_activation,
            },
            vec![merged],
            vec![config.n_classes],
            (units + channels) * config.n_classes + config.n_classes,
        );

        Ok(graph)
    }

    fn push(
        &mut self,
        name: &str,
        kind: LayerKind,
        inputs: Vec<usize>,
        output_shape: Vec<usize>,
        trainable_params: usize,
    ) -> usize {
        self.nodes.push(LayerNode {
            name: name.to_string(),
            kind,
            inputs,
            output_shape,
            trainable_params,
            non_trainable_params: 0,
        });
        self.nodes.len() - 1
    }

    /// All nodes in topological order.
    #[must_use]
    pub fn nodes(&self) -> &[LayerNode] {
        &self.nodes
    }

    /// Look up a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&LayerNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Shape of the final node.
    #[must_use]
    pub fn output_shape(&self) -> &[usize] {
        self.nodes.last().map_or(&[][..], |n| n.output_shape.as_slice())
    }

    /// Steps and features seen by the recurrent unit.
    #[must_use]
    pub fn recurrent_shape(&self) -> RecurrentShape {
        match self.node("masking").map(|n| n.output_shape.as_slice()) {
            Some(&[steps, features]) => RecurrentShape { steps, features },
            _ => RecurrentShape {
                steps: 0,
                features: 0,
            },
        }
    }

    /// Sum of trainable parameters.
    #[must_use]
    pub fn trainable_params(&self) -> usize {
        self.nodes.iter().map(|n| n.trainable_params).sum()
    }

    /// Sum of non-trainable state.
    #[must_use]
    pub fn non_trainable_params(&self) -> usize {
        self.nodes.iter().map(|n| n.non_trainable_params).sum()
    }

    /// Trainable plus non-trainable.
    #[must_use]
    pub fn total_params(&self) -> usize {
        self.trainable_params() + self.non_trainable_params()
    }

    /// Render a layer table with shapes, parameter counts and connections.
    #[must_use]
    pub fn summary(&self) -> String {
        let rule = "-".repeat(86);
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<30}{:<18}{:>12}  {}",
            "Layer (type)", "Output Shape", "Param #", "Connected to"
        );
        let _ = writeln!(out, "{}", rule);
        for node in &self.nodes {
            let shape = format!("{:?}", node.output_shape);
            let inputs: Vec<&str> = node
                .inputs
                .iter()
                .map(|&i| self.nodes[i].name.as_str())
                .collect();
            let _ = writeln!(
                out,
                "{:<30}{:<18}{:>12}  {}",
                format!("{} ({})", node.name, node.kind.type_name()),
                shape,
                node.trainable_params + node.non_trainable_params,
                inputs.join(", ")
            );
        }
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "Total params: {}", self.total_params());
        let _ = writeln!(out, "Trainable params: {}", self.trainable_params());
        let _ = writeln!(out, "Non-trainable params: {}", self.non_trainable_params());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gates(graph: &NetworkGraph) -> Vec<&str> {
        graph
            .nodes()
            .iter()
            .filter(|n| matches!(n.kind, LayerKind::SqueezeExcite { .. }))
            .map(|n| n.name.as_str())
            .collect()
    }

    #[test]
    fn test_default_topology() {
        let graph = NetworkGraph::build(&MlstmFcnConfig::new(13, 93, 88)).unwrap();
        assert_eq!(graph.output_shape(), &[88]);
        assert_eq!(gates(&graph), vec!["se1", "se2"]);
        assert_eq!(graph.node("conv3").unwrap().output_shape, vec![128, 93 - 7 - 4 - 2]);
        assert_eq!(graph.node("concat").unwrap().output_shape, vec![8 + 128]);
        assert_eq!(
            graph.recurrent_shape(),
            RecurrentShape {
                steps: 13,
                features: 93
            }
        );
    }

    #[test]
    fn test_single_stage_has_no_gate() {
        let config = MlstmFcnConfig::new(2, 20, 3)
            .with_conv_filters(vec![16])
            .with_conv_kernels(vec![3]);
        let graph = NetworkGraph::build(&config).unwrap();
        assert!(gates(&graph).is_empty());
    }

    #[test]
    fn test_shape_collapse() {
        let err = NetworkGraph::build(&MlstmFcnConfig::new(3, 12, 2)).unwrap_err();
        match err {
            ModelError::ShapeCollapse { layer, input_len, .. } => {
                assert_eq!(layer, "conv3");
                assert_eq!(input_len, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        let same = MlstmFcnConfig::new(3, 12, 2).with_conv_padding(ConvPadding::Same);
        assert!(NetworkGraph::build(&same).is_ok());
    }

    #[test]
    fn test_pre_convolve_shapes() {
        let config = MlstmFcnConfig::new(13, 93, 5).with_pre_convolve(2);
        let graph = NetworkGraph::build(&config).unwrap();
        // Same padding of 3 with kernel 8 and stride 2
        assert_eq!(graph.node("pre_conv").unwrap().output_shape, vec![6, 46]);
        assert_eq!(
            graph.recurrent_shape(),
            RecurrentShape {
                steps: 6,
                features: 46
            }
        );
    }

    #[test]
    fn test_param_counts() {
        let config = MlstmFcnConfig::new(2, 10, 3)
            .with_lstm_cells(4)
            .with_conv_filters(vec![16, 8])
            .with_conv_kernels(vec![3, 3])
            .with_squeeze_ratio(4);
        let graph = NetworkGraph::build(&config).unwrap();

        let lstm = 10 * 16 + 4 * 16 + 16;
        let conv1 = 2 * 16 * 3 + 16;
        let bn1 = 2 * 16;
        let se1 = 2 * 16 * 4;
        let conv2 = 16 * 8 * 3 + 8;
        let bn2 = 2 * 8;
        let dense = (4 + 8) * 3 + 3;
        assert_eq!(
            graph.trainable_params(),
            lstm + conv1 + bn1 + se1 + conv2 + bn2 + dense
        );
        assert_eq!(graph.non_trainable_params(), bn1 + bn2);
    }

    #[test]
    fn test_summary_lists_every_node() {
        let graph = NetworkGraph::build(&MlstmFcnConfig::new(2, 20, 3)).unwrap();
        let summary = graph.summary();
        for node in graph.nodes() {
            assert!(summary.contains(&node.name));
        }
        assert!(summary.contains(&format!("Total params: {}", graph.total_params())));
    }
}

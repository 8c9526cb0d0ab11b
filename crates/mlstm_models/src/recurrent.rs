//! Masked LSTM with an optional additive-attention context.
//!
//! Steps whose features are all exactly zero are masked: the cell still
//! computes a candidate state but the previous hidden and cell states are
//! carried forward unchanged. The layer returns the final hidden state.
//!
//! The cell is written out here because `burn::nn::Lstm` has no step mask.

use burn::module::Param;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{sigmoid, softmax, tanh};

/// `[batch, steps]` mask: 1.0 where a step has any non-zero feature.
pub fn timestep_mask<B: Backend>(x: &Tensor<B, 3>) -> Tensor<B, 2> {
    let [batch, steps, _] = x.dims();
    x.clone()
        .abs()
        .sum_dim(2)
        .reshape([batch, steps])
        .greater_elem(0.0)
        .float()
}

/// Additive attention over the whole input sequence, queried by the hidden
/// state at every step.
#[derive(Module, Debug)]
pub struct StepAttention<B: Backend> {
    keys: Linear<B>,
    query: Linear<B>,
    score: Linear<B>,
    context: Linear<B>,
}

impl<B: Backend> StepAttention<B> {
    fn new(features: usize, hidden: usize, device: &B::Device) -> Self {
        let linear = |d_in: usize, d_out: usize| {
            LinearConfig::new(d_in, d_out)
                .with_bias(false)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device)
        };
        Self {
            keys: linear(features, hidden),
            query: linear(hidden, hidden),
            score: linear(hidden, 1),
            context: linear(features, 4 * hidden),
        }
    }

    /// Gate contribution `[batch, 4 * hidden]` for the current hidden state.
    fn forward(
        &self,
        x: Tensor<B, 3>,
        keys: Tensor<B, 3>,
        mask: Tensor<B, 2>,
        h: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        let [batch, steps, features] = x.dims();
        let hidden = h.dims()[1];

        let query = self.query.forward(h).reshape([batch, 1, hidden]);
        let energy = tanh(keys + query);
        let scores = self.score.forward(energy).reshape([batch, steps]);
        let scores = scores + (mask - 1.0) * 1e9;
        let weights = softmax(scores, 1).reshape([batch, steps, 1]);
        let context = (x * weights).sum_dim(1).reshape([batch, features]);
        self.context.forward(context)
    }
}

/// Single-layer LSTM over `[batch, steps, features]` honoring a step mask.
///
/// Gate order in the fused projections is input, forget, cell, output.
#[derive(Module, Debug)]
pub struct MaskedLstm<B: Backend> {
    input: Linear<B>,
    hidden: Linear<B>,
    attention: Option<StepAttention<B>>,
    #[module(skip)]
    units: usize,
}

impl<B: Backend> MaskedLstm<B> {
    /// Create an LSTM reading `features` per step with `units` hidden units.
    pub fn new(features: usize, units: usize, attention: bool, device: &B::Device) -> Self {
        let mut input = LinearConfig::new(features, 4 * units)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);
        // forget-gate bias starts at one
        let bias = Tensor::cat(
            vec![
                Tensor::zeros([units], device),
                Tensor::ones([units], device),
                Tensor::zeros([2 * units], device),
            ],
            0,
        );
        input.bias = Some(Param::from_tensor(bias));

        let hidden = LinearConfig::new(units, 4 * units)
            .with_bias(false)
            .with_initializer(Initializer::XavierUniform { gain: 1.0 })
            .init(device);

        Self {
            input,
            hidden,
            attention: attention.then(|| StepAttention::new(features, units, device)),
            units,
        }
    }

    /// Hidden units.
    pub fn units(&self) -> usize {
        self.units
    }

    /// Final hidden state `[batch, units]`.
    pub fn forward(&self, x: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, steps, _] = x.dims();
        let units = self.units;
        let device = x.device();

        let projected = self.input.forward(x.clone());
        let keys = self
            .attention
            .as_ref()
            .map(|attention| attention.keys.forward(x.clone()));

        let mut h = Tensor::<B, 2>::zeros([batch, units], &device);
        let mut c = Tensor::<B, 2>::zeros([batch, units], &device);
        for t in 0..steps {
            let mut gates = projected
                .clone()
                .slice([0..batch, t..t + 1, 0..4 * units])
                .reshape([batch, 4 * units])
                + self.hidden.forward(h.clone());
            if let (Some(attention), Some(keys)) = (&self.attention, &keys) {
                gates = gates
                    + attention.forward(x.clone(), keys.clone(), mask.clone(), h.clone());
            }

            let i = sigmoid(gates.clone().slice([0..batch, 0..units]));
            let f = sigmoid(gates.clone().slice([0..batch, units..2 * units]));
            let g = tanh(gates.clone().slice([0..batch, 2 * units..3 * units]));
            let o = sigmoid(gates.slice([0..batch, 3 * units..4 * units]));

            let c_next = f * c.clone() + i * g;
            let h_next = o * tanh(c_next.clone());

            let keep = mask.clone().slice([0..batch, t..t + 1]);
            let carry = keep.clone().neg() + 1.0;
            c = c_next * keep.clone() + c * carry.clone();
            h = h_next * keep + h * carry;
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn values(t: Tensor<B, 2>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    #[test]
    fn test_timestep_mask() {
        let device = Default::default();
        let x = Tensor::<B, 3>::from_floats(
            [[[1.0, 0.0], [0.0, 0.0], [0.0, -2.0]]],
            &device,
        );
        assert_eq!(values(timestep_mask(&x)), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_output_shape_and_param_count() {
        let device = Default::default();
        let lstm = MaskedLstm::<B>::new(5, 4, false, &device);
        assert_eq!(lstm.num_params(), 5 * 16 + 16 + 4 * 16);

        let x = Tensor::<B, 3>::random([3, 6, 5], Distribution::Normal(0.0, 1.0), &device);
        let mask = timestep_mask(&x);
        assert_eq!(lstm.forward(x, mask).dims(), [3, 4]);

        let attention = MaskedLstm::<B>::new(5, 4, true, &device);
        assert_eq!(
            attention.num_params(),
            lstm.num_params() + 5 * 4 + 4 * 4 + 4 + 5 * 16
        );
    }

    #[test]
    fn test_trailing_masked_steps_do_not_change_state() {
        let device = Default::default();
        let lstm = MaskedLstm::<B>::new(3, 4, false, &device);

        let short = Tensor::<B, 3>::random([2, 4, 3], Distribution::Normal(0.0, 1.0), &device);
        let padded = Tensor::cat(vec![short.clone(), Tensor::zeros([2, 3, 3], &device)], 1);

        let a = values(lstm.forward(short.clone(), timestep_mask(&short)));
        let b = values(lstm.forward(padded.clone(), timestep_mask(&padded)));
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_attention_ignores_padding() {
        let device = Default::default();
        let lstm = MaskedLstm::<B>::new(3, 4, true, &device);

        let short = Tensor::<B, 3>::random([1, 5, 3], Distribution::Normal(0.0, 1.0), &device);
        let padded = Tensor::cat(vec![short.clone(), Tensor::zeros([1, 2, 3], &device)], 1);

        let a = values(lstm.forward(short.clone(), timestep_mask(&short)));
        let b = values(lstm.forward(padded.clone(), timestep_mask(&padded)));
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-5);
        }
    }
}

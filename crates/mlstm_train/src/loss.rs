//! Sample-weighted categorical cross-entropy.

use burn::prelude::*;
use burn::tensor::activation::log_softmax;

/// Categorical cross-entropy over output-activated class scores.
///
/// Scores are renormalized to sum to one per sample and clamped to
/// `[epsilon, 1 - epsilon]` before the log, so sigmoid outputs can be fed
/// directly. With `from_logits` the scores are raw logits and go through a
/// log-softmax instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedCrossEntropy {
    epsilon: f32,
    from_logits: bool,
}

impl Default for WeightedCrossEntropy {
    fn default() -> Self {
        Self {
            epsilon: 1e-7,
            from_logits: false,
        }
    }
}

impl WeightedCrossEntropy {
    /// Create a loss for probability-like scores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the clamping epsilon.
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Treat scores as raw logits.
    #[must_use]
    pub fn with_from_logits(mut self, from_logits: bool) -> Self {
        self.from_logits = from_logits;
        self
    }

    /// Unweighted loss of every sample, `[batch]`.
    pub fn per_sample<B: Backend>(
        &self,
        scores: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> Tensor<B, 1> {
        let [batch, _] = scores.dims();
        let log_probs = if self.from_logits {
            log_softmax(scores, 1)
        } else {
            let total = scores.clone().sum_dim(1);
            (scores / total)
                .clamp(self.epsilon, 1.0 - self.epsilon)
                .log()
        };
        log_probs
            .gather(1, targets.reshape([batch, 1]))
            .reshape([batch])
            .neg()
    }

    /// Mean over the batch of `loss * weight`, shape `[1]`.
    pub fn forward<B: Backend>(
        &self,
        scores: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
        weights: Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        (self.per_sample(scores, targets) * weights).mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn scalar(t: Tensor<B, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn test_uniform_scores() {
        let device = Default::default();
        let scores = Tensor::<B, 2>::full([3, 4], 0.25, &device);
        let targets = Tensor::<B, 1, Int>::from_ints([0, 1, 3], &device);
        let weights = Tensor::<B, 1>::ones([3], &device);

        let loss = scalar(WeightedCrossEntropy::new().forward(scores, targets, weights));
        assert!((loss - 4.0f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_sigmoid_scores_are_renormalized() {
        let device = Default::default();
        // 0.6 / (0.6 + 0.2) = 0.75
        let scores = Tensor::<B, 2>::from_floats([[0.6, 0.2]], &device);
        let targets = Tensor::<B, 1, Int>::from_ints([0], &device);

        let loss = WeightedCrossEntropy::new().per_sample(scores, targets);
        assert!((scalar(loss) + 0.75f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_weights_scale_each_sample() {
        let device = Default::default();
        let scores = Tensor::<B, 2>::from_floats([[0.5, 0.5], [0.9, 0.1]], &device);
        let targets = Tensor::<B, 1, Int>::from_ints([0, 0], &device);
        let loss_fn = WeightedCrossEntropy::new();

        let per_sample: Vec<f32> = loss_fn
            .per_sample(scores.clone(), targets.clone())
            .into_data()
            .to_vec()
            .unwrap();
        let weights = Tensor::<B, 1>::from_floats([2.0, 0.0], &device);
        let weighted = scalar(loss_fn.forward(scores, targets, weights));
        assert!((weighted - per_sample[0]).abs() < 1e-5);
    }

    #[test]
    fn test_clamp_keeps_loss_finite() {
        let device = Default::default();
        let scores = Tensor::<B, 2>::from_floats([[1.0, 0.0]], &device);
        let targets = Tensor::<B, 1, Int>::from_ints([1], &device);
        let loss = scalar(WeightedCrossEntropy::new().per_sample(scores, targets));
        assert!(loss.is_finite());
        assert!((loss + 1e-7f32.ln()).abs() < 1e-2);
    }

    #[test]
    fn test_from_logits() {
        let device = Default::default();
        let logits = Tensor::<B, 2>::from_floats([[0.0, 0.0]], &device);
        let targets = Tensor::<B, 1, Int>::from_ints([1], &device);
        let loss = WeightedCrossEntropy::new()
            .with_from_logits(true)
            .per_sample(logits, targets);
        assert!((scalar(loss) - 2.0f32.ln()).abs() < 1e-5);
    }
}

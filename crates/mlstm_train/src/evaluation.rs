//! Model evaluation.
//!
//! Rebuilds a model, reloads its best checkpoint and reports loss, accuracy,
//! predictions and a confusion matrix on the test split.

use std::fmt::Write as _;

use burn::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TrainError};
use crate::loss::WeightedCrossEntropy;
use crate::trainer::{prepare_data, TrainConfig};
use mlstm_data::{DataLoader, DatasetContext};
use mlstm_models::{
    load_weights, CheckpointMetadata, MlstmFcn, MlstmFcnConfig, OutputActivation,
};

/// Argmax of each row, on the host.
pub(crate) fn host_predictions<B: Backend>(scores: Tensor<B, 2>) -> Vec<usize> {
    // integer element type differs across backends
    scores
        .argmax(1)
        .into_data()
        .iter::<i64>()
        .map(|p| p as usize)
        .collect()
}

/// Confusion matrix (row = true class, column = predicted class).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// The matrix values.
    pub matrix: Vec<Vec<usize>>,
    /// Number of classes.
    pub n_classes: usize,
}

impl ConfusionMatrix {
    /// Count predictions against targets; out-of-range indices are ignored.
    pub fn from_predictions(predictions: &[usize], targets: &[usize], n_classes: usize) -> Self {
        let mut matrix = vec![vec![0; n_classes]; n_classes];
        for (&pred, &target) in predictions.iter().zip(targets) {
            if target < n_classes && pred < n_classes {
                matrix[target][pred] += 1;
            }
        }
        Self { matrix, n_classes }
    }

    /// Total number of counted samples.
    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    /// Fraction of samples on the diagonal.
    pub fn accuracy(&self) -> f64 {
        let correct: usize = (0..self.n_classes).map(|i| self.matrix[i][i]).sum();
        match self.total() {
            0 => 0.0,
            total => correct as f64 / total as f64,
        }
    }

    /// Precision of `class`.
    pub fn precision(&self, class: usize) -> f64 {
        let tp = self.matrix[class][class];
        let predicted: usize = (0..self.n_classes).map(|i| self.matrix[i][class]).sum();
        if predicted == 0 {
            0.0
        } else {
            tp as f64 / predicted as f64
        }
    }

    /// Recall of `class`.
    pub fn recall(&self, class: usize) -> f64 {
        let tp = self.matrix[class][class];
        let actual: usize = self.matrix[class].iter().sum();
        if actual == 0 {
            0.0
        } else {
            tp as f64 / actual as f64
        }
    }

    /// F1 score of `class`.
    pub fn f1(&self, class: usize) -> f64 {
        let p = self.precision(class);
        let r = self.recall(class);
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    /// Unweighted mean of the per-class F1 scores.
    pub fn macro_f1(&self) -> f64 {
        if self.n_classes == 0 {
            return 0.0;
        }
        (0..self.n_classes).map(|i| self.f1(i)).sum::<f64>() / self.n_classes as f64
    }

    /// Render as a table labelled with the original class values.
    pub fn to_table(&self, classes: &[i64]) -> String {
        let label = |i: usize| classes.get(i).map_or_else(|| i.to_string(), i64::to_string);
        let mut s = String::new();

        s.push_str("          ");
        for j in 0..self.n_classes {
            let _ = write!(s, "{:>7}", format!("P{}", label(j)));
        }
        s.push('\n');

        for (i, row) in self.matrix.iter().enumerate() {
            let _ = write!(s, "   T{:<6}", label(i));
            for count in row {
                let _ = write!(s, "{:>7}", count);
            }
            s.push('\n');
        }
        s
    }
}

/// Evaluation results with predictions and metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Mean unweighted loss.
    pub loss: f64,
    /// Fraction of correct predictions.
    pub accuracy: f64,
    /// Predicted class indices.
    pub predictions: Vec<usize>,
    /// True class indices.
    pub targets: Vec<usize>,
    /// Original labels, indexed by class.
    pub classes: Vec<i64>,
    /// Confusion matrix.
    pub confusion: ConfusionMatrix,
}

impl EvaluationResult {
    /// Number of evaluated samples.
    pub fn total(&self) -> usize {
        self.targets.len()
    }

    /// Number of correct predictions.
    pub fn correct(&self) -> usize {
        self.predictions
            .iter()
            .zip(&self.targets)
            .filter(|(p, t)| p == t)
            .count()
    }

    /// Predictions mapped back to the original labels.
    pub fn predicted_labels(&self) -> Vec<i64> {
        self.predictions
            .iter()
            .filter_map(|&p| self.classes.get(p).copied())
            .collect()
    }

    /// Human-readable summary with per-class metrics.
    pub fn summary(&self) -> String {
        let cm = &self.confusion;
        let mut s = String::new();
        let _ = writeln!(s, "Final loss:     {:.6}", self.loss);
        let _ = writeln!(s, "Final accuracy: {:.4}", self.accuracy);
        let _ = writeln!(s, "Correct:        {} / {}", self.correct(), self.total());
        let _ = writeln!(s, "\nConfusion Matrix (T=True, P=Predicted):");
        s.push_str(&cm.to_table(&self.classes));
        let _ = writeln!(
            s,
            "\n{:<10} {:>10} {:>10} {:>10}",
            "Class", "Precision", "Recall", "F1"
        );
        let _ = writeln!(s, "{}", "-".repeat(43));
        for i in 0..cm.n_classes {
            let label = self.classes.get(i).copied().unwrap_or(i as i64);
            let _ = writeln!(
                s,
                "{:<10} {:>9.2}% {:>9.2}% {:>9.2}%",
                label,
                cm.precision(i) * 100.0,
                cm.recall(i) * 100.0,
                cm.f1(i) * 100.0
            );
        }
        let _ = writeln!(s, "{}", "-".repeat(43));
        let _ = writeln!(
            s,
            "{:<10} {:>10} {:>10} {:>9.2}%",
            "Macro F1",
            "",
            "",
            cm.macro_f1() * 100.0
        );
        s
    }
}

/// Evaluate a model on the test split of `data`.
///
/// # Errors
///
/// Propagates data and batching errors.
pub fn evaluate_model<B: Backend>(
    model: &MlstmFcn<B>,
    data: &DatasetContext,
    loss_fn: &WeightedCrossEntropy,
    batch_size: usize,
    device: &B::Device,
) -> Result<EvaluationResult> {
    let loader = DataLoader::builder(data.test_dataset()?)
        .batch_size(batch_size)
        .build()?;

    let mut total_loss = 0.0f64;
    let mut predictions = Vec::with_capacity(loader.len());
    let mut targets = Vec::with_capacity(loader.len());

    for batch in loader.iter::<B>(device, 0) {
        let batch = batch?;
        let n = batch.len();

        let scores = model.forward(batch.x);
        predictions.extend(host_predictions(scores.clone()));
        let loss = loss_fn.forward(scores, batch.targets, batch.weights);
        total_loss += loss.into_scalar().elem::<f64>() * n as f64;
        targets.extend(batch.labels);
    }

    let n_classes = data.n_classes();
    let confusion = ConfusionMatrix::from_predictions(&predictions, &targets, n_classes);
    let loss = if targets.is_empty() {
        0.0
    } else {
        total_loss / targets.len() as f64
    };

    Ok(EvaluationResult {
        loss,
        accuracy: confusion.accuracy(),
        predictions,
        targets,
        classes: data.classes().to_vec(),
        confusion,
    })
}

/// Rebuild the model from `model_config`, reload the best checkpoint for
/// the configured prefix and fold, and evaluate it.
///
/// # Errors
///
/// Returns [`TrainError::CheckpointNotFound`] when no weights exist for the
/// prefix and fold, and propagates data, model and loading errors.
pub fn evaluate<B: Backend>(
    model_config: &MlstmFcnConfig,
    data: &DatasetContext,
    config: &TrainConfig,
    device: &B::Device,
) -> Result<EvaluationResult> {
    let paths = config.checkpoint_paths();
    if !paths.exists() {
        return Err(TrainError::CheckpointNotFound {
            path: paths.weights,
        });
    }
    if paths.metadata.exists() {
        let metadata = CheckpointMetadata::load(&paths.metadata)?;
        if &metadata.config != model_config {
            warn!(
                path = %paths.metadata.display(),
                "checkpoint was trained with a different model configuration"
            );
        }
    }

    let data = prepare_data(model_config, data, config)?;
    let model = load_weights(model_config.init::<B>(device)?, &paths.weights, device)?;
    info!(path = %paths.weights.display(), n_test = data.n_test(), "evaluating checkpoint");

    let loss_fn = WeightedCrossEntropy::new()
        .with_from_logits(model_config.output_activation == OutputActivation::Linear);
    let result = evaluate_model(&model, &data, &loss_fn, config.batch_size, device)?;
    info!(loss = result.loss, accuracy = result.accuracy, "evaluation complete");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use ndarray::Array3;

    type B = NdArray<f32>;

    #[test]
    fn test_confusion_matrix() {
        let predictions = vec![0, 1, 0, 1];
        let targets = vec![0, 1, 1, 1];
        let cm = ConfusionMatrix::from_predictions(&predictions, &targets, 2);

        assert_eq!(cm.matrix[0][0], 1);
        assert_eq!(cm.matrix[1][1], 2);
        assert_eq!(cm.matrix[1][0], 1);
        assert!((cm.accuracy() - 0.75).abs() < 1e-12);
        assert!((cm.precision(0) - 0.5).abs() < 1e-12);
        assert!((cm.recall(1) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_table_uses_original_labels() {
        let cm = ConfusionMatrix::from_predictions(&[0, 1], &[0, 1], 2);
        let table = cm.to_table(&[7, 9]);
        assert!(table.contains("P7"));
        assert!(table.contains("T9"));
    }

    #[test]
    fn test_host_predictions() {
        let device = Default::default();
        let scores = Tensor::<B, 2>::from_floats([[0.1, 0.9], [0.8, 0.2], [0.3, 0.7]], &device);
        assert_eq!(host_predictions(scores), vec![1, 0, 1]);
    }

    fn context() -> DatasetContext {
        let x_train = Array3::from_shape_fn((4, 2, 10), |(i, v, t)| (i + v + t) as f32 / 10.0);
        let x_test = Array3::from_shape_fn((3, 2, 10), |(i, v, t)| (i * v + t) as f32 / 10.0);
        DatasetContext::from_arrays(x_train, &[3, 5, 3, 5], x_test, &[5, 3, 5]).unwrap()
    }

    fn model_config() -> MlstmFcnConfig {
        MlstmFcnConfig::new(2, 10, 2)
            .with_lstm_cells(4)
            .with_conv_filters(vec![4, 4])
            .with_conv_kernels(vec![3, 3])
            .with_squeeze_ratio(2)
    }

    #[test]
    fn test_evaluate_model() {
        let device = Default::default();
        let model = model_config().init::<B>(&device).unwrap();
        let result =
            evaluate_model(&model, &context(), &WeightedCrossEntropy::new(), 2, &device).unwrap();

        assert_eq!(result.total(), 3);
        assert_eq!(result.targets, vec![1, 0, 1]);
        assert_eq!(result.confusion.total(), 3);
        assert!(result.loss.is_finite());
        assert!((result.accuracy - result.correct() as f64 / 3.0).abs() < 1e-12);
        assert!(result.predicted_labels().iter().all(|l| [3, 5].contains(l)));
        assert!(result.summary().contains("Macro F1"));
    }

    #[test]
    fn test_evaluate_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainConfig::default()
            .with_weights_dir(dir.path())
            .with_dataset_fold_id(Some(2));
        let device = Default::default();
        let err = evaluate::<B>(&model_config(), &context(), &config, &device).unwrap_err();
        assert!(matches!(err, TrainError::CheckpointNotFound { .. }));
    }

    #[test]
    fn test_evaluate_reloads_saved_weights() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainConfig::default()
            .with_weights_dir(dir.path())
            .with_dataset_prefix("toy");
        let device = Default::default();

        let model = model_config().init::<B>(&device).unwrap();
        let metadata = CheckpointMetadata::new(model_config()).with_classes(vec![3, 5]);
        mlstm_models::save_checkpoint(&model, &config.checkpoint_paths(), &metadata).unwrap();

        let direct = evaluate_model(
            &model,
            &context(),
            &WeightedCrossEntropy::new(),
            config.batch_size,
            &device,
        )
        .unwrap();
        let reloaded = evaluate::<B>(&model_config(), &context(), &config, &device).unwrap();
        assert_eq!(direct.predictions, reloaded.predictions);
        assert!((direct.loss - reloaded.loss).abs() < 1e-6);
    }
}

//! Integration tests for the prepare, train and evaluate pipeline.
//!
//! These tests run every stage end to end on small synthetic collections.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::{s, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use mlstm::experiment::{run_eval, run_prepare, run_train, summary, ExperimentConfig};
use mlstm::prelude::*;
use mlstm_data::{DatasetMetadata, METADATA_FILE};
use mlstm_models::CheckpointMetadata;

const CLASSES: [i64; 3] = [10, 20, 30];

/// Variable-length samples whose level depends on the class.
///
/// The first three samples of every class have the maximum length, so the
/// training split always contains the longest sequence.
fn synthetic_collection(n_per_class: usize, n_vars: usize) -> RawCollection {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut samples = Vec::new();
    let mut labels = Vec::new();

    for i in 0..n_per_class * CLASSES.len() {
        let class = i % CLASSES.len();
        let len = if i < 3 * CLASSES.len() {
            16
        } else {
            rng.gen_range(8..=16)
        };
        let sample = Array2::from_shape_fn((n_vars, len), |(v, t)| {
            1.0 + class as f32 + 0.1 * v as f32 + 0.05 * t as f32 + rng.gen::<f32>() * 0.1
        });
        samples.push(sample);
        labels.push(CLASSES[class]);
    }

    RawCollection::new(samples, labels).unwrap()
}

fn write_ts(raw: &RawCollection, path: &Path) {
    let mut out = BufWriter::new(File::create(path).unwrap());
    writeln!(out, "@problemName synthetic").unwrap();
    writeln!(out, "@classLabel true 10 20 30").unwrap();
    writeln!(out, "@data").unwrap();
    for (sample, label) in raw.samples().iter().zip(raw.labels()) {
        let dims: Vec<String> = sample
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect();
        writeln!(out, "{}:{}", dims.join(":"), label).unwrap();
    }
}

fn small_model() -> MlstmFcnConfig {
    MlstmFcnConfig::default()
        .with_lstm_cells(4)
        .with_conv_filters(vec![8, 8])
        .with_conv_kernels(vec![3, 3])
        .with_squeeze_ratio(2)
}

#[test]
fn test_prepared_arrays_keep_padding_labels_and_weights() {
    let dir = tempfile::tempdir().unwrap();
    let raw = synthetic_collection(8, 3);

    let prepared = prepare(&raw, &PrepareConfig::default()).unwrap();
    let paths = prepared.save(dir.path()).unwrap();

    let data = load_dataset(&paths, &LoadOptions::default()).unwrap();
    let metadata = DatasetMetadata::load(&dir.path().join(METADATA_FILE)).unwrap();

    assert_eq!(metadata.classes, CLASSES.to_vec());
    assert_eq!(data.n_vars(), 3);
    assert_eq!(data.n_classes(), 3);
    assert_eq!(data.seq_len(), metadata.seq_len);
    assert_eq!(data.y_train().len() + data.n_test(), 24);

    // everything past the true length is exactly zero
    for (x, lengths) in [
        (data.x_train(), &metadata.train_lengths),
        (data.x_test(), &metadata.test_lengths),
    ] {
        for (i, &len) in lengths.iter().enumerate() {
            assert!(len <= data.seq_len());
            let tail = x.slice(s![i, .., len..]);
            assert!(tail.iter().all(|&v| v == 0.0));
        }
    }

    // dense labels and inverse-frequency weights
    assert!(data.y_train().iter().all(|&y| y < 3));
    let weights = data.class_weights(true).unwrap();
    let mut counts = [0usize; 3];
    for &y in data.y_train() {
        counts[y] += 1;
    }
    let weighted: f32 = counts
        .iter()
        .zip(weights.weights())
        .map(|(&c, &w)| c as f32 * w)
        .sum();
    assert!((weighted - data.y_train().len() as f32).abs() < 1e-3);
}

#[test]
fn test_test_split_uses_training_statistics() {
    let raw = synthetic_collection(8, 2);
    let prepared = prepare(&raw, &PrepareConfig::default()).unwrap();
    let stats = &prepared.metadata().normalization;

    let split = PrepareConfig::default().split.indices(raw.labels()).unwrap();
    let test_raw = raw.select(&split.test).unwrap();
    let padded = pad_collection(&test_raw, Some(prepared.metadata().seq_len)).unwrap();
    let expected = stats.apply(&padded).unwrap();

    assert_eq!(expected.x(), prepared.x_test());
}

#[test]
fn test_experiment_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let raw = synthetic_collection(8, 3);
    let source = dir.path().join("synthetic.ts");
    write_ts(&raw, &source);

    let mut config = ExperimentConfig::default();
    config.data.source = Some(source);
    config.data.dir = dir.path().join("data");
    config.model = small_model();
    config.train = TrainConfig::default()
        .with_epochs(2)
        .with_batch_size(8)
        .with_dataset_prefix("synthetic_")
        .with_weights_dir(dir.path().join("weights"));

    let prepared = run_prepare(&config).unwrap();
    assert_eq!(prepared.metadata().classes, CLASSES.to_vec());

    let device = Default::default();
    let report = run_train::<TrainBackend>(&config, &device).unwrap();
    assert_eq!(report.history.len(), 2);
    assert!(report.history.iter().all(|r| r.loss.is_finite()));
    assert!(config.train.checkpoint_paths().exists());

    let saved = CheckpointMetadata::load(&config.train.checkpoint_paths().metadata).unwrap();
    assert_eq!(saved.classes, CLASSES.to_vec());

    let result = run_eval::<CpuBackend>(&config, &device).unwrap();
    assert_eq!(result.total(), prepared.y_test().len());
    assert_eq!(result.classes, CLASSES.to_vec());
    assert!((0.0..=1.0).contains(&result.accuracy));
    assert!(result
        .predicted_labels()
        .iter()
        .all(|label| CLASSES.contains(label)));

    let table = summary(&config).unwrap();
    assert!(table.contains("Total params"));
}

#[test]
fn test_eval_without_training_reports_missing_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let raw = synthetic_collection(4, 2);
    prepare(&raw, &PrepareConfig::default())
        .unwrap()
        .save(&dir.path().join("data"))
        .unwrap();

    let mut config = ExperimentConfig::default();
    config.data.dir = dir.path().join("data");
    config.model = small_model();
    config.train = TrainConfig::default()
        .with_weights_dir(dir.path().join("weights"))
        .with_dataset_fold_id(Some(3));

    let device = Default::default();
    let err = run_eval::<CpuBackend>(&config, &device).unwrap_err();
    assert!(err.to_string().contains("fold_3"));
}

//! Reading raw collections and reading/writing prepared `.npy` arrays.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

use ndarray::{Array1, Array2, Array3, Dimension};
use ndarray_npy::{NpzReader, ReadNpyExt, WriteNpyExt};
use tracing::debug;

use crate::error::{DataError, Result};
use crate::raw::RawCollection;

/// Fail with [`DataError::FileNotFound`] unless `path` exists.
///
/// # Errors
///
/// Returns [`DataError::FileNotFound`] naming the path.
pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(DataError::FileNotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Read a raw collection, choosing the parser from the file extension
/// (`.ts` or `.npz`).
///
/// # Errors
///
/// Returns [`DataError::FileNotFound`] for a missing file and
/// [`DataError::Format`] for unsupported extensions or malformed content.
pub fn read_collection(path: &Path) -> Result<RawCollection> {
    ensure_exists(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("ts") => read_ts(path),
        Some("npz") => read_npz_collection(path),
        _ => Err(DataError::Format(format!(
            "unsupported input {}, expected a .ts or .npz file",
            path.display()
        ))),
    }
}

/// Read a `.ts` (sktime/aeon) file with integer class labels.
///
/// Each data line holds the variables separated by `:`, each variable's
/// values separated by `,`, and the label last. Variables of one sample must
/// share a length; lengths may differ between samples. Missing values (`?`)
/// are rejected.
///
/// # Errors
///
/// Returns [`DataError::Format`] for malformed lines.
pub fn read_ts(path: &Path) -> Result<RawCollection> {
    ensure_exists(path)?;
    let reader = BufReader::new(File::open(path)?);

    let mut in_data = false;
    let mut samples = Vec::new();
    let mut labels = Vec::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.to_lowercase().starts_with("@data") {
            in_data = true;
            continue;
        }
        if !in_data {
            continue;
        }

        let (sample, label) = parse_ts_line(line)
            .map_err(|msg| DataError::Format(format!("{}:{}: {}", path.display(), number + 1, msg)))?;
        samples.push(sample);
        labels.push(label);
    }

    if samples.is_empty() {
        return Err(DataError::Format(format!(
            "{} has no data lines",
            path.display()
        )));
    }
    debug!(path = %path.display(), samples = samples.len(), "read .ts collection");
    RawCollection::new(samples, labels)
}

fn parse_ts_line(line: &str) -> std::result::Result<(Array2<f32>, i64), String> {
    let (values, label) = line
        .rsplit_once(':')
        .ok_or_else(|| "missing class label".to_string())?;
    let label = parse_label(label.trim())?;

    let mut vars: Vec<Vec<f32>> = Vec::new();
    for dim in values.split(':') {
        let series = dim
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s {
                "?" => Err("missing values are not supported".to_string()),
                _ => s.parse::<f32>().map_err(|e| format!("bad value {:?}: {}", s, e)),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        vars.push(series);
    }

    let steps = vars.first().map_or(0, Vec::len);
    if vars.iter().any(|v| v.len() != steps) {
        return Err("variables of one sample have different lengths".to_string());
    }

    let n_vars = vars.len();
    let flat: Vec<f32> = vars.into_iter().flatten().collect();
    let sample = Array2::from_shape_vec((n_vars, steps), flat).map_err(|e| e.to_string())?;
    Ok((sample, label))
}

fn parse_label(s: &str) -> std::result::Result<i64, String> {
    if let Ok(label) = s.parse::<i64>() {
        return Ok(label);
    }
    match s.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 => Ok(value as i64),
        _ => Err(format!("class label {:?} is not an integer", s)),
    }
}

/// Read an `.npz` archive holding `x_0 .. x_{n-1}` (each `(V, T_i)`) and a
/// `labels` array of length `n`.
///
/// # Errors
///
/// Returns [`DataError::Format`] when an entry is missing or has the wrong
/// type.
pub fn read_npz_collection(path: &Path) -> Result<RawCollection> {
    ensure_exists(path)?;
    let mut npz = NpzReader::new(File::open(path)?)
        .map_err(|e| DataError::Format(format!("failed to open {}: {}", path.display(), e)))?;

    let labels = read_npz_labels(&mut npz)?;
    let mut samples = Vec::with_capacity(labels.len());
    for i in 0..labels.len() {
        let name = format!("x_{}", i);
        let sample = match npz.by_name::<ndarray::OwnedRepr<f32>, ndarray::Ix2>(&name) {
            Ok(sample) => sample,
            Err(_) => npz
                .by_name::<ndarray::OwnedRepr<f64>, ndarray::Ix2>(&name)
                .map(|a| a.mapv(|v| v as f32))
                .map_err(|e| DataError::Format(format!("failed to read {:?}: {}", name, e)))?,
        };
        samples.push(sample);
    }
    debug!(path = %path.display(), samples = samples.len(), "read .npz collection");
    RawCollection::new(samples, labels)
}

fn read_npz_labels(npz: &mut NpzReader<File>) -> Result<Vec<i64>> {
    if let Ok(labels) = npz.by_name::<ndarray::OwnedRepr<i64>, ndarray::Ix1>("labels") {
        return Ok(labels.to_vec());
    }
    if let Ok(labels) = npz.by_name::<ndarray::OwnedRepr<i32>, ndarray::Ix1>("labels") {
        return Ok(labels.iter().map(|&l| i64::from(l)).collect());
    }
    let labels = npz
        .by_name::<ndarray::OwnedRepr<f64>, ndarray::Ix1>("labels")
        .map_err(|e| DataError::Format(format!("failed to read \"labels\": {}", e)))?;
    labels_from_floats(labels.iter().copied())
}

fn labels_from_floats(values: impl Iterator<Item = f64>) -> Result<Vec<i64>> {
    values
        .map(|v| {
            if v.fract() == 0.0 {
                Ok(v as i64)
            } else {
                Err(DataError::Format(format!("label {} is not an integer", v)))
            }
        })
        .collect()
}

/// Read a 3-D feature array from `.npy`, accepting `f32` or `f64` data.
///
/// # Errors
///
/// Returns [`DataError::FileNotFound`] or [`DataError::Format`].
pub fn read_features(path: &Path) -> Result<Array3<f32>> {
    ensure_exists(path)?;
    match Array3::<f32>::read_npy(BufReader::new(File::open(path)?)) {
        Ok(x) => Ok(x),
        Err(first) => Array3::<f64>::read_npy(BufReader::new(File::open(path)?))
            .map(|x| x.mapv(|v| v as f32))
            .map_err(|_| {
                DataError::Format(format!("failed to read {}: {}", path.display(), first))
            }),
    }
}

/// Read a label vector from `.npy`: `i64` or `f64`, shape `(n,)` or `(n, 1)`.
///
/// # Errors
///
/// Returns [`DataError::FileNotFound`] or [`DataError::Format`].
pub fn read_labels(path: &Path) -> Result<Vec<i64>> {
    ensure_exists(path)?;
    let open = || -> Result<BufReader<File>> { Ok(BufReader::new(File::open(path)?)) };

    if let Ok(y) = Array1::<i64>::read_npy(open()?) {
        return Ok(y.to_vec());
    }
    if let Ok(y) = Array2::<i64>::read_npy(open()?) {
        return column(y.iter().copied().collect(), y.raw_dim(), path);
    }
    if let Ok(y) = Array1::<f64>::read_npy(open()?) {
        return labels_from_floats(y.iter().copied());
    }
    let y = Array2::<f64>::read_npy(open()?)
        .map_err(|e| DataError::Format(format!("failed to read {}: {}", path.display(), e)))?;
    let values = labels_from_floats(y.iter().copied())?;
    column(values, y.raw_dim(), path)
}

fn column<D: Dimension>(values: Vec<i64>, dim: D, path: &Path) -> Result<Vec<i64>> {
    match dim.slice() {
        [_, 1] => Ok(values),
        other => Err(DataError::Format(format!(
            "labels in {} have shape {:?}, expected (n,) or (n, 1)",
            path.display(),
            other
        ))),
    }
}

/// Write any array as `.npy`.
///
/// # Errors
///
/// Returns [`DataError::Io`] or [`DataError::Format`] on write failure.
pub fn write_npy<A: WriteNpyExt>(path: &Path, array: &A) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    array
        .write_npy(writer)
        .map_err(|e| DataError::Format(format!("failed to write {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_npy::NpzWriter;
    use std::io::Write;

    #[test]
    fn test_parse_ts_line() {
        let (sample, label) = parse_ts_line("1.0,2.0,3.0:4.0,5.0,6.0:2").unwrap();
        assert_eq!(sample.shape(), &[2, 3]);
        assert_eq!(sample[[1, 0]], 4.0);
        assert_eq!(label, 2);
    }

    #[test]
    fn test_parse_ts_line_rejects_missing_and_ragged() {
        assert!(parse_ts_line("1.0,?,3.0:1").is_err());
        assert!(parse_ts_line("1.0,2.0:3.0:1").is_err());
        assert!(parse_ts_line("1.0,2.0:cat").is_err());
    }

    #[test]
    fn test_read_ts_variable_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.ts");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "@problemName toy").unwrap();
        writeln!(file, "@data").unwrap();
        writeln!(file, "1,2,3:4,5,6:1").unwrap();
        writeln!(file, "1,2:3,4:7").unwrap();
        drop(file);

        let raw = read_collection(&path).unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw.n_vars(), 2);
        assert_eq!(raw.lengths(), vec![3, 2]);
        assert_eq!(raw.labels(), &[1, 7]);
    }

    #[test]
    fn test_read_npz_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.npz");
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("x_0", &Array2::<f32>::ones((3, 4))).unwrap();
        npz.add_array("x_1", &Array2::<f32>::zeros((3, 2))).unwrap();
        npz.add_array("labels", &Array1::from(vec![5_i64, 9])).unwrap();
        npz.finish().unwrap();

        let raw = read_collection(&path).unwrap();
        assert_eq!(raw.lengths(), vec![4, 2]);
        assert_eq!(raw.labels(), &[5, 9]);
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = read_features(Path::new("/nonexistent/X_train.npy")).unwrap_err();
        assert_eq!(err.to_string(), "File /nonexistent/X_train.npy not found!");
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.mat");
        File::create(&path).unwrap();
        assert!(matches!(read_collection(&path), Err(DataError::Format(_))));
    }

    #[test]
    fn test_labels_column_and_float() {
        let dir = tempfile::tempdir().unwrap();
        let column_path = dir.path().join("y_col.npy");
        write_npy(&column_path, &Array2::<i64>::from_elem((3, 1), 4)).unwrap();
        assert_eq!(read_labels(&column_path).unwrap(), vec![4, 4, 4]);

        let float_path = dir.path().join("y_f.npy");
        write_npy(&float_path, &Array1::from(vec![1.0_f64, 2.0])).unwrap();
        assert_eq!(read_labels(&float_path).unwrap(), vec![1, 2]);
    }
}

//! Loads labeled 28x28 digit images, normalizes them and splits them into train/test partitions
//!
//! MNIST is fetched and cached by `burn`'s dataset utilities, or read from a directory holding the
//! four uncompressed IDX files. A synthetic dataset of class-dependent stripes is available for
//! offline runs.

use std::{
    fmt::{self, Display},
    fs,
    path::{Path, PathBuf},
};

use burn::data::dataset::{Dataset as _, vision::MnistDataset};
use clap::ValueEnum;
use rand::{SeedableRng, seq::SliceRandom};
use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64Mcg;
use thiserror::Error;

pub const IMAGE_WIDTH: usize = 28;
pub const IMAGE_HEIGHT: usize = 28;
pub const N_FEATURES: usize = IMAGE_WIDTH * IMAGE_HEIGHT;
pub const N_CLASSES: usize = 10;

/// Size of the test partition of the standard MNIST split
pub const MNIST_TEST_LEN: usize = 10_000;

const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

const IDX_IMAGES_MAGIC: u32 = 0x0000_0803;
const IDX_LABELS_MAGIC: u32 = 0x0000_0801;

/// Errors while loading or splitting a dataset
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Could not read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Bad IDX magic number {got:#010x}, expected {expected:#010x}")]
    BadMagic { expected: u32, got: u32 },
    #[error("IDX file is truncated, expected {expected} bytes but got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("Images must be {IMAGE_HEIGHT}x{IMAGE_WIDTH}, got {rows}x{cols}")]
    ImageSize { rows: usize, cols: usize },
    #[error("Found {images} images but {labels} labels")]
    CountMismatch { images: usize, labels: usize },
    #[error("Label {label} is not a digit")]
    InvalidLabel { label: u8 },
    #[error("Cannot hold out {test_len} of {len} samples for testing")]
    InvalidSplit { test_len: usize, len: usize },
}

/// Toggles between dataset types
#[derive(Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Mnist,
    Synthetic,
}

impl Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Mnist => write!(f, "mnist"),
            Dataset::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// A flattened image with intensities in `[0, 1]` and its digit label
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Position of the sample in the full loaded dataset
    pub id: usize,
    pub features: Vec<f32>,
    pub label: u8,
}

impl Sample {
    /// Builds a sample from raw `0..=255` intensities
    pub fn from_pixels(id: usize, pixels: impl IntoIterator<Item = f32>, label: u8) -> Self {
        Self {
            id,
            features: pixels.into_iter().map(normalize).collect(),
            label,
        }
    }
}

/// Scales a raw 8-bit intensity to `[0, 1]`
pub fn normalize(pixel: f32) -> f32 {
    pixel / 255.0
}

/// An ordered collection of samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    samples: Vec<Sample>,
}

impl Partition {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Disjoint train and test partitions of one dataset
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Partition,
    pub test: Partition,
}

/// Holds out the last `test_len` samples for testing
pub fn train_test_split(mut samples: Vec<Sample>, test_len: usize) -> Result<Split, DatasetError> {
    let len = samples.len();
    if test_len == 0 || test_len >= len {
        return Err(DatasetError::InvalidSplit { test_len, len });
    }
    let test = samples.split_off(len - test_len);
    Ok(Split {
        train: Partition::new(samples),
        test: Partition::new(test),
    })
}

/// Loads a dataset based on the dataset type
pub fn load_dataset(
    dataset: Dataset,
    data_dir: Option<&Path>,
    class_size: usize,
    seed: u64,
) -> Result<Vec<Sample>, DatasetError> {
    match (dataset, data_dir) {
        (Dataset::Mnist, Some(dir)) => load_mnist_dir(dir),
        (Dataset::Mnist, None) => Ok(load_mnist()),
        (Dataset::Synthetic, _) => Ok(gen_synthetic_digits(class_size, seed)),
    }
}

/// Fetches the 70 000 MNIST images, training images first
///
/// Downloading and caching is delegated to `burn`, which panics when the files cannot be fetched.
pub fn load_mnist() -> Vec<Sample> {
    let train = MnistDataset::train();
    let test = MnistDataset::test();
    log::info!(
        "Fetched MNIST: {} training and {} test images",
        train.len(),
        test.len()
    );
    train
        .iter()
        .chain(test.iter())
        .enumerate()
        .map(|(id, item)| {
            let pixels = item.image.into_iter().flatten();
            Sample::from_pixels(id, pixels, item.label)
        })
        .collect()
}

/// Reads MNIST from the four uncompressed IDX files in `dir`, training images first
pub fn load_mnist_dir(dir: &Path) -> Result<Vec<Sample>, DatasetError> {
    let read = |name: &str| {
        let path = dir.join(name);
        fs::read(&path).map_err(|source| DatasetError::Io { path, source })
    };
    let mut samples = parse_idx(&read(TRAIN_IMAGES)?, &read(TRAIN_LABELS)?, 0)?;
    let test = parse_idx(&read(TEST_IMAGES)?, &read(TEST_LABELS)?, samples.len())?;
    samples.extend(test);
    log::info!("Read {} samples from '{}'", samples.len(), dir.display());
    Ok(samples)
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<usize, DatasetError> {
    let word = bytes
        .get(offset..offset + 4)
        .ok_or(DatasetError::Truncated {
            expected: offset + 4,
            got: bytes.len(),
        })?;
    Ok(u32::from_be_bytes([word[0], word[1], word[2], word[3]]) as usize)
}

fn check_magic(bytes: &[u8], expected: u32) -> Result<(), DatasetError> {
    let got = read_u32(bytes, 0)? as u32;
    if got != expected {
        return Err(DatasetError::BadMagic { expected, got });
    }
    Ok(())
}

/// Parses a pair of IDX image/label files into samples numbered from `first_id`
pub fn parse_idx(images: &[u8], labels: &[u8], first_id: usize) -> Result<Vec<Sample>, DatasetError> {
    check_magic(images, IDX_IMAGES_MAGIC)?;
    check_magic(labels, IDX_LABELS_MAGIC)?;

    let n_images = read_u32(images, 4)?;
    let rows = read_u32(images, 8)?;
    let cols = read_u32(images, 12)?;
    let n_labels = read_u32(labels, 4)?;
    if rows != IMAGE_HEIGHT || cols != IMAGE_WIDTH {
        return Err(DatasetError::ImageSize { rows, cols });
    }
    if n_images != n_labels {
        return Err(DatasetError::CountMismatch {
            images: n_images,
            labels: n_labels,
        });
    }

    let pixels = &images[16..];
    let labels = &labels[8..];
    if pixels.len() < n_images * N_FEATURES {
        return Err(DatasetError::Truncated {
            expected: 16 + n_images * N_FEATURES,
            got: images.len(),
        });
    }
    if labels.len() < n_labels {
        return Err(DatasetError::Truncated {
            expected: 8 + n_labels,
            got: labels.len() + 8,
        });
    }

    pixels
        .chunks_exact(N_FEATURES)
        .zip(labels.iter())
        .take(n_images)
        .enumerate()
        .map(|(i, (image, &label))| {
            if label as usize >= N_CLASSES {
                return Err(DatasetError::InvalidLabel { label });
            }
            let pixels = image.iter().map(|&p| p as f32);
            Ok(Sample::from_pixels(first_id + i, pixels, label))
        })
        .collect()
}

/// Generates `class_size` noisy images per digit, digit `c` being a bright horizontal band at rows
/// `4 + 2c` and `5 + 2c`. Samples are shuffled so every partition sees every class.
pub fn gen_synthetic_digits(class_size: usize, seed: u64) -> Vec<Sample> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let noise = Normal::new(0.0f32, 25.0).unwrap();

    let mut images = Vec::with_capacity(class_size * N_CLASSES);
    for label in 0..N_CLASSES as u8 {
        let band = 4 + 2 * label as usize;
        for _ in 0..class_size {
            let pixels = (0..N_FEATURES)
                .map(|i| {
                    let row = i / IMAGE_WIDTH;
                    let base = if row == band || row == band + 1 { 230.0 } else { 10.0 };
                    (base + noise.sample(&mut rng)).clamp(0.0, 255.0)
                })
                .collect::<Vec<f32>>();
            images.push((pixels, label));
        }
    }
    images.shuffle(&mut rng);

    images
        .into_iter()
        .enumerate()
        .map(|(id, (pixels, label))| Sample::from_pixels(id, pixels, label))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn idx_images(images: &[[u8; N_FEATURES]]) -> Vec<u8> {
        let mut bytes = IDX_IMAGES_MAGIC.to_be_bytes().to_vec();
        bytes.extend((images.len() as u32).to_be_bytes());
        bytes.extend((IMAGE_HEIGHT as u32).to_be_bytes());
        bytes.extend((IMAGE_WIDTH as u32).to_be_bytes());
        for image in images {
            bytes.extend_from_slice(image);
        }
        bytes
    }

    fn idx_labels(labels: &[u8]) -> Vec<u8> {
        let mut bytes = IDX_LABELS_MAGIC.to_be_bytes().to_vec();
        bytes.extend((labels.len() as u32).to_be_bytes());
        bytes.extend_from_slice(labels);
        bytes
    }

    #[test]
    fn test_normalized_features_in_unit_range() {
        let samples = gen_synthetic_digits(20, 7);
        assert_eq!(samples.len(), 20 * N_CLASSES);
        for sample in &samples {
            assert_eq!(sample.features.len(), N_FEATURES);
            assert!(sample.features.iter().all(|v| (0.0..=1.0).contains(v)));
            assert!((sample.label as usize) < N_CLASSES);
        }

        let sample = Sample::from_pixels(0, [0.0, 127.5, 255.0], 3);
        assert_eq!(sample.features, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_split_is_a_partition() {
        let samples = gen_synthetic_digits(10, 1);
        let all_ids: HashSet<usize> = samples.iter().map(|s| s.id).collect();
        assert_eq!(all_ids.len(), samples.len());

        let split = train_test_split(samples, 30).unwrap();
        assert_eq!(split.train.len(), 70);
        assert_eq!(split.test.len(), 30);

        let train_ids: HashSet<usize> = split.train.samples().iter().map(|s| s.id).collect();
        let test_ids: HashSet<usize> = split.test.samples().iter().map(|s| s.id).collect();
        assert!(train_ids.is_disjoint(&test_ids));
        let union: HashSet<usize> = train_ids.union(&test_ids).copied().collect();
        assert_eq!(union, all_ids);
    }

    #[test]
    fn test_invalid_split() {
        let samples = gen_synthetic_digits(1, 1);
        assert!(matches!(
            train_test_split(samples.clone(), 0),
            Err(DatasetError::InvalidSplit { test_len: 0, len: 10 })
        ));
        assert!(matches!(
            train_test_split(samples, 10),
            Err(DatasetError::InvalidSplit { test_len: 10, len: 10 })
        ));
    }

    #[test]
    fn test_synthetic_is_seeded() {
        assert_eq!(gen_synthetic_digits(3, 9), gen_synthetic_digits(3, 9));
        assert_ne!(gen_synthetic_digits(3, 9), gen_synthetic_digits(3, 10));
    }

    #[test]
    fn test_parse_idx() {
        let mut first = [0u8; N_FEATURES];
        first[0] = 255;
        let second = [51u8; N_FEATURES];
        let images = idx_images(&[first, second]);
        let labels = idx_labels(&[7, 2]);

        let samples = parse_idx(&images, &labels, 5).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].id, 5);
        assert_eq!(samples[0].label, 7);
        assert_eq!(samples[0].features[0], 1.0);
        assert_eq!(samples[0].features[1], 0.0);
        assert_eq!(samples[1].id, 6);
        assert_eq!(samples[1].label, 2);
        assert!(samples[1].features.iter().all(|&v| v == 0.2));
    }

    #[test]
    fn test_parse_idx_errors() {
        let images = idx_images(&[[0u8; N_FEATURES]]);
        let labels = idx_labels(&[1]);

        assert!(matches!(
            parse_idx(&labels, &labels, 0),
            Err(DatasetError::BadMagic { .. })
        ));
        assert!(matches!(
            parse_idx(&images, &idx_labels(&[1, 2]), 0),
            Err(DatasetError::CountMismatch { images: 1, labels: 2 })
        ));
        assert!(matches!(
            parse_idx(&images[..100], &labels, 0),
            Err(DatasetError::Truncated { .. })
        ));
        assert!(matches!(
            parse_idx(&images, &idx_labels(&[12]), 0),
            Err(DatasetError::InvalidLabel { label: 12 })
        ));
    }

    #[test]
    fn test_load_mnist_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(TRAIN_IMAGES), idx_images(&[[0u8; N_FEATURES]; 3])).unwrap();
        fs::write(dir.path().join(TRAIN_LABELS), idx_labels(&[0, 1, 2])).unwrap();
        fs::write(dir.path().join(TEST_IMAGES), idx_images(&[[255u8; N_FEATURES]])).unwrap();
        fs::write(dir.path().join(TEST_LABELS), idx_labels(&[9])).unwrap();

        let samples = load_mnist_dir(dir.path()).unwrap();
        let ids: Vec<_> = samples.iter().map(|s| s.id).collect();
        assert_eq!(ids, [0, 1, 2, 3]);
        assert_eq!(samples[3].label, 9);

        let split = train_test_split(samples, 1).unwrap();
        assert_eq!(split.test.samples()[0].label, 9);

        let missing = load_mnist_dir(&dir.path().join("nope"));
        assert!(matches!(missing, Err(DatasetError::Io { .. })));
    }
}

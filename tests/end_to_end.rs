//! Full MNIST run. Downloads the dataset and trains for a while, run with
//! `cargo test --release -- --ignored`.

use burn::{
    backend::{Autodiff, NdArray, ndarray::NdArrayDevice},
    optim::AdamConfig,
};
use digit_mlp::{
    datasets::{MNIST_TEST_LEN, N_CLASSES, N_FEATURES, load_mnist, train_test_split},
    nn::MlpConfig,
    train::{Trainer, TrainingConfig},
};

#[test]
#[ignore = "downloads MNIST and trains for several minutes"]
fn mnist_accuracy_over_twenty_five_epochs() {
    let samples = load_mnist();
    assert_eq!(samples.len(), 70_000);
    assert!(samples.iter().all(|s| s.features.len() == N_FEATURES
        && (s.label as usize) < N_CLASSES
        && s.features.iter().all(|v| (0.0..=1.0).contains(v))));

    let split = train_test_split(samples, MNIST_TEST_LEN).unwrap();
    assert_eq!(split.train.len(), 60_000);

    let config = TrainingConfig::new(MlpConfig::new(), AdamConfig::new())
        .with_num_epochs(25)
        .with_batch_size(256)
        .with_learning_rate(1e-3);
    let mut trainer = Trainer::<Autodiff<NdArray>>::new(config, NdArrayDevice::Cpu);
    let reports = trainer.fit(&split.train, &split.test, |_| {}).unwrap();

    assert_eq!(
        reports.iter().map(|r| r.epoch).collect::<Vec<_>>(),
        (0..25).collect::<Vec<_>>()
    );
    assert!(reports.iter().all(|r| (0.0..=100.0).contains(&r.accuracy)));
    assert!(
        reports[10].accuracy > 90.0,
        "accuracy at epoch 10 was {}",
        reports[10].accuracy
    );
    assert!(
        reports[24].accuracy > 95.0,
        "accuracy at epoch 24 was {}",
        reports[24].accuracy
    );
}

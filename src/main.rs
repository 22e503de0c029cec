//! Trains a two-layer perceptron to classify handwritten digits
//! using the library provided by `digit_mlp`
//!
//! # Usage
//! Runnable via
//! ```sh
//! cargo run --release -- -h
//! cargo run --release
//! cargo run --release -- --dataset synthetic --epochs 5
//! ```
//!
//! Fetches MNIST by default and allows a custom learning rate, batch size, hidden width, L1 penalty
//! and seed. Plots of sample images, learned weights and the training history are written to the
//! output directory.

use std::{error::Error, fs, path::PathBuf};

use burn::{config::Config, optim::AdamConfig};
use clap::Parser;
use digit_mlp::{
    context::{DefaultBackend, default_device},
    datasets::{Dataset, MNIST_TEST_LEN, load_dataset, train_test_split},
    nn::MlpConfig,
    plot::{plot_history, plot_samples, plot_weight_grid, plot_weight_image},
    train::{Trainer, TrainingConfig},
};

#[derive(Parser)]
struct Args {
    #[clap(short, long, default_value_t = Dataset::Mnist)]
    dataset: Dataset,
    /// Directory holding the uncompressed MNIST IDX files, downloads them when absent
    #[clap(long)]
    data_dir: Option<PathBuf>,
    /// Images per digit for the synthetic dataset
    #[clap(short, long, default_value_t = 500)]
    class_size: usize,
    /// Samples held out for testing, defaults to the standard MNIST split or a fifth of the data
    #[clap(short, long)]
    test_size: Option<usize>,
    #[clap(short, long, default_value_t = 256)]
    batch_size: usize,
    #[clap(short, long, default_value_t = 25)]
    epochs: usize,
    #[clap(short, long, default_value_t = 1e-3)]
    lr: f64,
    #[clap(long, default_value_t = 128)]
    hidden_units: usize,
    /// Adds `l1 * mean(|p|)` for every parameter tensor `p` to the loss
    #[clap(long)]
    l1: Option<f64>,
    /// Seed for initialization and shuffling, drawn at random when absent
    #[clap(short, long)]
    seed: Option<u64>,
    /// Number of hidden units whose weights are plotted
    #[clap(short, long, default_value_t = 16)]
    n_weights: usize,
    #[clap(short, long, default_value_t = format!("output"))]
    output_dir: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let seed = args.seed.unwrap_or_else(|| {
        let seed = rand::random();
        log::info!("No seed given, using {}", seed);
        seed
    });
    fs::create_dir_all(&args.output_dir)?;

    let samples = load_dataset(args.dataset, args.data_dir.as_deref(), args.class_size, seed)?;
    let test_size = args.test_size.unwrap_or(match args.dataset {
        Dataset::Mnist => MNIST_TEST_LEN,
        Dataset::Synthetic => samples.len() / 5,
    });
    let split = train_test_split(samples, test_size)?;
    log::info!(
        "Dataset {}: {} training and {} test samples",
        args.dataset,
        split.train.len(),
        split.test.len()
    );
    let n_shown = split.train.len().min(16);
    plot_samples(
        &split.train.samples()[..n_shown],
        4,
        &format!("{}/samples_{}.png", args.output_dir, args.dataset),
    )?;

    let config = TrainingConfig::new(
        MlpConfig::new().with_d_hidden(args.hidden_units),
        AdamConfig::new(),
    )
    .with_num_epochs(args.epochs)
    .with_batch_size(args.batch_size)
    .with_learning_rate(args.lr)
    .with_seed(seed)
    .with_l1_penalty(args.l1);
    config.save(format!("{}/config.json", args.output_dir))?;

    let mut trainer = Trainer::<DefaultBackend>::new(config, default_device());
    let reports = trainer.fit(&split.train, &split.test, |_| {})?;

    fs::write(
        format!("{}/history.json", args.output_dir),
        serde_json::to_string_pretty(&reports)?,
    )?;
    if !reports.is_empty() {
        plot_history(&reports, &format!("{}/history.png", args.output_dir))?;
    }

    let model = trainer.into_model();
    let n_weights = args.n_weights.min(model.d_hidden());
    let weights = (0..n_weights)
        .map(|unit| model.hidden_unit_weights(unit))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(first) = weights.first() {
        plot_weight_image(
            first,
            "Hidden unit 0",
            &format!("{}/hidden_unit_0.png", args.output_dir),
        )?;
        plot_weight_grid(
            &weights,
            4,
            &format!("{}/hidden_weights.png", args.output_dir),
        )?;
    }

    Ok(())
}

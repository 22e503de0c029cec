//! Training loop and evaluation

use std::fmt::{self, Display};

use burn::{
    config::Config,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{ElementConversion, backend::AutodiffBackend},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    context::ExecutionContext,
    dataloader::{Batch, DataLoader, DataLoaderError, Order},
    datasets::Partition,
    loss::{Regularization, cross_entropy},
    nn::{Mlp, MlpConfig, NNError},
};

/// Errors raised while training or evaluating
#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    DataLoader(#[from] DataLoaderError),
    #[error(transparent)]
    Model(#[from] NNError),
    #[error("Loss became {loss} at epoch {epoch}, batch {batch}")]
    NonFiniteLoss { epoch: usize, batch: usize, loss: f32 },
}

#[derive(Config)]
pub struct TrainingConfig {
    pub model: MlpConfig,
    pub optimizer: AdamConfig,
    #[config(default = 25)]
    pub num_epochs: usize,
    #[config(default = 256)]
    pub batch_size: usize,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    #[config(default = 42)]
    pub seed: u64,
    /// Weight of the L1 penalty, none when unset
    pub l1_penalty: Option<f64>,
}

/// Summary of one epoch, emitted once the test partition has been evaluated
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochReport {
    /// Zero-based
    pub epoch: usize,
    /// Loss of the last training batch
    pub loss: f32,
    /// Test accuracy in percent
    pub accuracy: f32,
}

impl Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "epoch: {}, loss: {:.4}, test accuracy: {:.2}%",
            self.epoch, self.loss, self.accuracy
        )
    }
}

/// Percentage of correct predictions, `total` must be positive
pub fn accuracy(correct: usize, total: usize) -> f32 {
    100.0 * correct as f32 / total as f32
}

/// Owns the model and drives it through the epochs
pub struct Trainer<B: AutodiffBackend> {
    config: TrainingConfig,
    context: ExecutionContext<B>,
    regularization: Regularization,
    model: Mlp<B>,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Builds the execution context from `device` and the configured seed, seeds the backend and
    /// initializes a fresh model on the device
    pub fn new(config: TrainingConfig, device: B::Device) -> Self {
        let context = ExecutionContext::new(device, config.seed);
        context.seed_backend();
        let model = config.model.init(context.device());
        let regularization = Regularization::from_l1(config.l1_penalty);
        Self {
            config,
            context,
            regularization,
            model,
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn context(&self) -> &ExecutionContext<B> {
        &self.context
    }

    pub fn model(&self) -> &Mlp<B> {
        &self.model
    }

    pub fn into_model(self) -> Mlp<B> {
        self.model
    }

    /// Runs `num_epochs` passes over `train`, evaluating on `test` after each one.
    /// `on_epoch` sees every report as soon as it is available.
    pub fn fit<F>(
        &mut self,
        train: &Partition,
        test: &Partition,
        mut on_epoch: F,
    ) -> Result<Vec<EpochReport>, TrainError>
    where
        F: FnMut(&EpochReport),
    {
        let loader = DataLoader::new(
            train.samples(),
            self.config.batch_size,
            Order::Shuffled {
                seed: self.context.seed(),
            },
        )?;
        let mut optim = self.config.optimizer.init();
        let mut reports = Vec::with_capacity(self.config.num_epochs);

        for epoch in 0..self.config.num_epochs {
            let mut last_loss = f32::NAN;
            for (iteration, samples) in loader.iter(epoch).enumerate() {
                let batch = Batch::<B>::from_samples(&samples, self.context.device());
                let logits = self.model.forward(batch.features)?;
                let loss = cross_entropy(logits, batch.targets);
                let loss = self.regularization.apply(loss, &self.model);

                // gradients are fresh for every backward pass, nothing to zero
                let grads = loss.backward();
                let loss = loss.into_scalar().elem::<f32>();
                if !loss.is_finite() {
                    return Err(TrainError::NonFiniteLoss {
                        epoch,
                        batch: iteration,
                        loss,
                    });
                }
                let grads = GradientsParams::from_grads(grads, &self.model);
                self.model = optim.step(self.config.learning_rate, self.model.clone(), grads);

                log::debug!(
                    "epoch: {}, batch: {}/{}, loss: {:.4}",
                    epoch,
                    iteration + 1,
                    loader.n_batches(),
                    loss
                );
                last_loss = loss;
            }

            let report = EpochReport {
                epoch,
                loss: last_loss,
                accuracy: self.evaluate(test)?,
            };
            log::info!("{}", report);
            on_epoch(&report);
            reports.push(report);
        }

        Ok(reports)
    }

    /// Test accuracy in percent, visiting `partition` in order without tracking gradients
    pub fn evaluate(&self, partition: &Partition) -> Result<f32, TrainError> {
        let model = self.model.valid();
        let loader = DataLoader::new(partition.samples(), self.config.batch_size, Order::Sequential)?;

        let mut correct = 0;
        let mut total = 0;
        for samples in loader.iter(0) {
            let batch = Batch::<B::InnerBackend>::from_samples(&samples, self.context.device());
            let logits = model.forward(batch.features)?;
            let predictions = logits.argmax(1).squeeze::<1>(1);
            let n_correct = predictions
                .equal(batch.targets)
                .int()
                .sum()
                .into_scalar()
                .elem::<i64>();
            correct += n_correct as usize;
            total += samples.len();
        }
        Ok(accuracy(correct, total))
    }
}

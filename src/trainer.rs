//! Mini-batch training loop.
//!
//! A [`Trainer`] owns a network and an optimizer and drives them through
//! epochs of shuffled mini-batches:
//!
//! ```text
//! Idle -> Epoch(1) -> BatchStep { epoch: 1, batch: 0 } -> ... -> Epoch(2) -> ... -> Done
//! ```
//!
//! Each batch runs a training-mode forward pass, the cross-entropy loss, the
//! fused softmax/cross-entropy gradient, backward and one optimizer step.
//! Epochs and batches are numbered from 1 and 0 respectively in metrics,
//! logs and errors.

use crate::data::Dataset;
use crate::error::{Error, Result};
use crate::layers::ForwardMode;
use crate::loss::{CategoricalCrossEntropy, Loss};
use crate::network::Network;
use crate::optimizers::Optimizer;
use crate::utils::metrics::correct_count;
use crate::utils::SimpleRng;
use log::{debug, info, warn};
use std::fmt::Write as _;
use std::fs;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Loop settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainerConfig {
    pub batch_size: usize,
    pub epochs: usize,
    /// Seeds shuffling and dropout.
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            epochs: 12,
            seed: 1,
        }
    }
}

/// Loss and accuracy over a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalMetrics {
    pub loss: f32,
    pub accuracy: f32,
}

/// What one epoch produced.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochMetrics {
    /// 1-based
    pub epoch: usize,
    /// Sample-weighted mean over the batches seen this epoch.
    pub train_loss: f32,
    pub train_accuracy: f32,
    pub validation: Option<EvalMetrics>,
    pub seconds: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    Idle,
    Epoch(usize),
    BatchStep { epoch: usize, batch: usize },
    Done,
}

/// Why `fit` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every configured epoch ran.
    Completed,
    /// The per-epoch hook returned `ControlFlow::Break`.
    Hook,
    /// A [`StopHandle`] was raised.
    StopRequested,
}

/// Cooperative stop flag, cloneable and shareable across threads.
///
/// The trainer checks it after every batch and finishes the current epoch's
/// bookkeeping before returning.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// History of one `fit` call.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub history: Vec<EpochMetrics>,
    pub stop_reason: StopReason,
}

impl TrainingReport {
    pub fn last(&self) -> Option<&EpochMetrics> {
        self.history.last()
    }

    /// History as CSV with a header row. Validation columns are empty when no
    /// validation set was given.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("epoch,train_loss,train_accuracy,val_loss,val_accuracy,seconds\n");
        for m in &self.history {
            let (val_loss, val_acc) = match m.validation {
                Some(v) => (v.loss.to_string(), v.accuracy.to_string()),
                None => (String::new(), String::new()),
            };
            let _ = writeln!(
                out,
                "{},{},{},{},{},{:.3}",
                m.epoch, m.train_loss, m.train_accuracy, val_loss, val_acc, m.seconds
            );
        }
        out
    }

    /// Write [`TrainingReport::to_csv`] to `path`, creating parent directories.
    pub fn write_history_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_csv())?;
        Ok(())
    }
}

pub struct Trainer<O: Optimizer> {
    network: Network,
    optimizer: O,
    loss: CategoricalCrossEntropy,
    config: TrainerConfig,
    state: TrainerState,
    shuffle_rng: SimpleRng,
    dropout_rng: SimpleRng,
    stop: StopHandle,
}

impl<O: Optimizer> Trainer<O> {
    /// # Errors
    ///
    /// `InvalidConfiguration` for a zero batch size or epoch count.
    pub fn new(network: Network, optimizer: O, config: TrainerConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::config("batch size must be positive"));
        }
        if config.epochs == 0 {
            return Err(Error::config("epoch count must be positive"));
        }
        let (shuffle_rng, dropout_rng) = seeded_streams(config.seed);
        Ok(Self {
            network,
            optimizer,
            loss: CategoricalCrossEntropy::default(),
            config,
            state: TrainerState::Idle,
            shuffle_rng,
            dropout_rng,
            stop: StopHandle::default(),
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    /// A handle that stops a running `fit` after its current batch.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Train for the configured number of epochs.
    pub fn fit(&mut self, train: &Dataset, validation: Option<&Dataset>) -> Result<TrainingReport> {
        self.fit_with(train, validation, |_| ControlFlow::Continue(()))
    }

    /// Train, calling `hook` after every epoch. Returning
    /// `ControlFlow::Break(())` ends training early.
    ///
    /// Every call starts from the seeded shuffle and dropout streams with
    /// fresh optimizer state; only the network weights carry over. The state
    /// is `Done` when this returns, on success or error.
    ///
    /// # Errors
    ///
    /// `NumericInstability` as soon as a batch loss or a validation loss is
    /// NaN or infinite, with the metrics of the last completed epoch attached.
    /// Shape errors if the datasets do not match the network.
    pub fn fit_with<F>(
        &mut self,
        train: &Dataset,
        validation: Option<&Dataset>,
        mut hook: F,
    ) -> Result<TrainingReport>
    where
        F: FnMut(&EpochMetrics) -> ControlFlow<()>,
    {
        self.state = TrainerState::Idle;
        self.stop.clear();
        self.optimizer.reset();
        let (shuffle_rng, dropout_rng) = seeded_streams(self.config.seed);
        self.shuffle_rng = shuffle_rng;
        self.dropout_rng = dropout_rng;

        let result = self.run_epochs(train, validation, &mut hook);
        self.state = TrainerState::Done;
        result
    }

    fn run_epochs<F>(
        &mut self,
        train: &Dataset,
        validation: Option<&Dataset>,
        hook: &mut F,
    ) -> Result<TrainingReport>
    where
        F: FnMut(&EpochMetrics) -> ControlFlow<()>,
    {
        self.check_dataset("training set", train)?;
        if train.is_empty() {
            return Err(Error::config("training set is empty"));
        }
        if let Some(val) = validation {
            self.check_dataset("validation set", val)?;
        }

        info!(
            "training {} params on {} samples: {} epochs, batch size {}",
            self.network.parameter_count(),
            train.len(),
            self.config.epochs,
            self.config.batch_size
        );

        let mut history: Vec<EpochMetrics> = Vec::with_capacity(self.config.epochs);
        let mut stop_reason = StopReason::Completed;

        for epoch in 1..=self.config.epochs {
            self.state = TrainerState::Epoch(epoch);
            let start = Instant::now();
            let order = self.shuffle_rng.permutation(train.len());

            let mut loss_sum = 0.0f64;
            let mut correct = 0usize;
            let mut seen = 0usize;
            let mut stop_requested = false;
            let mut batches = 0usize;

            for (batch_index, indices) in order.chunks(self.config.batch_size).enumerate() {
                self.state = TrainerState::BatchStep {
                    epoch,
                    batch: batch_index,
                };
                let batch = train.batch(indices)?;

                let probs = self
                    .network
                    .forward(&batch.images, &mut ForwardMode::Train(&mut self.dropout_rng))?;
                let loss = self.loss.compute(&probs, &batch.targets)?;
                if !loss.is_finite() {
                    warn!("loss became {} at epoch {}, batch {}", loss, epoch, batch_index);
                    return Err(Error::NumericInstability {
                        epoch,
                        batch: batch_index,
                        loss,
                        last_finite: history.last().cloned().map(Box::new),
                    });
                }
                debug!("epoch {} batch {}: loss {:.5}", epoch, batch_index, loss);

                let grad = self.loss.gradient(&probs, &batch.targets)?;
                self.network.backward_from_logits(&grad)?;
                self.optimizer.step(&mut self.network)?;

                loss_sum += loss as f64 * indices.len() as f64;
                correct += correct_count(&probs, &batch.labels);
                seen += indices.len();
                batches += 1;

                if self.stop.is_stopped() {
                    warn!("stop requested during epoch {}, batch {}", epoch, batch_index);
                    stop_requested = true;
                    break;
                }
            }

            let validation_metrics = match validation {
                Some(val) => {
                    let v = self.evaluate(val)?;
                    if !v.loss.is_finite() {
                        warn!("validation loss became {} after epoch {}", v.loss, epoch);
                        return Err(Error::NumericInstability {
                            epoch,
                            batch: batches,
                            loss: v.loss,
                            last_finite: history.last().cloned().map(Box::new),
                        });
                    }
                    Some(v)
                }
                None => None,
            };
            let metrics = EpochMetrics {
                epoch,
                train_loss: (loss_sum / seen as f64) as f32,
                train_accuracy: correct as f32 / seen as f32,
                validation: validation_metrics,
                seconds: start.elapsed().as_secs_f32(),
            };
            match metrics.validation {
                Some(v) => info!(
                    "epoch {}/{}: loss {:.4} acc {:.4} val_loss {:.4} val_acc {:.4} ({:.2}s)",
                    epoch,
                    self.config.epochs,
                    metrics.train_loss,
                    metrics.train_accuracy,
                    v.loss,
                    v.accuracy,
                    metrics.seconds
                ),
                None => info!(
                    "epoch {}/{}: loss {:.4} acc {:.4} ({:.2}s)",
                    epoch,
                    self.config.epochs,
                    metrics.train_loss,
                    metrics.train_accuracy,
                    metrics.seconds
                ),
            }

            let flow = hook(&metrics);
            history.push(metrics);

            if stop_requested {
                stop_reason = StopReason::StopRequested;
                break;
            }
            if flow.is_break() {
                info!("training stopped by epoch hook after epoch {}", epoch);
                stop_reason = StopReason::Hook;
                break;
            }
        }

        Ok(TrainingReport {
            history,
            stop_reason,
        })
    }

    /// Inference-mode loss and accuracy over `dataset`, in dataset order.
    pub fn evaluate(&mut self, dataset: &Dataset) -> Result<EvalMetrics> {
        self.check_dataset("evaluation set", dataset)?;
        if dataset.is_empty() {
            return Ok(EvalMetrics {
                loss: 0.0,
                accuracy: 0.0,
            });
        }

        let order: Vec<usize> = (0..dataset.len()).collect();
        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;
        for indices in order.chunks(self.config.batch_size) {
            let batch = dataset.batch(indices)?;
            let probs = self.network.predict(&batch.images)?;
            loss_sum += self.loss.compute(&probs, &batch.targets)? as f64 * indices.len() as f64;
            correct += correct_count(&probs, &batch.labels);
        }
        Ok(EvalMetrics {
            loss: (loss_sum / dataset.len() as f64) as f32,
            accuracy: correct as f32 / dataset.len() as f32,
        })
    }

    fn check_dataset(&self, context: &str, dataset: &Dataset) -> Result<()> {
        if dataset.sample_shape() != self.network.input_shape() {
            return Err(Error::shape(
                context,
                self.network.input_shape(),
                dataset.sample_shape(),
            ));
        }
        if self.network.output_shape() != [dataset.num_classes()] {
            return Err(Error::shape(
                format!("{} classes", context),
                self.network.output_shape(),
                &[dataset.num_classes()],
            ));
        }
        Ok(())
    }
}

/// Shuffle and dropout streams for a run, both derived from `seed`.
fn seeded_streams(seed: u64) -> (SimpleRng, SimpleRng) {
    let mut shuffle_rng = SimpleRng::new(seed);
    let dropout_rng = shuffle_rng.fork();
    (shuffle_rng, dropout_rng)
}

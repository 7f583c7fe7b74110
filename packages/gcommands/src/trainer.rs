//! Epoch loop: train, validate, keep the best weights, stop when the
//! validation loss stops improving, then score the best weights on the
//! held-out test set.

use std::path::{Path, PathBuf};

use candle_core::{D, DType, Device};
use candle_nn::loss;
use thiserror::Error;

use crate::{
    config::{ConfigError, TrainConfig},
    dataset::{DataLoader, DatasetError, SpeechCommands, Workers},
    model::{Checkpoint, CheckpointError, CheckpointLoad, CheckpointSave, Model, ModelError},
    optim::RunOptimizer,
};

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("dataset: {0}")]
    Dataset(#[from] DatasetError),
    #[error("model: {0}")]
    Model(#[from] ModelError),
    #[error("checkpoint: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("{} yields {got:?} spectrograms, the checkpoint expects {expected:?}", root.display())]
    InputMismatch {
        root: PathBuf,
        expected: (usize, usize),
        got: (usize, usize),
    },
}

pub type Result<T> = std::result::Result<T, TrainError>;

/* ------------------------------------------------------------------ */
/*  Evaluation                                                         */
/* ------------------------------------------------------------------ */

/// Loss and accuracy of a model over one dataset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluation {
    /// Mean per-sample NLL.
    pub loss: f32,
    pub correct: usize,
    pub total: usize,
}

impl Evaluation {
    /// Accuracy in percent.
    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.correct as f32 / self.total as f32
        }
    }
}

/* ------------------------------------------------------------------ */
/*  Early stopping                                                     */
/* ------------------------------------------------------------------ */

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Progress {
    Improved,
    NotImproved,
}

/// Patience counter over the validation loss.
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    patience: usize,
    best: f32,
    bad_epochs: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f32::INFINITY,
            bad_epochs: 0,
        }
    }

    /// Record one validation loss. A tie with the best so far counts as an
    /// improvement.
    pub fn observe(&mut self, loss: f32) -> Progress {
        if loss <= self.best {
            self.best = loss;
            self.bad_epochs = 0;
            Progress::Improved
        } else {
            self.bad_epochs += 1;
            Progress::NotImproved
        }
    }

    pub fn should_stop(&self) -> bool {
        self.bad_epochs >= self.patience
    }

    #[inline]
    pub fn best(&self) -> f32 {
        self.best
    }

    #[inline]
    pub fn bad_epochs(&self) -> usize {
        self.bad_epochs
    }
}

/* ------------------------------------------------------------------ */
/*  One pass                                                           */
/* ------------------------------------------------------------------ */

/// One optimisation pass over `loader`; returns the mean batch loss.
pub fn train_epoch(
    loader: &DataLoader<'_>,
    model: &Model,
    opt: &mut RunOptimizer,
    epoch: usize,
    log_interval: usize,
) -> Result<f32> {
    let total = loader.dataset().len();
    let num_batches = loader.num_batches();
    let mut seen = 0usize;
    let mut sum = 0f32;

    for (batch_idx, batch) in loader.batches(epoch).enumerate() {
        let batch = batch?;
        let log_probs = model.forward_t(&batch.features, true)?;
        let loss = loss::nll(&log_probs, &batch.targets)?;
        opt.backward_step(&loss)?;

        let loss = loss.to_scalar::<f32>()?;
        sum += loss;
        if log_interval > 0 && batch_idx % log_interval == 0 {
            log::info!(
                "Train Epoch: {epoch} [{seen}/{total} ({:.0}%)]\tLoss: {loss:.6}",
                100.0 * batch_idx as f32 / num_batches as f32
            );
        }
        seen += batch.len();
    }

    Ok(if num_batches == 0 {
        0.0
    } else {
        sum / num_batches as f32
    })
}

/// Score `model` on every item of `loader` in inference mode.
pub fn evaluate(loader: &DataLoader<'_>, model: &Model) -> Result<Evaluation> {
    let mut loss_sum = 0f64;
    let mut correct = 0usize;
    let mut total = 0usize;

    for batch in loader.batches(0) {
        let batch = batch?;
        let n = batch.len();
        let log_probs = model.forward_t(&batch.features, false)?;
        // nll is a batch mean; scale back to a sum
        let loss = loss::nll(&log_probs, &batch.targets)?.to_scalar::<f32>()?;
        loss_sum += f64::from(loss) * n as f64;

        let hits = log_probs
            .argmax(D::Minus1)?
            .eq(&batch.targets)?
            .to_dtype(DType::F32)?
            .sum_all()?
            .to_scalar::<f32>()?;
        correct += hits as usize;
        total += n;
    }

    let eval = Evaluation {
        loss: if total == 0 {
            0.0
        } else {
            (loss_sum / total as f64) as f32
        },
        correct,
        total,
    };
    log::info!(
        "Test set: Average loss: {:.4}, Accuracy: {}/{} ({:.0}%)",
        eval.loss,
        eval.correct,
        eval.total,
        eval.accuracy()
    );
    Ok(eval)
}

/* ------------------------------------------------------------------ */
/*  Full run                                                           */
/* ------------------------------------------------------------------ */

/// Outcome of [`fit`].
#[derive(Clone, Debug)]
pub struct TrainReport {
    pub epochs_run: usize,
    /// Epoch whose weights were checkpointed last; `None` if no epoch ever
    /// produced a finite validation loss.
    pub best_epoch: Option<usize>,
    pub best_valid_loss: f32,
    pub test: Evaluation,
    pub stopped_early: bool,
    pub checkpoint: PathBuf,
}

/// CUDA device 0 when asked for and available, CPU otherwise.
pub fn select_device(cuda: bool) -> Result<Device> {
    let device = if cuda {
        Device::cuda_if_available(0)?
    } else {
        Device::Cpu
    };
    if cuda && device.is_cpu() {
        log::warn!("CUDA requested but unavailable, training on CPU");
    }
    Ok(device)
}

/// Train, validate and test according to `cfg`.
pub fn fit(cfg: &TrainConfig) -> Result<TrainReport> {
    cfg.validate()?;
    let workers = Workers::new(cfg.data.num_workers)?;

    let device = select_device(cfg.cuda)?;
    // Candle's CPU generator cannot be reseeded; shuffling stays seeded.
    if let Err(e) = device.set_seed(cfg.seed) {
        log::debug!("weight init not seeded on {device:?}: {e}");
    }

    let train_set = SpeechCommands::open(&cfg.data.train_path, cfg.features.clone())?
        .with_cache(cfg.data.cache);
    let classes = train_set.classes().to_vec();
    let valid_set =
        SpeechCommands::open_with_classes(&cfg.data.valid_path, &classes, cfg.features.clone())?
            .with_cache(cfg.data.cache);
    let test_set =
        SpeechCommands::open_with_classes(&cfg.data.test_path, &classes, cfg.features.clone())?;

    let input_dims = train_set.input_dims()?;
    let mut model = Model::new(cfg.model.arch, input_dims, classes, &device)?;
    log::info!(
        "{} on {:?}: input {}x{}, {} classes, {} parameters",
        cfg.model.arch,
        device,
        input_dims.0,
        input_dims.1,
        model.labels().len(),
        model.num_params()
    );

    let mut opt = RunOptimizer::new(
        cfg.optim.kind,
        cfg.optim.lr,
        cfg.optim.momentum,
        model.var_map().all_vars(),
    )?;
    log::info!("{} optimizer, lr {}", opt.kind(), opt.learning_rate());

    log::info!("{} feature worker thread(s)", workers.threads());
    let train_loader = DataLoader::new(&train_set, cfg.data.batch_size, &device)?
        .shuffled(cfg.seed)
        .with_workers(workers.clone());
    let valid_loader =
        DataLoader::new(&valid_set, cfg.data.batch_size, &device)?.with_workers(workers.clone());
    let test_loader =
        DataLoader::new(&test_set, cfg.data.test_batch_size, &device)?.with_workers(workers);

    let mut stopper = EarlyStopping::new(cfg.patience);
    let mut best_epoch = None;
    let mut epochs_run = 0;
    let mut stopped_early = false;

    for epoch in 1..=cfg.epochs {
        epochs_run = epoch;
        let train_loss = train_epoch(&train_loader, &model, &mut opt, epoch, cfg.log_interval)?;
        let valid = evaluate(&valid_loader, &model)?;
        log::debug!("epoch {epoch}: train loss {train_loss:.6}, valid loss {:.6}", valid.loss);

        match stopper.observe(valid.loss) {
            Progress::Improved => {
                log::info!("Saving model (epoch {epoch}, valid loss {:.4})", valid.loss);
                Checkpoint::capture(&model, &cfg.features, epoch, valid.loss)?
                    .save_to_file(&cfg.checkpoint)?;
                best_epoch = Some(epoch);
            }
            Progress::NotImproved => {
                log::info!(
                    "No improvement for {} epoch(s), best {:.4}",
                    stopper.bad_epochs(),
                    stopper.best()
                );
                if stopper.should_stop() {
                    log::info!("Early stopping after epoch {epoch}");
                    stopped_early = true;
                    break;
                }
            }
        }
    }

    if best_epoch.is_some() {
        let ckpt = Checkpoint::load_from_file(&cfg.checkpoint)?;
        log::info!("Testing best model from epoch {}", ckpt.epoch);
        model = Model::from_checkpoint(&ckpt, &device)?;
    } else {
        log::warn!("no checkpoint was written, testing the final weights");
    }
    let test = evaluate(&test_loader, &model)?;

    Ok(TrainReport {
        epochs_run,
        best_epoch,
        best_valid_loss: stopper.best(),
        test,
        stopped_early,
        checkpoint: cfg.checkpoint.clone(),
    })
}

/// Evaluate a saved checkpoint on `folder`, which must use (a subset of)
/// the checkpoint's classes.
pub fn test_checkpoint<P: AsRef<Path>, Q: AsRef<Path>>(
    checkpoint: P,
    folder: Q,
    batch_size: usize,
    device: &Device,
) -> Result<Evaluation> {
    let ckpt = Checkpoint::load_from_file(checkpoint)?;
    let folder = folder.as_ref();
    let set = SpeechCommands::open_with_classes(folder, &ckpt.labels, ckpt.spectrogram.clone())?;
    let dims = set.input_dims()?;
    if dims != ckpt.input_dims {
        return Err(TrainError::InputMismatch {
            root: folder.to_path_buf(),
            expected: ckpt.input_dims,
            got: dims,
        });
    }
    let model = Model::from_checkpoint(&ckpt, device)?;
    let loader = DataLoader::new(&set, batch_size, device)?;
    evaluate(&loader, &model)
}

//! Command Line Interface for the Speech Commands trainer
//!
//! Every `train` flag is optional: an unset flag falls back to the config
//! file (`--config`) and then to the built-in defaults.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use gcommands::{Architecture, ConfigError, OptimizerKind, SplitMode, TrainConfig, Window};

/// Keyword-spotting trainer for Google Speech Commands
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a classifier, keeping the best checkpoint, then test it
    Train(TrainCommand),

    /// Evaluate a checkpoint on a data folder
    Test(TestCommand),

    /// Split a raw Speech Commands release into train/valid/test folders
    Prepare(PrepareCommand),

    /// Print what a checkpoint contains
    Inspect(InspectCommand),
}

/// Train a classifier
#[derive(Args, Debug, Default)]
pub struct TrainCommand {
    /// TOML file with run settings; flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Train data folder [default: gcommands/train]
    #[arg(long)]
    pub train_path: Option<PathBuf>,

    /// Validation data folder [default: gcommands/valid]
    #[arg(long)]
    pub valid_path: Option<PathBuf>,

    /// Test data folder [default: gcommands/test]
    #[arg(long)]
    pub test_path: Option<PathBuf>,

    /// Training and validation batch size [default: 100]
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Test batch size [default: 100]
    #[arg(long)]
    pub test_batch_size: Option<usize>,

    /// Network: LeNet, VGG11, VGG13, VGG16, VGG19 [default: VGG11]
    #[arg(long)]
    pub arc: Option<Architecture>,

    /// Number of epochs to train [default: 10]
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Learning rate [default: 0.001]
    #[arg(long)]
    pub lr: Option<f64>,

    /// SGD momentum [default: 0.9]
    #[arg(long)]
    pub momentum: Option<f64>,

    /// Optimizer: adam or sgd [default: adam]
    #[arg(long)]
    pub optimizer: Option<OptimizerKind>,

    /// Use CUDA when available
    #[arg(long)]
    pub cuda: bool,

    /// Random seed [default: 1234]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Batches between progress lines [default: 10]
    #[arg(long)]
    pub log_interval: Option<usize>,

    /// Epochs without validation improvement before stopping [default: 5]
    #[arg(long)]
    pub patience: Option<usize>,

    /// Where the best model is written [default: checkpoint/ckpt.cbor]
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// STFT window length in seconds [default: 0.02]
    #[arg(long)]
    pub window_size: Option<f64>,

    /// STFT hop in seconds [default: 0.01]
    #[arg(long)]
    pub window_stride: Option<f64>,

    /// Window: hamming, hann, blackman, bartlett [default: hamming]
    #[arg(long)]
    pub window_type: Option<Window>,

    /// Frames every spectrogram is padded or cut to [default: 101]
    #[arg(long)]
    pub max_len: Option<usize>,

    /// Skip per-spectrogram mean/std normalisation
    #[arg(long)]
    pub no_normalize: bool,

    /// Feature-extraction threads, 0 = all cores [default: 0]
    #[arg(long)]
    pub num_workers: Option<usize>,

    /// Recompute spectrograms every epoch instead of caching them
    #[arg(long)]
    pub no_cache: bool,

    /// Print the resolved configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,
}

impl TrainCommand {
    /// Defaults, then the config file, then explicit flags.
    pub fn resolve(&self) -> Result<TrainConfig, ConfigError> {
        let mut cfg = match &self.config {
            Some(path) => TrainConfig::from_file(path)?,
            None => TrainConfig::default(),
        };

        fn set<T: Clone>(dst: &mut T, src: &Option<T>) {
            if let Some(v) = src {
                *dst = v.clone();
            }
        }

        set(&mut cfg.data.train_path, &self.train_path);
        set(&mut cfg.data.valid_path, &self.valid_path);
        set(&mut cfg.data.test_path, &self.test_path);
        set(&mut cfg.data.batch_size, &self.batch_size);
        set(&mut cfg.data.test_batch_size, &self.test_batch_size);
        set(&mut cfg.data.num_workers, &self.num_workers);
        set(&mut cfg.model.arch, &self.arc);
        set(&mut cfg.epochs, &self.epochs);
        set(&mut cfg.optim.lr, &self.lr);
        set(&mut cfg.optim.momentum, &self.momentum);
        set(&mut cfg.optim.kind, &self.optimizer);
        set(&mut cfg.seed, &self.seed);
        set(&mut cfg.log_interval, &self.log_interval);
        set(&mut cfg.patience, &self.patience);
        set(&mut cfg.checkpoint, &self.checkpoint);
        set(&mut cfg.features.window_size, &self.window_size);
        set(&mut cfg.features.window_stride, &self.window_stride);
        set(&mut cfg.features.window, &self.window_type);
        set(&mut cfg.features.max_len, &self.max_len);
        if self.cuda {
            cfg.cuda = true;
        }
        if self.no_normalize {
            cfg.features.normalize = false;
        }
        if self.no_cache {
            cfg.data.cache = false;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

/// Evaluate a checkpoint
#[derive(Args, Debug)]
pub struct TestCommand {
    /// Checkpoint written by `train`
    #[arg(long, default_value = gcommands::constants::DEFAULT_CHECKPOINT_PATH)]
    pub checkpoint: PathBuf,

    /// Data folder laid out one sub-folder per label
    #[arg(long, default_value = "gcommands/test")]
    pub test_path: PathBuf,

    /// Batch size
    #[arg(long, default_value_t = 100)]
    pub test_batch_size: usize,

    /// Use CUDA when available
    #[arg(long)]
    pub cuda: bool,
}

/// Split a raw release
#[derive(Args, Debug)]
pub struct PrepareCommand {
    /// Root of the raw release (label folders plus the two list files)
    pub raw: PathBuf,

    /// Destination; `train/`, `valid/` and `test/` are created inside
    #[arg(default_value = "gcommands")]
    pub out: PathBuf,

    /// copy or move
    #[arg(long, default_value_t = SplitMode::Copy)]
    pub mode: SplitMode,
}

/// Inspect a checkpoint
#[derive(Args, Debug)]
pub struct InspectCommand {
    /// Checkpoint file
    #[arg(default_value = gcommands::constants::DEFAULT_CHECKPOINT_PATH)]
    pub checkpoint: PathBuf,
}

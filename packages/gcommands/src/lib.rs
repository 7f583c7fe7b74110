//! gcommands, public crate root
//! ============================
//! Keyword-spotting trainer for the Google Speech Commands corpus
//! (spectrogram front-end + Candle back-end).
//!
//! * **Desktop** builds extract features on a Rayon pool (default feature set).
//! * `cuda` / `metal` / `mkl` / `accelerate` forward to the matching Candle
//!   backends.
//!
//! The usual entry point is [`fit`], driven by a [`TrainConfig`]; the
//! pieces it is built from ([`SpeechCommands`], [`DataLoader`], [`Model`],
//! [`RunOptimizer`], [`Checkpoint`]) are public for custom loops.
#![deny(unsafe_code)]

#[cfg(feature = "accelerate")]
extern crate accelerate_src;
#[cfg(feature = "mkl")]
extern crate intel_mkl_src;

/* ────────────────────────  sub-modules  ─────────────────────────────── */
pub mod audio;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod model;
pub mod optim;
pub mod trainer;

/* ───────────────────────── re-exports ────────────────────────────────── */
pub use audio::{AudioError, Samples, Spectrogram, SpectrogramConfig, Window};
pub use config::{ConfigError, DataConfig, ModelConfig, OptimConfig, TrainConfig};
pub use dataset::{
    Batch, DataLoader, DatasetError, SpeechCommands, SplitCounts, SplitMode, Workers,
};
pub use model::{
    Architecture, Checkpoint, CheckpointError, CheckpointLoad, CheckpointSave, Model, ModelError,
};
pub use optim::{OptimizerKind, RunOptimizer};
pub use trainer::{
    EarlyStopping, Evaluation, Progress, TrainError, TrainReport, evaluate, fit, select_device,
    test_checkpoint, train_epoch,
};

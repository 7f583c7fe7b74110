//! Dataset adapter: directory-per-label discovery, spectrogram items and
//! mini-batching onto a Candle device.

mod discovery;
mod loader;
mod splits;

use std::path::PathBuf;

pub use discovery::{find_classes, make_dataset};
pub use loader::{Batch, Batches, DataLoader, SpeechCommands, Workers};
pub use splits::{SplitCounts, SplitMode, prepare_splits};

use crate::audio::AudioError;

/* ─────────────────────── error handling ─────────────────────── */

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Audio {
        path: PathBuf,
        #[source]
        source: AudioError,
    },
    #[error("no class folders found in {}", .0.display())]
    NoClasses(PathBuf),
    #[error("found 0 sound files in subfolders of: {}", .0.display())]
    Empty(PathBuf),
    #[error("class \"{class}\" in {} is not one of the training classes", root.display())]
    UnknownClass { class: String, root: PathBuf },
    #[error(
        "{}: spectrogram is {got:?} but the dataset produces {expected:?} (mixed sample rates?)",
        path.display()
    )]
    DimensionMismatch {
        path: PathBuf,
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("item {index} out of range for a dataset of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("batch size must be positive")]
    ZeroBatch,
    #[error("split manifest missing: {}", .0.display())]
    MissingManifest(PathBuf),
    #[error("worker pool: {0}")]
    Workers(String),
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),
}

impl DatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

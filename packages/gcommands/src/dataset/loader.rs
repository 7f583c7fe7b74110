//! Spectrogram dataset + mini-batch loader.

use std::{
    borrow::Cow,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use candle_core::{Device, Tensor};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::{DatasetError, find_classes, make_dataset};
use crate::audio::{Spectrogram, SpectrogramConfig, load_wav, spectrogram};

/* ─────────────────────── dataset ─────────────────────── */

/// A folder of labelled clips, served as spectrograms.
pub struct SpeechCommands {
    root: PathBuf,
    classes: Vec<String>,
    items: Vec<(PathBuf, u32)>,
    spect: SpectrogramConfig,
    // one slot per item when caching is on
    cache: Option<Vec<OnceLock<Spectrogram>>>,
}

impl SpeechCommands {
    /// Open `root`, discovering its classes from the folder layout.
    pub fn open<P: AsRef<Path>>(root: P, spect: SpectrogramConfig) -> Result<Self, DatasetError> {
        let classes = find_classes(root.as_ref())?;
        Self::build(root.as_ref(), classes, spect)
    }

    /// Open `root` against an existing class list (e.g. the training one).
    ///
    /// A class folder unknown to `classes` is an error; a class missing
    /// from `root` simply contributes no items.
    pub fn open_with_classes<P: AsRef<Path>>(
        root: P,
        classes: &[String],
        spect: SpectrogramConfig,
    ) -> Result<Self, DatasetError> {
        let root = root.as_ref();
        if let Some(class) = find_classes(root)?
            .into_iter()
            .find(|c| !classes.contains(c))
        {
            return Err(DatasetError::UnknownClass {
                class,
                root: root.to_path_buf(),
            });
        }
        Self::build(root, classes.to_vec(), spect)
    }

    fn build(root: &Path, classes: Vec<String>, spect: SpectrogramConfig) -> Result<Self, DatasetError> {
        let items = make_dataset(root, &classes)?;
        if items.is_empty() {
            return Err(DatasetError::Empty(root.to_path_buf()));
        }
        log::info!(
            "{}: {} clips across {} classes",
            root.display(),
            items.len(),
            classes.len()
        );
        Ok(Self {
            root: root.to_path_buf(),
            classes,
            items,
            spect,
            cache: None,
        })
    }

    /// Keep every extracted spectrogram in memory after first use.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled.then(|| (0..self.items.len()).map(|_| OnceLock::new()).collect());
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    #[inline]
    pub fn items(&self) -> &[(PathBuf, u32)] {
        &self.items
    }

    #[inline]
    pub fn spectrogram_config(&self) -> &SpectrogramConfig {
        &self.spect
    }

    /// Spectrogram and class index of item `i`.
    pub fn get(&self, i: usize) -> Result<(Cow<'_, Spectrogram>, u32), DatasetError> {
        let (path, label) = self.items.get(i).ok_or(DatasetError::IndexOutOfRange {
            index: i,
            len: self.items.len(),
        })?;
        let feats = match self.cache.as_ref().and_then(|c| c.get(i)) {
            Some(slot) => {
                if slot.get().is_none() {
                    // a racing worker may win; either value is identical
                    let _ = slot.set(self.extract(path)?);
                }
                match slot.get() {
                    Some(s) => Cow::Borrowed(s),
                    None => Cow::Owned(self.extract(path)?),
                }
            }
            None => Cow::Owned(self.extract(path)?),
        };
        Ok((feats, *label))
    }

    /// `(bins, frames)` of the spectrograms this dataset produces.
    pub fn input_dims(&self) -> Result<(usize, usize), DatasetError> {
        Ok(self.get(0)?.0.dims())
    }

    fn extract(&self, path: &Path) -> Result<Spectrogram, DatasetError> {
        let audio_err = |source| DatasetError::Audio {
            path: path.to_path_buf(),
            source,
        };
        let samples = load_wav(path).map_err(audio_err)?;
        spectrogram(&samples, &self.spect).map_err(audio_err)
    }
}

/* ─────────────────────── batching ─────────────────────── */

/// One mini-batch on the target device.
pub struct Batch {
    /// `[B, 1, bins, frames]` f32
    pub features: Tensor,
    /// `[B]` u32 class indices
    pub targets: Tensor,
}

impl Batch {
    #[inline]
    pub fn len(&self) -> usize {
        self.features.dims().first().copied().unwrap_or(0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mini-batch iterator factory over a [`SpeechCommands`] set.
pub struct DataLoader<'a> {
    dataset: &'a SpeechCommands,
    batch_size: usize,
    shuffle_seed: Option<u64>,
    device: Device,
    workers: Workers,
}

impl<'a> DataLoader<'a> {
    pub fn new(dataset: &'a SpeechCommands, batch_size: usize, device: &Device) -> Result<Self, DatasetError> {
        if batch_size == 0 {
            return Err(DatasetError::ZeroBatch);
        }
        Ok(Self {
            dataset,
            batch_size,
            shuffle_seed: None,
            device: device.clone(),
            workers: Workers::default(),
        })
    }

    /// Extract features on `workers` instead of the default pool.
    pub fn with_workers(mut self, workers: Workers) -> Self {
        self.workers = workers;
        self
    }

    /// Reshuffle every epoch from `seed`.
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    #[inline]
    pub fn dataset(&self) -> &SpeechCommands {
        self.dataset
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Item order for `epoch`: identity, or a seeded permutation.
    pub fn order(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if let Some(seed) = self.shuffle_seed {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
            order.shuffle(&mut rng);
        }
        order
    }

    /// Batches for `epoch`.
    pub fn batches(&self, epoch: usize) -> Batches<'_> {
        Batches {
            loader: self,
            order: self.order(epoch),
            pos: 0,
        }
    }

    fn collate(&self, idx: &[usize]) -> Result<Batch, DatasetError> {
        let dataset = self.dataset;
        #[cfg(feature = "rayon")]
        let items = self.workers.install(|| {
            idx.par_iter()
                .map(|&i| dataset.get(i))
                .collect::<Result<Vec<_>, _>>()
        })?;
        #[cfg(not(feature = "rayon"))]
        let items = idx
            .iter()
            .map(|&i| dataset.get(i))
            .collect::<Result<Vec<_>, _>>()?;

        let Some((first, _)) = items.first() else {
            return Err(DatasetError::ZeroBatch);
        };
        let (bins, frames) = first.dims();
        let mut flat = Vec::with_capacity(items.len() * bins * frames);
        let mut labels = Vec::with_capacity(items.len());
        for (&i, (spect, label)) in idx.iter().zip(&items) {
            if spect.dims() != (bins, frames) {
                return Err(DatasetError::DimensionMismatch {
                    path: self.dataset.items[i].0.clone(),
                    expected: (bins, frames),
                    got: spect.dims(),
                });
            }
            flat.extend_from_slice(&spect.data);
            labels.push(*label);
        }

        let n = labels.len();
        Ok(Batch {
            features: Tensor::from_vec(flat, (n, 1, bins, frames), &self.device)?,
            targets: Tensor::from_vec(labels, n, &self.device)?,
        })
    }
}

/// Iterator returned by [`DataLoader::batches`].
pub struct Batches<'a> {
    loader: &'a DataLoader<'a>,
    order: Vec<usize>,
    pos: usize,
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.order.len() {
            return None;
        }
        let hi = (self.pos + self.loader.batch_size).min(self.order.len());
        let idx = &self.order[self.pos..hi];
        self.pos = hi;
        Some(self.loader.collate(idx))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.order.len() - self.pos).div_ceil(self.loader.batch_size);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Batches<'_> {}

/* ─────────────────────── workers ─────────────────────── */

/// Feature-extraction thread pool shared by the loaders of one run.
///
/// `Workers::new(0)` (and the default) borrows Rayon's global pool; any
/// other count builds a private pool, so repeated runs in one process can
/// each pick their own size.
#[derive(Clone, Debug, Default)]
pub struct Workers {
    #[cfg(feature = "rayon")]
    pool: Option<std::sync::Arc<rayon::ThreadPool>>,
}

impl Workers {
    pub fn new(threads: usize) -> Result<Self, DatasetError> {
        #[cfg(feature = "rayon")]
        {
            if threads == 0 {
                return Ok(Self::default());
            }
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("gcommands-features-{i}"))
                .build()
                .map_err(|e| DatasetError::Workers(e.to_string()))?;
            log::debug!("feature extraction on {threads} worker threads");
            Ok(Self {
                pool: Some(std::sync::Arc::new(pool)),
            })
        }
        #[cfg(not(feature = "rayon"))]
        {
            if threads > 1 {
                log::warn!("built without `desktop`: feature extraction stays single-threaded");
            }
            Ok(Self::default())
        }
    }

    /// Threads that will run feature extraction.
    pub fn threads(&self) -> usize {
        #[cfg(feature = "rayon")]
        {
            self.pool
                .as_ref()
                .map_or_else(rayon::current_num_threads, |p| p.current_num_threads())
        }
        #[cfg(not(feature = "rayon"))]
        {
            1
        }
    }

    #[cfg(feature = "rayon")]
    fn install<R, F>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}

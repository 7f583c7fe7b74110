//! Raw Speech Commands release → `train/ valid/ test/` folders.
//!
//! The release ships every clip under `<label>/<file>.wav` plus two
//! manifests, `validation_list.txt` and `testing_list.txt`, listing the
//! relative paths that belong to the held-out splits.  Everything not
//! listed is training data.  `_background_noise_` is not a label and is
//! skipped.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use strum::{Display, EnumString};

use super::{DatasetError, find_classes, make_dataset};
use crate::constants::{BACKGROUND_NOISE_DIR, TESTING_LIST, VALIDATION_LIST};

/// Whether clips are copied or moved into the split folders.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, EnumString, Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SplitMode {
    #[default]
    Copy,
    Move,
}

/// Clips written per split.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SplitCounts {
    pub train: usize,
    pub valid: usize,
    pub test: usize,
}

impl SplitCounts {
    #[inline]
    pub fn total(&self) -> usize {
        self.train + self.valid + self.test
    }
}

/// Distribute `raw_root` into `out_root/{train,valid,test}`.
pub fn prepare_splits<P: AsRef<Path>, Q: AsRef<Path>>(
    raw_root: P,
    out_root: Q,
    mode: SplitMode,
) -> Result<SplitCounts, DatasetError> {
    let raw = raw_root.as_ref();
    let out = out_root.as_ref();

    let valid = read_manifest(&raw.join(VALIDATION_LIST))?;
    let test = read_manifest(&raw.join(TESTING_LIST))?;

    let classes: Vec<String> = find_classes(raw)?
        .into_iter()
        .filter(|c| c != BACKGROUND_NOISE_DIR)
        .collect();

    let mut counts = SplitCounts::default();
    for (path, _) in make_dataset(raw, &classes)? {
        let rel = relative_key(raw, &path);
        let split = if valid.contains(&rel) {
            counts.valid += 1;
            "valid"
        } else if test.contains(&rel) {
            counts.test += 1;
            "test"
        } else {
            counts.train += 1;
            "train"
        };

        let dest = out.join(split).join(&rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(DatasetError::io(parent))?;
        }
        match mode {
            SplitMode::Copy => fs::copy(&path, &dest).map(drop),
            SplitMode::Move => fs::rename(&path, &dest),
        }
        .map_err(DatasetError::io(&path))?;
    }

    log::info!(
        "split {} clips: train={} valid={} test={}",
        counts.total(),
        counts.train,
        counts.valid,
        counts.test
    );
    Ok(counts)
}

/* -------- helpers ------------------------------------------------- */

fn read_manifest(path: &Path) -> Result<HashSet<String>, DatasetError> {
    if !path.is_file() {
        return Err(DatasetError::MissingManifest(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(DatasetError::io(path))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect())
}

/// `label/file.wav` with forward slashes, as written in the manifests.
fn relative_key(root: &Path, path: &Path) -> String {
    let rel: PathBuf = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn relative_key_uses_forward_slashes() {
        let root = Path::new("raw");
        let p = root.join("yes").join("a.wav");
        assert_eq!(relative_key(root, &p), "yes/a.wav");
    }

    #[test]
    fn missing_manifest_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("yes")).unwrap();
        File::create(tmp.path().join(TESTING_LIST)).unwrap();
        let err = prepare_splits(tmp.path(), tmp.path().join("out"), SplitMode::Copy).unwrap_err();
        assert!(matches!(err, DatasetError::MissingManifest(_)));
    }
}

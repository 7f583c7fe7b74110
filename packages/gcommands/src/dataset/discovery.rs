//! Directory-convention label discovery.
//!
//! ```text
//! root/
//!   bed/   0a7c2a8d_nohash_0.wav …
//!   bird/  …
//!   yes/   …
//! ```
//!
//! Every sub-folder of `root` is a class; its position in the sorted folder
//! list is the class index.  Audio files are collected recursively below
//! each class folder, in sorted order, so the item list is deterministic.

use std::{
    fs,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use super::DatasetError;
use crate::constants::AUDIO_EXTENSIONS;

/// Sorted class-folder names of `root`.
pub fn find_classes<P: AsRef<Path>>(root: P) -> Result<Vec<String>, DatasetError> {
    let root = root.as_ref();
    let mut classes = Vec::new();
    for entry in fs::read_dir(root).map_err(DatasetError::io(root))? {
        let entry = entry.map_err(DatasetError::io(root))?;
        let is_dir = entry
            .file_type()
            .map_err(DatasetError::io(entry.path()))?
            .is_dir();
        if is_dir && let Some(name) = entry.file_name().to_str() {
            classes.push(name.to_owned());
        }
    }
    if classes.is_empty() {
        return Err(DatasetError::NoClasses(root.to_path_buf()));
    }
    classes.sort();
    Ok(classes)
}

/// `(path, class_index)` for every audio file under `root/<class>/`.
///
/// Classes listed in `classes` but absent on disk contribute nothing.
pub fn make_dataset<P: AsRef<Path>>(
    root: P,
    classes: &[String],
) -> Result<Vec<(PathBuf, u32)>, DatasetError> {
    let root = root.as_ref();
    let mut items = Vec::new();
    for (idx, class) in classes.iter().enumerate() {
        let dir = root.join(class);
        if !dir.is_dir() {
            continue;
        }
        items.extend(walk_sorted(&dir)?.into_iter().map(|p| (p, idx as u32)));
    }
    Ok(items)
}

#[inline]
pub(crate) fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| AUDIO_EXTENSIONS.contains(&e))
}

/// Audio files below `dir`: each folder's files first, then its
/// sub-folders, both in name order.
fn walk_sorted(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let mut files = Vec::new();
    let walk = WalkDir::new(dir).sort_by(|a, b| {
        a.file_type()
            .is_dir()
            .cmp(&b.file_type().is_dir())
            .then_with(|| a.file_name().cmp(b.file_name()))
    });
    for entry in walk {
        let entry = entry.map_err(|e| DatasetError::Io {
            path: e.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf),
            source: e.into(),
        })?;
        if !entry.file_type().is_dir() && is_audio_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(p: &Path) {
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        File::create(p).unwrap();
    }

    #[test]
    fn classes_are_sorted_directories_only() {
        let tmp = tempfile::tempdir().unwrap();
        for c in ["yes", "bed", "no"] {
            fs::create_dir(tmp.path().join(c)).unwrap();
        }
        touch(&tmp.path().join("README.md"));
        assert_eq!(find_classes(tmp.path()).unwrap(), ["bed", "no", "yes"]);
    }

    #[test]
    fn items_follow_class_then_file_order() {
        let tmp = tempfile::tempdir().unwrap();
        let r = tmp.path();
        touch(&r.join("yes/b.wav"));
        touch(&r.join("yes/a.WAV"));
        touch(&r.join("yes/notes.txt"));
        touch(&r.join("no/nested/c.wav"));
        touch(&r.join("no/z.wav"));

        let classes = find_classes(r).unwrap();
        let items = make_dataset(r, &classes).unwrap();
        let rel: Vec<(String, u32)> = items
            .iter()
            .map(|(p, c)| (p.strip_prefix(r).unwrap().to_string_lossy().into_owned(), *c))
            .collect();
        assert_eq!(
            rel,
            vec![
                ("no/z.wav".replace('/', std::path::MAIN_SEPARATOR_STR), 0),
                ("no/nested/c.wav".replace('/', std::path::MAIN_SEPARATOR_STR), 0),
                ("yes/a.WAV".replace('/', std::path::MAIN_SEPARATOR_STR), 1),
                ("yes/b.wav".replace('/', std::path::MAIN_SEPARATOR_STR), 1),
            ]
        );
    }

    #[test]
    fn nested_folders_are_walked_depth_first() {
        let tmp = tempfile::tempdir().unwrap();
        let r = tmp.path();
        touch(&r.join("go/b/deep/x.wav"));
        touch(&r.join("go/a/y.wav"));
        touch(&r.join("go/b/w.wav"));
        touch(&r.join("go/top.wav"));

        let files: Vec<PathBuf> = walk_sorted(&r.join("go"))
            .unwrap()
            .into_iter()
            .map(|p| p.strip_prefix(r.join("go")).unwrap().to_path_buf())
            .collect();
        let want: Vec<PathBuf> = ["top.wav", "a/y.wav", "b/w.wav", "b/deep/x.wav"]
            .iter()
            .map(|s| s.split('/').collect())
            .collect();
        assert_eq!(files, want);
    }

    #[test]
    fn root_without_folders_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_classes(tmp.path()),
            Err(DatasetError::NoClasses(_))
        ));
    }
}

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use ciborium::{de, ser};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use super::ModelError;

/* --------------------------------------------------------------------- */
/*  Error type                                                           */

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cbor: {0}")]
    Cbor(String),
    #[error("checkpoint version {found} is not supported (expected {expected})")]
    Version { found: u8, expected: u8 },
    #[error("model weight '{0}' missing in checkpoint")]
    MissingWeight(String),
    #[error("weight '{name}' has shape {got:?}, model expects {expected:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("tensor data malformed: {0}")]
    TensorData(String),
    #[error("mutex poison: {0}")]
    Poison(String),
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("model: {0}")]
    Model(#[from] ModelError),
}

type IoResult<T> = Result<T, CheckpointError>;

fn write_cbor<W: Write, T: Serialize + ?Sized>(w: W, val: &T) -> IoResult<()> {
    ser::into_writer(val, w).map_err(|e| CheckpointError::Cbor(e.to_string()))
}
fn read_cbor<R: Read, T: DeserializeOwned>(r: R) -> IoResult<T> {
    de::from_reader(r).map_err(|e| CheckpointError::Cbor(e.to_string()))
}

/* --------------------------------------------------------------------- */
/*  Traits                                                               */

/// CBOR persistence with atomic file replacement.
pub trait CheckpointSave: Serialize {
    /// Atomically write CBOR to `path`, creating parent directories.
    /// Uses “`<file>.tmp` → rename” on the same filesystem.
    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> IoResult<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("tmp");

        {
            let f = File::create(&tmp)?;
            let mut bw = BufWriter::new(f);
            write_cbor(&mut bw, self)?;
            bw.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Serialize into an in-memory CBOR buffer.
    fn save_to_buffer(&self) -> IoResult<Vec<u8>> {
        let mut buf = Vec::new();
        write_cbor(&mut buf, self)?;
        Ok(buf)
    }
}

/// CBOR loading; `check` runs on every decoded value.
pub trait CheckpointLoad: DeserializeOwned + Sized {
    /// Post-decode validation hook.
    fn check(&self) -> IoResult<()> {
        Ok(())
    }

    /// Load a CBOR file produced by [`CheckpointSave::save_to_file`].
    fn load_from_file<P: AsRef<Path>>(path: P) -> IoResult<Self> {
        let f = File::open(path)?;
        let val: Self = read_cbor(BufReader::new(f))?;
        val.check()?;
        Ok(val)
    }

    /// Load from a CBOR buffer.
    fn load_from_buffer(buf: &[u8]) -> IoResult<Self> {
        let val: Self = read_cbor(BufReader::new(buf))?;
        val.check()?;
        Ok(val)
    }
}

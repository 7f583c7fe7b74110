//! Run configuration.
//!
//! Defaults reproduce the classic Speech Commands experiment; a TOML file
//! can override any subset of fields and command-line flags override the
//! file:
//!
//! ```toml
//! epochs = 30
//! patience = 3
//!
//! [data]
//! train_path = "gcommands/train"
//! batch_size = 64
//!
//! [model]
//! arch = "LeNet"
//!
//! [optim]
//! kind = "sgd"
//! lr = 0.01
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    audio::SpectrogramConfig, constants::DEFAULT_CHECKPOINT_PATH, model::Architecture,
    optim::OptimizerKind,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("toml: {0}")]
    TomlWrite(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where the three splits live and how they are batched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub train_path: PathBuf,
    pub valid_path: PathBuf,
    pub test_path: PathBuf,
    /// Training and validation batch size.
    pub batch_size: usize,
    pub test_batch_size: usize,
    /// Feature-extraction threads; `0` uses every core.
    pub num_workers: usize,
    /// Keep extracted spectrograms in memory across epochs.
    pub cache: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_path: PathBuf::from("gcommands/train"),
            valid_path: PathBuf::from("gcommands/valid"),
            test_path: PathBuf::from("gcommands/test"),
            batch_size: 100,
            test_batch_size: 100,
            num_workers: 0,
            cache: true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub arch: Architecture,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimConfig {
    pub kind: OptimizerKind,
    pub lr: f64,
    /// SGD only.
    pub momentum: f64,
}

impl Default for OptimConfig {
    fn default() -> Self {
        Self {
            kind: OptimizerKind::Adam,
            lr: 0.001,
            momentum: 0.9,
        }
    }
}

/// Everything one training run needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    /// Epochs without validation improvement before stopping.
    pub patience: usize,
    /// Batches between progress lines.
    pub log_interval: usize,
    pub seed: u64,
    /// Use CUDA device 0 when the build and machine support it.
    pub cuda: bool,
    pub checkpoint: PathBuf,
    pub data: DataConfig,
    pub features: SpectrogramConfig,
    pub model: ModelConfig,
    pub optim: OptimConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            patience: 5,
            log_interval: 10,
            seed: 1234,
            cuda: false,
            checkpoint: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            data: DataConfig::default(),
            features: SpectrogramConfig::default(),
            model: ModelConfig::default(),
            optim: OptimConfig::default(),
        }
    }
}

impl TrainConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the training loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bad = |msg: &str| Err(ConfigError::Invalid(msg.to_owned()));
        if self.epochs == 0 {
            return bad("epochs must be positive");
        }
        if self.patience == 0 {
            return bad("patience must be positive");
        }
        if self.data.batch_size == 0 || self.data.test_batch_size == 0 {
            return bad("batch sizes must be positive");
        }
        if self.log_interval == 0 {
            return bad("log_interval must be positive");
        }
        if !(self.optim.lr > 0.0) {
            return bad("learning rate must be positive");
        }
        if !(0.0..1.0).contains(&self.optim.momentum) {
            return bad("momentum must lie in [0, 1)");
        }
        if !(self.features.window_size > 0.0) || !(self.features.window_stride > 0.0) {
            return bad("window size and stride must be positive");
        }
        if self.features.max_len == 0 {
            return bad("max_len must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Window;

    #[test]
    fn defaults_match_the_classic_experiment() {
        let c = TrainConfig::default();
        assert_eq!(c.model.arch, Architecture::Vgg11);
        assert_eq!(c.optim.kind, OptimizerKind::Adam);
        assert_eq!((c.epochs, c.patience, c.seed), (10, 5, 1234));
        assert_eq!(c.data.batch_size, 100);
        assert_eq!(c.features.max_len, 101);
        c.validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let c = TrainConfig::from_toml_str(
            r#"
            epochs = 3
            [model]
            arch = "LeNet"
            [optim]
            kind = "sgd"
            [features]
            window = "hann"
            "#,
        )
        .unwrap();
        assert_eq!(c.epochs, 3);
        assert_eq!(c.model.arch, Architecture::LeNet);
        assert_eq!(c.optim.kind, OptimizerKind::Sgd);
        assert_eq!(c.features.window, Window::Hann);
        assert_eq!(c.optim.lr, 0.001);
        assert_eq!(c.data.test_path, PathBuf::from("gcommands/test"));
    }

    #[test]
    fn toml_round_trip() {
        let c = TrainConfig::default();
        let back = TrainConfig::from_toml_str(&c.to_toml_string().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut c = TrainConfig::default();
        c.optim.momentum = 1.0;
        assert!(c.validate().is_err());
        let mut c = TrainConfig::default();
        c.data.batch_size = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn zero_patience_is_rejected() {
        let c = TrainConfig::from_toml_str("patience = 0\n").unwrap();
        match c.validate() {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("patience")),
            other => panic!("expected patience error, got {other:?}"),
        }
        let c = TrainConfig::from_toml_str("patience = 1\n").unwrap();
        c.validate().unwrap();
    }
}

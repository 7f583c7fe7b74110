//! Model selector: LeNet / VGG classifiers over single-channel spectrograms.
//!
//! Every architecture outputs **log-probabilities** `[B, classes]`; the
//! trainer pairs them with an NLL loss.

mod checkpoint;
mod lenet;
mod persist;
mod vgg;

use candle_core::{DType, Device, Result as CandleResult, Tensor};
use candle_nn::{VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

pub use checkpoint::{Checkpoint, TensorData};
pub use lenet::LeNet;
pub use persist::{CheckpointError, CheckpointLoad, CheckpointSave};
pub use vgg::Vgg;

/* ------------------------------------------------------------------------- */
/*  Error handling                                                           */
/* ------------------------------------------------------------------------- */

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("candle: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("{arch} needs a larger input than {bins}x{frames}")]
    InputTooSmall {
        arch: Architecture,
        bins: usize,
        frames: usize,
    },
    #[error("a classifier needs at least one class")]
    NoClasses,
}

/* ------------------------------------------------------------------------- */
/*  Architecture enum                                                        */
/* ------------------------------------------------------------------------- */

/// Network architectures the trainer can instantiate.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Display,
)]
#[strum(ascii_case_insensitive)]
pub enum Architecture {
    /// Two 5x5 convolutions + two dense layers.
    #[strum(serialize = "LeNet")]
    #[serde(rename = "LeNet")]
    LeNet,
    #[default]
    #[strum(serialize = "VGG11")]
    #[serde(rename = "VGG11")]
    Vgg11,
    #[strum(serialize = "VGG13")]
    #[serde(rename = "VGG13")]
    Vgg13,
    #[strum(serialize = "VGG16")]
    #[serde(rename = "VGG16")]
    Vgg16,
    #[strum(serialize = "VGG19")]
    #[serde(rename = "VGG19")]
    Vgg19,
}

/* ------------------------------------------------------------------------- */
/*  Traits                                                                   */
/* ------------------------------------------------------------------------- */

pub trait Classifier: Send + Sync {
    fn new(vs: VarBuilder, input: (usize, usize), classes: usize) -> Result<Self, ModelError>
    where
        Self: Sized;

    /// `xs` is `[B, 1, bins, frames]`; `train` enables dropout and
    /// batch-statistics normalisation.
    fn forward_t(&self, xs: &Tensor, train: bool) -> CandleResult<Tensor>;
}

/* ------------------------------------------------------------------------- */
/*  Model = weights + network                                                */
/* ------------------------------------------------------------------------- */

/// A freshly initialised (or restored) classifier and the variables that
/// back it.
pub struct Model {
    arch: Architecture,
    labels: Vec<String>,
    input_dims: (usize, usize),
    var_map: VarMap,
    net: Box<dyn Classifier>,
    device: Device,
}

impl Model {
    /// Instantiate `arch` for `input_dims = (bins, frames)` spectrograms and
    /// one output per label.
    pub fn new(
        arch: Architecture,
        input_dims: (usize, usize),
        labels: Vec<String>,
        device: &Device,
    ) -> Result<Self, ModelError> {
        if labels.is_empty() {
            return Err(ModelError::NoClasses);
        }
        let var_map = VarMap::new();
        let net = init_model(arch, &var_map, device, input_dims, labels.len())?;
        log::debug!(
            "{arch}: {} tensors, {} parameters",
            var_map.all_vars().len(),
            count_params(&var_map)
        );
        Ok(Self {
            arch,
            labels,
            input_dims,
            var_map,
            net,
            device: device.clone(),
        })
    }

    /// Rebuild the network described by `ckpt` and load its weights.
    pub fn from_checkpoint(ckpt: &Checkpoint, device: &Device) -> Result<Self, CheckpointError> {
        let model = Self::new(ckpt.arch, ckpt.input_dims, ckpt.labels.clone(), device)?;
        ckpt.restore(&model.var_map)?;
        Ok(model)
    }

    #[inline]
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> CandleResult<Tensor> {
        self.net.forward_t(xs, train)
    }

    #[inline]
    pub fn arch(&self) -> Architecture {
        self.arch
    }

    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[inline]
    pub fn input_dims(&self) -> (usize, usize) {
        self.input_dims
    }

    #[inline]
    pub fn var_map(&self) -> &VarMap {
        &self.var_map
    }

    #[inline]
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn num_params(&self) -> usize {
        count_params(&self.var_map)
    }
}

/* ------------------------------------------------------------------------- */
/*  Model factory                                                            */
/* ------------------------------------------------------------------------- */

fn init_model(
    arch: Architecture,
    var_map: &VarMap,
    dev: &Device,
    input: (usize, usize),
    classes: usize,
) -> Result<Box<dyn Classifier>, ModelError> {
    let vs = VarBuilder::from_varmap(var_map, DType::F32, dev);
    let boxed: Box<dyn Classifier> = match arch {
        Architecture::LeNet => Box::new(LeNet::new(vs, input, classes)?),
        Architecture::Vgg11
        | Architecture::Vgg13
        | Architecture::Vgg16
        | Architecture::Vgg19 => Box::new(Vgg::for_arch(arch, vs, input, classes)?),
    };
    Ok(boxed)
}

fn count_params(vm: &VarMap) -> usize {
    vm.all_vars().iter().map(|v| v.elem_count()).sum()
}

/* ------------------------------------------------------------------------- */
/*  Shared layers                                                            */
/* ------------------------------------------------------------------------- */

/// Zero whole feature maps with probability `p` (training only), scaling the
/// survivors by `1 / (1 - p)`.
pub(crate) fn channel_dropout(xs: &Tensor, p: f32, train: bool) -> CandleResult<Tensor> {
    if !train || p <= 0.0 {
        return Ok(xs.clone());
    }
    let (b, c, _, _) = xs.dims4()?;
    let keep = Tensor::rand(0f32, 1f32, (b, c, 1, 1), xs.device())?.ge(p)?;
    let mask = (keep.to_dtype(xs.dtype())? * (1.0 / (1.0 - f64::from(p))))?;
    xs.broadcast_mul(&mask)
}

use candle_core::{D, Result as CandleResult, Tensor};
use candle_nn::{
    BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Linear, Module, ModuleT, VarBuilder, ops,
};

use super::{Architecture, Classifier, ModelError};
use crate::constants::VGG_HIDDEN;

/* -- layer plans ---------------------------------------------------------- */

#[derive(Clone, Copy, Debug)]
enum Cfg {
    /// 3x3 conv (pad 1) → batch-norm → relu with this many output maps.
    C(usize),
    /// 2x2 max-pool, stride 2.
    M,
}

use Cfg::{C, M};

#[rustfmt::skip]
const VGG11: &[Cfg] = &[
    C(64), M, C(128), M, C(256), C(256), M, C(512), C(512), M, C(512), C(512), M,
];
#[rustfmt::skip]
const VGG13: &[Cfg] = &[
    C(64), C(64), M, C(128), C(128), M, C(256), C(256), M, C(512), C(512), M, C(512), C(512), M,
];
#[rustfmt::skip]
const VGG16: &[Cfg] = &[
    C(64), C(64), M, C(128), C(128), M, C(256), C(256), C(256), M, C(512), C(512), C(512), M,
    C(512), C(512), C(512), M,
];
#[rustfmt::skip]
const VGG19: &[Cfg] = &[
    C(64), C(64), M, C(128), C(128), M, C(256), C(256), C(256), C(256), M, C(512), C(512),
    C(512), C(512), M, C(512), C(512), C(512), C(512), M,
];

fn plan(arch: Architecture) -> &'static [Cfg] {
    match arch {
        Architecture::Vgg13 => VGG13,
        Architecture::Vgg16 => VGG16,
        Architecture::Vgg19 => VGG19,
        Architecture::Vgg11 | Architecture::LeNet => VGG11,
    }
}

/* -- network -------------------------------------------------------------- */

enum Layer {
    Conv { conv: Conv2d, bn: BatchNorm },
    Pool,
}

/// VGG feature stack + two-layer classifier head.
pub struct Vgg {
    features: Vec<Layer>,
    fc1: Linear,
    fc2: Linear,
}

impl Vgg {
    /// Flattened width after the feature stack of `arch`.
    pub fn flat_width(arch: Architecture, (bins, frames): (usize, usize)) -> Option<usize> {
        let layers = plan(arch);
        let pools = layers.iter().filter(|l| matches!(l, M)).count();
        let channels = layers
            .iter()
            .rev()
            .find_map(|l| match l {
                C(n) => Some(*n),
                M => None,
            })
            .unwrap_or(1);
        let (h, w) = (bins >> pools, frames >> pools);
        (h > 0 && w > 0).then_some(channels * h * w)
    }

    pub fn for_arch(
        arch: Architecture,
        vs: VarBuilder,
        input: (usize, usize),
        classes: usize,
    ) -> Result<Self, ModelError> {
        let flat = Self::flat_width(arch, input).ok_or(ModelError::InputTooSmall {
            arch,
            bins: input.0,
            frames: input.1,
        })?;

        let conv_cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        let feats = vs.pp("features");
        let mut in_ch = 1;
        let mut features = Vec::with_capacity(plan(arch).len());
        for (i, layer) in plan(arch).iter().enumerate() {
            match *layer {
                C(out_ch) => {
                    let vs_i = feats.pp(i.to_string());
                    let conv = candle_nn::conv2d(in_ch, out_ch, 3, conv_cfg, vs_i.pp("conv"))?;
                    let bn = candle_nn::batch_norm(out_ch, BatchNormConfig::default(), vs_i.pp("bn"))?;
                    features.push(Layer::Conv { conv, bn });
                    in_ch = out_ch;
                }
                M => features.push(Layer::Pool),
            }
        }

        Ok(Self {
            features,
            fc1: candle_nn::linear(flat, VGG_HIDDEN, vs.pp("fc1"))?,
            fc2: candle_nn::linear(VGG_HIDDEN, classes, vs.pp("fc2"))?,
        })
    }
}

impl Classifier for Vgg {
    fn new(vs: VarBuilder, input: (usize, usize), classes: usize) -> Result<Self, ModelError> {
        Self::for_arch(Architecture::Vgg11, vs, input, classes)
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> CandleResult<Tensor> {
        let mut xs = xs.clone();
        for layer in &self.features {
            xs = match layer {
                Layer::Conv { conv, bn } => bn.forward_t(&conv.forward(&xs)?, train)?.relu()?,
                Layer::Pool => xs.max_pool2d(2)?,
            };
        }
        let xs = xs.flatten_from(1)?;
        let xs = self.fc1.forward(&xs)?;
        let logits = self.fc2.forward(&xs)?;
        ops::log_softmax(&logits, D::Minus1)
    }
}

use candle_core::{D, Result as CandleResult, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, Linear, Module, VarBuilder, ops};

use super::{Architecture, Classifier, ModelError, channel_dropout};
use crate::constants::{DROPOUT_P, LENET_CHANNELS, LENET_HIDDEN, LENET_KERNEL};

/// LeNet-style classifier.
///
/// `conv5 → pool2 → relu → conv5 → drop2d → pool2 → relu → fc → relu → drop → fc`
pub struct LeNet {
    conv1: Conv2d,
    conv2: Conv2d,
    fc1: Linear,
    fc2: Linear,
}

impl LeNet {
    /// Flattened width after the convolutional stack, `None` when the
    /// input collapses to nothing.
    pub fn flat_width((bins, frames): (usize, usize)) -> Option<usize> {
        let side = |n: usize| {
            let n = n.checked_sub(LENET_KERNEL - 1)? / 2;
            let n = n.checked_sub(LENET_KERNEL - 1)? / 2;
            (n > 0).then_some(n)
        };
        Some(LENET_CHANNELS * side(bins)? * side(frames)?)
    }
}

impl Classifier for LeNet {
    fn new(vs: VarBuilder, input: (usize, usize), classes: usize) -> Result<Self, ModelError> {
        let flat = Self::flat_width(input).ok_or(ModelError::InputTooSmall {
            arch: Architecture::LeNet,
            bins: input.0,
            frames: input.1,
        })?;
        let cfg = Conv2dConfig::default();
        Ok(Self {
            conv1: candle_nn::conv2d(1, LENET_CHANNELS, LENET_KERNEL, cfg, vs.pp("conv1"))?,
            conv2: candle_nn::conv2d(
                LENET_CHANNELS,
                LENET_CHANNELS,
                LENET_KERNEL,
                cfg,
                vs.pp("conv2"),
            )?,
            fc1: candle_nn::linear(flat, LENET_HIDDEN, vs.pp("fc1"))?,
            fc2: candle_nn::linear(LENET_HIDDEN, classes, vs.pp("fc2"))?,
        })
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> CandleResult<Tensor> {
        let xs = self.conv1.forward(xs)?.max_pool2d(2)?.relu()?;
        let xs = self.conv2.forward(&xs)?;
        let xs = channel_dropout(&xs, DROPOUT_P, train)?;
        let xs = xs.max_pool2d(2)?.relu()?.flatten_from(1)?;
        let xs = self.fc1.forward(&xs)?.relu()?;
        let xs = if train {
            ops::dropout(&xs, DROPOUT_P)?
        } else {
            xs
        };
        let logits = self.fc2.forward(&xs)?;
        ops::log_softmax(&logits, D::Minus1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn default_input_flattens_to_16280() {
        assert_eq!(LeNet::flat_width((161, 101)), Some(16_280));
        assert_eq!(LeNet::flat_width((12, 101)), None);
    }

    #[test]
    fn forward_yields_log_probabilities() -> anyhow::Result<()> {
        let vm = VarMap::new();
        let vs = VarBuilder::from_varmap(&vm, DType::F32, &Device::Cpu);
        let net = LeNet::new(vs, (24, 24), 3)?;
        let xs = Tensor::randn(0f32, 1f32, (2, 1, 24, 24), &Device::Cpu)?;
        let out = net.forward_t(&xs, false)?;
        assert_eq!(out.dims(), &[2, 3]);
        let sums = out.exp()?.sum(1)?.to_vec1::<f32>()?;
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-4));
        Ok(())
    }
}

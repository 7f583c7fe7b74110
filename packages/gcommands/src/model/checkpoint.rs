//! Best-model checkpoint: architecture, label set, feature parameters,
//! training progress and every weight tensor, CBOR-encoded.

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::VarMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Architecture, CheckpointError, CheckpointLoad, CheckpointSave, Model};
use crate::{audio::SpectrogramConfig, constants::CHECKPOINT_VERSION};

/// Typed wrapper for a CBOR-serialised classifier.
#[derive(Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    /// File format version header.
    version: u8,

    pub arch: Architecture,

    /// Class names, index = network output.
    pub labels: Vec<String>,

    /// `(bins, frames)` of the spectrograms the network was built for.
    pub input_dims: (usize, usize),

    /// Feature extraction the weights were trained on.
    pub spectrogram: SpectrogramConfig,

    /// Epoch (1-based) that produced these weights.
    pub epoch: usize,

    /// Average validation NLL at `epoch`.
    pub valid_loss: f32,

    /// Weight tensors in name order.
    pub weights: IndexMap<String, TensorData>,
}

impl Checkpoint {
    /// Snapshot `model`'s current variables.
    pub fn capture(
        model: &Model,
        spectrogram: &SpectrogramConfig,
        epoch: usize,
        valid_loss: f32,
    ) -> Result<Self, CheckpointError> {
        Ok(Self {
            version: CHECKPOINT_VERSION,
            arch: model.arch(),
            labels: model.labels().to_vec(),
            input_dims: model.input_dims(),
            spectrogram: spectrogram.clone(),
            epoch,
            valid_loss,
            weights: tensors_data(model.var_map())?,
        })
    }

    /// Copy the stored weights into `vm`, which must hold exactly the
    /// variables of the same architecture.
    pub fn restore(&self, vm: &VarMap) -> Result<(), CheckpointError> {
        let guard = vm
            .data()
            .lock()
            .map_err(|e| CheckpointError::Poison(format!("var_map.data(): {e}")))?;
        for (name, var) in guard.iter() {
            let td = self
                .weights
                .get(name)
                .ok_or_else(|| CheckpointError::MissingWeight(name.clone()))?;
            if var.dims() != td.dims.as_slice() {
                return Err(CheckpointError::ShapeMismatch {
                    name: name.clone(),
                    expected: var.dims().to_vec(),
                    got: td.dims.clone(),
                });
            }
            var.set(&td.to_tensor(var.device())?)?;
        }
        Ok(())
    }

    #[inline]
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Scalar parameters stored.
    pub fn num_params(&self) -> usize {
        self.weights
            .values()
            .map(|t| t.dims.iter().product::<usize>())
            .sum()
    }
}

impl CheckpointSave for Checkpoint {}

impl CheckpointLoad for Checkpoint {
    fn check(&self) -> Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Version {
                found: self.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        Ok(())
    }
}

/* --------------------------------------------------------------------- */
/*  Tensor wrapper                                                       */

/// Serializable tensor data container.
///
/// Weights are stored as little-endian `f32`; the dtype string is kept so
/// readers can reject anything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorData {
    /// Raw tensor bytes in little-endian format
    #[serde(with = "serde_bytes_vec")]
    pub bytes: Vec<u8>,
    /// Tensor shape dimensions in row-major order
    pub dims: Vec<usize>,
    /// Candle data type as lowercase string
    pub d_type: String,
}

impl TensorData {
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor, CheckpointError> {
        if self.d_type != DType::F32.as_str() {
            return Err(CheckpointError::TensorData(format!(
                "unsupported dtype {}",
                self.d_type
            )));
        }
        let n: usize = self.dims.iter().product();
        if self.bytes.len() != n * 4 {
            return Err(CheckpointError::TensorData(format!(
                "{} bytes for {n} f32 values",
                self.bytes.len()
            )));
        }
        let values: Vec<f32> = self
            .bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(Tensor::from_vec(values, self.dims.as_slice(), device)?)
    }
}

impl TryFrom<&Var> for TensorData {
    type Error = CheckpointError;

    fn try_from(var: &Var) -> Result<Self, Self::Error> {
        let values = var
            .as_tensor()
            .to_dtype(DType::F32)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        Ok(TensorData {
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            dims: var.dims().to_vec(),
            d_type: DType::F32.as_str().to_owned(),
        })
    }
}

fn tensors_data(vm: &VarMap) -> Result<IndexMap<String, TensorData>, CheckpointError> {
    let guard = vm
        .data()
        .lock()
        .map_err(|e| CheckpointError::Poison(format!("var_map.data(): {e}")))?;
    let mut names: Vec<&String> = guard.keys().collect();
    names.sort();
    names
        .into_iter()
        .map(|name| Ok((name.clone(), TensorData::try_from(&guard[name])?)))
        .collect()
}

// CBOR byte strings instead of arrays of integers: ~half the file size.
mod serde_bytes_vec {
    use serde::{Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        struct BytesVisitor;

        impl<'de> de::Visitor<'de> for BytesVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a byte string")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Ok(v)
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(b) = seq.next_element()? {
                    out.push(b);
                }
                Ok(out)
            }
        }

        d.deserialize_byte_buf(BytesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model() -> Model {
        Model::new(
            Architecture::LeNet,
            (24, 24),
            vec!["no".into(), "yes".into()],
            &Device::Cpu,
        )
        .unwrap()
    }

    #[test]
    fn capture_restore_round_trip_through_cbor() -> anyhow::Result<()> {
        let src = tiny_model();
        let ckpt = Checkpoint::capture(&src, &SpectrogramConfig::default(), 3, 0.5)?;
        assert_eq!(ckpt.num_params(), src.num_params());

        let bytes = ckpt.save_to_buffer()?;
        let loaded = Checkpoint::load_from_buffer(&bytes)?;
        assert_eq!(loaded.epoch, 3);
        assert_eq!(loaded.labels, ["no", "yes"]);

        let dst = Model::from_checkpoint(&loaded, &Device::Cpu)?;
        let xs = Tensor::randn(0f32, 1f32, (1, 1, 24, 24), &Device::Cpu)?;
        let a = src.forward_t(&xs, false)?.to_vec2::<f32>()?;
        let b = dst.forward_t(&xs, false)?.to_vec2::<f32>()?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn restore_rejects_other_architecture() {
        let ckpt = Checkpoint::capture(&tiny_model(), &SpectrogramConfig::default(), 1, 1.0).unwrap();
        let other = Model::new(
            Architecture::LeNet,
            (24, 24),
            vec!["a".into(), "b".into(), "c".into()],
            &Device::Cpu,
        )
        .unwrap();
        assert!(matches!(
            ckpt.restore(other.var_map()),
            Err(CheckpointError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn unknown_version_is_rejected() -> anyhow::Result<()> {
        let mut ckpt = Checkpoint::capture(&tiny_model(), &SpectrogramConfig::default(), 1, 1.0)?;
        ckpt.version = CHECKPOINT_VERSION + 1;
        let bytes = ckpt.save_to_buffer()?;
        assert!(matches!(
            Checkpoint::load_from_buffer(&bytes),
            Err(CheckpointError::Version { .. })
        ));
        Ok(())
    }
}

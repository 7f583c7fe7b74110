//! **WAV decoding**
//!
//! Decodes a WAV stream at its *native* sample rate into mono `f32`
//! samples in `[-1, 1)`.  Integer PCM is scaled by `2^(bits-1)`, float PCM
//! passes through, and interleaved channels are averaged.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use hound::{SampleFormat, WavReader};

use super::AudioError;

/// Mono PCM plus the rate it was recorded at.
#[derive(Clone, Debug, PartialEq)]
pub struct Samples {
    pub data: Vec<f32>,
    pub sample_rate: u32,
}

impl Samples {
    /// Duration in seconds.
    #[inline]
    pub fn duration(&self) -> f32 {
        self.data.len() as f32 / self.sample_rate as f32
    }
}

/// Open and decode `path`.
pub fn load_wav<P: AsRef<Path>>(path: P) -> Result<Samples, AudioError> {
    let f = File::open(path).map_err(hound::Error::IoError)?;
    read_wav(BufReader::new(f))
}

/// Decode a WAV stream from any reader.
pub fn read_wav<R: Read>(reader: R) -> Result<Samples, AudioError> {
    let mut wav = WavReader::new(reader)?;
    let spec = wav.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => wav.samples::<f32>().collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits @ 8..=32) => {
            let scale = 1.0 / (1u64 << (bits - 1)) as f32;
            wav.samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Float, bits) => {
            return Err(AudioError::Unsupported {
                bits,
                kind: "float",
            });
        }
        (SampleFormat::Int, bits) => return Err(AudioError::Unsupported { bits, kind: "int" }),
    };

    let data = if channels == 1 {
        interleaved
    } else {
        downmix(&interleaved, channels)
    };

    Ok(Samples {
        data,
        sample_rate: spec.sample_rate,
    })
}

/* ────────────────────── utils ──────────────────────────────── */

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    let inv = 1.0 / channels as f32;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() * inv)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use std::io::Cursor;

    fn encode_i16(channels: u16, samples: &[i16]) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cur = Cursor::new(Vec::new());
        {
            let mut w = WavWriter::new(&mut cur, spec).unwrap();
            for &s in samples {
                w.write_sample(s).unwrap();
            }
            w.finalize().unwrap();
        }
        cur.into_inner()
    }

    #[test]
    fn int16_is_scaled_to_unit_range() {
        let bytes = encode_i16(1, &[0, 16_384, -32_768]);
        let s = read_wav(Cursor::new(bytes)).unwrap();
        assert_eq!(s.sample_rate, 8_000);
        assert_eq!(s.data, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let bytes = encode_i16(2, &[16_384, 0, -16_384, -16_384]);
        let s = read_wav(Cursor::new(bytes)).unwrap();
        assert_eq!(s.data, vec![0.25, -0.5]);
    }
}

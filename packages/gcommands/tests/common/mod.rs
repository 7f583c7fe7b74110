//! WAV fixtures shared by the integration tests.
#![allow(dead_code)]

use std::{f32::consts::TAU, fs, path::Path};

use anyhow::Result;
use gcommands::SpectrogramConfig;

pub const RATE: u32 = 8_000;

/// Small features: 81 bins x 24 frames at 8 kHz.
pub fn small_features() -> SpectrogramConfig {
    SpectrogramConfig {
        max_len: 24,
        ..Default::default()
    }
}

/// Write a quarter-second 16-bit mono tone.
pub fn write_tone(path: &Path, freq: f32, amp: f32, rate: u32) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut w = hound::WavWriter::create(path, spec)?;
    for n in 0..rate / 4 {
        let s = amp * (TAU * freq * n as f32 / rate as f32).sin();
        w.write_sample((s * i16::MAX as f32) as i16)?;
    }
    w.finalize()?;
    Ok(())
}

/// `root/<label>/<label>_<i>.wav` for each `(label, freq)`, `per_class` clips
/// each with slightly different loudness.
pub fn write_split(root: &Path, classes: &[(&str, f32)], per_class: usize) -> Result<()> {
    for (label, freq) in classes {
        for i in 0..per_class {
            let amp = 0.3 + 0.1 * i as f32;
            write_tone(&root.join(label).join(format!("{label}_{i}.wav")), *freq, amp, RATE)?;
        }
    }
    Ok(())
}

pub const TONES: &[(&str, f32)] = &[("high", 2_000.0), ("low", 300.0)];

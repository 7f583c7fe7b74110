//! **Log-magnitude STFT front-end**
//!
//! 1. Centre the signal: reflect-pad `n_fft / 2` samples on both sides.
//! 2. Slice into overlapping frames (`window_size` / `window_stride` seconds).
//! 3. Window + FFT every frame, keep `n_fft / 2 + 1` magnitude bins.
//! 4. `log1p`, then pad / cut the time axis to exactly `max_len` frames.
//! 5. Optionally standardise the whole matrix (see [`SpectNormalizer`]).
//!
//! The output is row-major `[bins][max_len]`, i.e. a single-channel image
//! with frequency on the vertical axis.

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex32};
use serde::{Deserialize, Serialize};

use super::{AudioError, Samples, SpectNormalizer, Window};
use crate::constants::{
    SPECT_DEFAULT_MAX_LEN, SPECT_DEFAULT_WINDOW_SIZE_S, SPECT_DEFAULT_WINDOW_STRIDE_S,
};

/// Feature-extraction parameters.  Persisted inside checkpoints so a model
/// is always evaluated on the features it was trained on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    /// Analysis window length in seconds.
    pub window_size: f64,
    /// Hop between frames in seconds.
    pub window_stride: f64,
    pub window: Window,
    /// Standardise each spectrogram to zero mean / unit std.
    pub normalize: bool,
    /// Time frames per spectrogram.
    pub max_len: usize,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            window_size: SPECT_DEFAULT_WINDOW_SIZE_S,
            window_stride: SPECT_DEFAULT_WINDOW_STRIDE_S,
            window: Window::default(),
            normalize: true,
            max_len: SPECT_DEFAULT_MAX_LEN,
        }
    }
}

impl SpectrogramConfig {
    /// FFT size (= window length) in samples at `sample_rate`.
    #[inline]
    pub fn n_fft(&self, sample_rate: u32) -> usize {
        (f64::from(sample_rate) * self.window_size) as usize
    }

    /// Hop length in samples at `sample_rate`.
    #[inline]
    pub fn hop(&self, sample_rate: u32) -> usize {
        (f64::from(sample_rate) * self.window_stride) as usize
    }

    /// Number of frequency rows produced at `sample_rate`.
    #[inline]
    pub fn bins(&self, sample_rate: u32) -> usize {
        self.n_fft(sample_rate) / 2 + 1
    }
}

/// A `[bins][frames]` feature matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Spectrogram {
    pub bins: usize,
    pub frames: usize,
    pub data: Vec<f32>,
}

impl Spectrogram {
    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        (self.bins, self.frames)
    }

    #[inline]
    pub fn at(&self, bin: usize, frame: usize) -> f32 {
        self.data[bin * self.frames + frame]
    }
}

/// Compute the fixed-size spectrogram of `samples`.
pub fn spectrogram(samples: &Samples, cfg: &SpectrogramConfig) -> Result<Spectrogram, AudioError> {
    if samples.data.is_empty() {
        return Err(AudioError::Empty);
    }
    let mut stft = Stft::new(
        cfg.n_fft(samples.sample_rate),
        cfg.hop(samples.sample_rate),
        cfg.window,
    )?;

    let bins = stft.bins();
    let max_len = cfg.max_len;
    let mut data = vec![0f32; bins * max_len];

    for (t, mags) in stft.magnitudes(&samples.data).take(max_len).enumerate() {
        for (b, m) in mags.into_iter().enumerate() {
            data[b * max_len + t] = m.ln_1p();
        }
    }

    if cfg.normalize {
        SpectNormalizer::normalize(&mut data);
    }

    Ok(Spectrogram {
        bins,
        frames: max_len,
        data,
    })
}

/* ─────────────────────── STFT engine ─────────────────────── */

/// Centred short-time Fourier transform with cached plan and window.
pub(crate) struct Stft {
    n_fft: usize,
    hop: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buf: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl Stft {
    pub(crate) fn new(n_fft: usize, hop: usize, window: Window) -> Result<Self, AudioError> {
        if n_fft < 2 {
            return Err(AudioError::WindowTooShort(n_fft));
        }
        if hop == 0 {
            return Err(AudioError::ZeroHop);
        }
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n_fft);
        let scratch = vec![Complex32::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Ok(Self {
            n_fft,
            hop,
            fft,
            window: window.coefficients(n_fft),
            buf: vec![Complex32::new(0.0, 0.0); n_fft],
            scratch,
        })
    }

    #[inline]
    pub(crate) fn bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Number of centred frames for a signal of `len` samples.
    #[inline]
    pub(crate) fn frame_count(&self, len: usize) -> usize {
        let padded = len + 2 * (self.n_fft / 2);
        if padded < self.n_fft {
            0
        } else {
            1 + (padded - self.n_fft) / self.hop
        }
    }

    /// Iterate magnitude spectra frame by frame.
    pub(crate) fn magnitudes<'a>(
        &'a mut self,
        signal: &'a [f32],
    ) -> impl Iterator<Item = Vec<f32>> + 'a {
        let frames = self.frame_count(signal.len());
        (0..frames).map(move |t| self.frame(signal, t))
    }

    fn frame(&mut self, signal: &[f32], t: usize) -> Vec<f32> {
        let pad = (self.n_fft / 2) as isize;
        let start = (t * self.hop) as isize - pad;
        for (i, (dst, &w)) in self.buf.iter_mut().zip(&self.window).enumerate() {
            let x = signal[reflect(start + i as isize, signal.len())];
            *dst = Complex32::new(x * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.buf, &mut self.scratch);
        self.buf[..self.bins()].iter().map(|c| c.norm()).collect()
    }
}

/// Map a (possibly out-of-range) index onto `0..len` by mirror reflection
/// without repeating the edge sample.
#[inline]
fn reflect(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let k = i.rem_euclid(period);
    if k < len as isize {
        k as usize
    } else {
        (period - k) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sr: u32, secs: f32) -> Samples {
        let n = (sr as f32 * secs) as usize;
        Samples {
            data: (0..n)
                .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
                .collect(),
            sample_rate: sr,
        }
    }

    #[test]
    fn reflect_mirrors_without_edge_repeat() {
        // [a b c d]  → index -2 → c, -1 → b, 4 → c, 5 → b
        assert_eq!(reflect(-2, 4), 2);
        assert_eq!(reflect(-1, 4), 1);
        assert_eq!(reflect(4, 4), 2);
        assert_eq!(reflect(5, 4), 1);
        assert_eq!(reflect(9, 1), 0);
    }

    #[test]
    fn one_second_at_16k_yields_161_by_101() {
        let cfg = SpectrogramConfig::default();
        let s = spectrogram(&sine(440.0, 16_000, 1.0), &cfg).unwrap();
        assert_eq!(s.dims(), (161, 101));
        let stft = Stft::new(320, 160, Window::Hamming).unwrap();
        assert_eq!(stft.frame_count(16_000), 101);
    }

    #[test]
    fn short_clips_are_zero_padded_in_time() {
        let cfg = SpectrogramConfig {
            normalize: false,
            ..Default::default()
        };
        let s = spectrogram(&sine(440.0, 16_000, 0.25), &cfg).unwrap();
        // 4000 samples → 26 frames, the rest is padding
        assert!(s.at(10, 10) > 0.0 || s.at(11, 10) > 0.0);
        assert!((0..s.bins).all(|b| s.at(b, 100) == 0.0));
    }

    #[test]
    fn tone_energy_lands_in_expected_bin() {
        let cfg = SpectrogramConfig {
            normalize: false,
            ..Default::default()
        };
        // 1 kHz at 16 kHz with n_fft 320 → bin 20 (50 Hz spacing)
        let s = spectrogram(&sine(1_000.0, 16_000, 1.0), &cfg).unwrap();
        let t = 50;
        let peak = (0..s.bins)
            .max_by(|&a, &b| s.at(a, t).total_cmp(&s.at(b, t)))
            .unwrap();
        assert_eq!(peak, 20);
    }

    #[test]
    fn normalised_output_is_standardised() {
        let s = spectrogram(&sine(300.0, 8_000, 0.5), &SpectrogramConfig::default()).unwrap();
        let (mean, std) = SpectNormalizer::moments(&s.data);
        assert!(mean.abs() < 1e-4);
        assert!((std - 1.0).abs() < 1e-3);
    }

    #[test]
    fn empty_audio_is_rejected() {
        let s = Samples {
            data: vec![],
            sample_rate: 16_000,
        };
        assert!(matches!(
            spectrogram(&s, &SpectrogramConfig::default()),
            Err(AudioError::Empty)
        ));
    }
}

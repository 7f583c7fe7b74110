//! Spectrogram standardisation.
//!
//! The networks expect every input spectrogram to have zero mean and unit
//! variance *over the whole matrix*.  The standard deviation is the
//! unbiased (`n - 1`) estimate; a constant matrix (std = 0) is left as is
//! so silence does not turn into NaNs.

/// Stateless helper for whole-matrix standardisation.
pub struct SpectNormalizer;

impl SpectNormalizer {
    /// `(mean, unbiased std)` of `values`; std is 0 for fewer than two values.
    pub fn moments(values: &[f32]) -> (f32, f32) {
        let n = values.len();
        if n < 2 {
            return (values.first().copied().unwrap_or(0.0), 0.0);
        }
        // accumulate in f64: 16k cells of log-magnitudes lose precision in f32
        let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;
        let var = values
            .iter()
            .map(|&v| {
                let d = f64::from(v) - mean;
                d * d
            })
            .sum::<f64>()
            / (n - 1) as f64;
        (mean as f32, var.sqrt() as f32)
    }

    /// In-place `(x - mean) / std`.
    pub fn normalize(values: &mut [f32]) {
        let (mean, std) = Self::moments(values);
        if std == 0.0 {
            return;
        }
        let inv = 1.0 / std;
        for v in values.iter_mut() {
            *v = (*v - mean) * inv;
        }
    }
}

/* --------------------------------------------------------------------- */
/*  Unit-tests                                                           */

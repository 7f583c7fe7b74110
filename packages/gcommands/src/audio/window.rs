use std::f32::consts::PI;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// STFT analysis window.
///
/// All windows are *periodic* (the DFT-even variant), which is what a
/// spectral analysis front-end wants: `n` points of an `n + 1` point
/// symmetric window with the last sample dropped.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, EnumString, IntoStaticStr, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Window {
    #[default]
    Hamming,
    Hann,
    Blackman,
    Bartlett,
}

impl Window {
    /// Window coefficients for an `n`-point frame.
    pub fn coefficients(self, n: usize) -> Vec<f32> {
        let len = n as f32;
        (0..n)
            .map(|i| {
                let x = i as f32 / len;
                match self {
                    Self::Hamming => 0.54 - 0.46 * (2.0 * PI * x).cos(),
                    Self::Hann => 0.5 - 0.5 * (2.0 * PI * x).cos(),
                    Self::Blackman => {
                        0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
                    }
                    Self::Bartlett => 1.0 - (2.0 * x - 1.0).abs(),
                }
            })
            .collect()
    }
}

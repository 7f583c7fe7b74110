//! Audio front-end: WAV decoding and log-magnitude spectrograms.

mod normalizer;
pub mod spectrogram;
pub mod wav;
pub mod window;

pub use normalizer::SpectNormalizer;
pub use spectrogram::{Spectrogram, SpectrogramConfig, spectrogram};
pub use wav::{Samples, load_wav, read_wav};
pub use window::Window;

/// Errors raised while turning an audio file into features.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("wav: {0}")]
    Wav(#[from] hound::Error),
    #[error("unsupported wav format: {bits}-bit {kind}")]
    Unsupported { bits: u16, kind: &'static str },
    #[error("audio contains no samples")]
    Empty,
    #[error("window of {0} samples is too short (need at least 2)")]
    WindowTooShort(usize),
    #[error("hop length rounds to 0 samples")]
    ZeroHop,
}

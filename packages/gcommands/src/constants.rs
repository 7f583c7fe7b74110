/// CHECKPOINT_VERSION is the on-disk version of the checkpoint file. Bump if the layout changes.
pub const CHECKPOINT_VERSION: u8 = 1;

/// DEFAULT_CHECKPOINT_PATH is where the best model is persisted unless configured otherwise.
pub const DEFAULT_CHECKPOINT_PATH: &str = "checkpoint/ckpt.cbor";

/// SPECT_DEFAULT_WINDOW_SIZE_S is the STFT window length in seconds.
pub const SPECT_DEFAULT_WINDOW_SIZE_S: f64 = 0.02;

/// SPECT_DEFAULT_WINDOW_STRIDE_S is the STFT hop length in seconds.
pub const SPECT_DEFAULT_WINDOW_STRIDE_S: f64 = 0.01;

/// SPECT_DEFAULT_MAX_LEN is the number of time frames every spectrogram is padded or cut to.
///
/// One second of audio at a 10 ms hop yields exactly 101 centred frames.
pub const SPECT_DEFAULT_MAX_LEN: usize = 101;

/// AUDIO_EXTENSIONS lists the file extensions picked up by dataset discovery.
pub const AUDIO_EXTENSIONS: [&str; 2] = ["wav", "WAV"];

/// BACKGROUND_NOISE_DIR is the Speech Commands folder holding long noise clips, never a label.
pub const BACKGROUND_NOISE_DIR: &str = "_background_noise_";

/// VALIDATION_LIST / TESTING_LIST name the split manifests shipped with the raw dataset.
pub const VALIDATION_LIST: &str = "validation_list.txt";
pub const TESTING_LIST: &str = "testing_list.txt";

/// LENET_HIDDEN is the width of the LeNet fully-connected layer.
pub(crate) const LENET_HIDDEN: usize = 1000;

/// LENET_CHANNELS is the number of feature maps of both LeNet convolutions.
pub(crate) const LENET_CHANNELS: usize = 20;

/// LENET_KERNEL is the LeNet convolution kernel size.
pub(crate) const LENET_KERNEL: usize = 5;

/// VGG_HIDDEN is the width of the VGG classifier hidden layer.
pub(crate) const VGG_HIDDEN: usize = 512;

/// DROPOUT_P is the drop probability used by LeNet in training mode.
pub(crate) const DROPOUT_P: f32 = 0.5;

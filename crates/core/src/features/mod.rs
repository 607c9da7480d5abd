pub mod chroma;
pub mod contrast;
pub mod mel;
pub mod stft;

use crate::decode::AudioClip;
use ndarray::{Array2, Axis};

pub const N_MFCC: usize = 13;
pub const N_CHROMA: usize = chroma::N_CHROMA;
pub const N_CONTRAST: usize = contrast::N_BANDS + 1;
pub const FEATURE_DIM: usize = N_MFCC + N_CHROMA + N_CONTRAST;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureError {
    #[error("audio contains no samples")]
    EmptySignal,
    #[error("sample rate must be > 0")]
    ZeroSampleRate,
    #[error("frequency band exceeds Nyquist at {sample_rate} Hz; spectral contrast needs a sample rate above 12800 Hz")]
    BandExceedsNyquist { sample_rate: u32 },
    #[error("spectral contrast band {band} contains no frequency bins")]
    EmptyBand { band: usize },
}

/// Time-averaged MFCC, chroma and spectral-contrast values, in that order.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn mfcc(&self) -> &[f64] {
        &self.0[..N_MFCC.min(self.0.len())]
    }

    pub fn chroma(&self) -> &[f64] {
        let end = (N_MFCC + N_CHROMA).min(self.0.len());
        &self.0[N_MFCC.min(end)..end]
    }

    pub fn contrast(&self) -> &[f64] {
        &self.0[(N_MFCC + N_CHROMA).min(self.0.len())..]
    }
}

/// Frame parameters shared by every transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureExtractor {
    pub n_fft: usize,
    pub hop_length: usize,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self {
            n_fft: stft::N_FFT,
            hop_length: stft::HOP_LENGTH,
        }
    }
}

impl FeatureExtractor {
    pub fn extract(&self, clip: &AudioClip) -> Result<FeatureVector, FeatureError> {
        if clip.sample_rate == 0 {
            return Err(FeatureError::ZeroSampleRate);
        }
        if clip.samples.is_empty() {
            return Err(FeatureError::EmptySignal);
        }
        let sr = clip.sample_rate;

        let magnitude = stft::stft_magnitude(&clip.samples, self.n_fft, self.hop_length);
        let power = magnitude.mapv(|m| m * m);

        let mfcc = mel::mfcc(&power, sr, self.n_fft, N_MFCC);
        let chroma = chroma::chroma_stft(&power, sr, self.n_fft);
        let contrast = contrast::spectral_contrast(&magnitude, sr, self.n_fft)?;

        let mut values = Vec::with_capacity(FEATURE_DIM);
        for m in [&mfcc, &chroma, &contrast] {
            values.extend(frame_means(m));
        }

        tracing::trace!(frames = magnitude.ncols(), dim = values.len(), "extracted features");
        Ok(FeatureVector(values))
    }
}

/// Mean of every row across frames.
fn frame_means(m: &Array2<f64>) -> Vec<f64> {
    match m.mean_axis(Axis(1)) {
        Some(means) => means.to_vec(),
        None => vec![0.0; m.nrows()],
    }
}

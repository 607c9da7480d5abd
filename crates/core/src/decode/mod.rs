mod fallback;
#[cfg(feature = "ffmpeg")]
mod ffmpeg;
mod native;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use fallback::FallbackDecoder;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegDecoder;
pub use native::SymphoniaDecoder;

/// Mono PCM decoded from an uploaded file, at the file's native sample rate.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AudioClip {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl AudioClip {
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    pub fn duration(&self) -> Duration {
        duration_from_samples(self.sample_rate, self.samples.len())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported audio format: {0}")]
    Unsupported(String),

    #[error("corrupt audio stream: {0}")]
    Corrupt(String),

    #[error("no audio track found")]
    NoAudioTrack,

    #[error("audio track has no sample rate")]
    MissingSampleRate,

    #[error("decoded audio contains no samples")]
    Empty,

    #[error("ffmpeg unavailable: {0}")]
    FfmpegUnavailable(String),

    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),

    #[error("invalid pcm output: {0}")]
    InvalidPcm(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

pub trait AudioDecoder: Send + Sync {
    fn decode_file(&self, path: PathBuf) -> BoxFuture<'_, Result<AudioClip>>;
}

#[derive(Clone)]
pub struct Decoder {
    inner: Arc<dyn AudioDecoder>,
}

impl Decoder {
    pub fn new(inner: Arc<dyn AudioDecoder>) -> Self {
        Self { inner }
    }

    pub async fn decode_file(&self, path: &Path) -> Result<AudioClip> {
        self.inner.decode_file(path.to_path_buf()).await
    }
}

impl Default for Decoder {
    /// Symphonia alone, or symphonia with the ffmpeg fallback when that feature is on.
    fn default() -> Self {
        #[cfg(feature = "ffmpeg")]
        {
            Self::new(Arc::new(FallbackDecoder::new(
                SymphoniaDecoder,
                FfmpegDecoder,
            )))
        }
        #[cfg(not(feature = "ffmpeg"))]
        {
            Self::new(Arc::new(SymphoniaDecoder))
        }
    }
}

/// Averages interleaved frames down to one channel, appending to `out`.
pub fn downmix_interleaved(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0f32 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

pub fn duration_from_samples(sample_rate_hz: u32, samples: usize) -> Duration {
    if sample_rate_hz == 0 {
        return Duration::from_secs(0);
    }
    let micros = (u128::from(samples as u64) * 1_000_000u128) / u128::from(sample_rate_hz);
    Duration::from_micros(micros.min(u128::from(u64::MAX)) as u64)
}

use crate::decode::{AudioClip, AudioDecoder, DecodeError, Result};
use ffmpeg_sidecar::{download, paths::ffmpeg_path};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};

/// Decodes anything ffmpeg understands (m4a, webm, opus...) to mono f32 PCM
/// at the source's own sample rate.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegDecoder;

impl FfmpegDecoder {
    fn ensure_ffmpeg_available() -> Result<()> {
        download::auto_download().map_err(|e| DecodeError::FfmpegUnavailable(e.to_string()))
    }

    fn parse_f32le_mono(raw: &[u8]) -> Result<Vec<f32>> {
        if !raw.len().is_multiple_of(4usize) {
            return Err(DecodeError::InvalidPcm(format!(
                "f32le byte length must be multiple of 4, got {}",
                raw.len()
            )));
        }
        Ok(raw
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Rate of the first audio stream in the `Input #` section of ffmpeg's
    /// stream report, e.g. `Stream #0:0: Audio: aac (LC), 44100 Hz, mono, fltp`.
    fn parse_input_sample_rate(stderr: &str) -> Option<u32> {
        stderr
            .lines()
            .take_while(|l| !l.trim_start().starts_with("Output #"))
            .filter(|l| l.contains("Stream #") && l.contains("Audio:"))
            .find_map(|l| {
                l.split(',')
                    .find_map(|field| field.trim().strip_suffix(" Hz")?.trim().parse().ok())
            })
    }

    async fn decode_with_ffmpeg(path: &Path) -> Result<AudioClip> {
        // No -ar: output keeps the input rate, which the info log reports.
        let output = tokio::process::Command::new(ffmpeg_path())
            .args(["-hide_banner", "-nostdin", "-loglevel", "info", "-i"])
            .arg(path)
            .args([
                "-vn", "-sn", "-dn", "-ac", "1", "-f", "f32le", "-acodec", "pcm_f32le", "pipe:1",
            ])
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| DecodeError::FfmpegFailed(e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(DecodeError::FfmpegFailed(format!(
                "exit_code={:?} stderr={}",
                output.status.code(),
                last.trim()
            )));
        }

        let sample_rate =
            Self::parse_input_sample_rate(&stderr).ok_or(DecodeError::MissingSampleRate)?;
        let samples = Self::parse_f32le_mono(&output.stdout)?;
        if samples.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(AudioClip::new(sample_rate, samples))
    }
}

impl AudioDecoder for FfmpegDecoder {
    fn decode_file(&self, path: PathBuf) -> BoxFuture<'_, Result<AudioClip>> {
        async move {
            tokio::task::spawn_blocking(Self::ensure_ffmpeg_available)
                .await
                .map_err(|e| DecodeError::FfmpegUnavailable(e.to_string()))??;
            Self::decode_with_ffmpeg(&path).await
        }
        .boxed()
    }
}

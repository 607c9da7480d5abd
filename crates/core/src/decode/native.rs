use crate::decode::{downmix_interleaved, AudioClip, AudioDecoder, DecodeError, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

const LOG_TARGET: &str = "decode::symphonia";

/// Pure-Rust decoder for the containers symphonia ships (wav, flac, mp3, ogg, mkv).
#[derive(Clone, Copy, Debug, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn decode_path(path: &Path) -> Result<AudioClip> {
        let file = File::open(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(map_symphonia_error)?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or(DecodeError::MissingSampleRate)?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(map_symphonia_error)?;

        let mut samples = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(map_symphonia_error(e)),
            };
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    sample_buf.copy_interleaved_ref(decoded);
                    downmix_interleaved(sample_buf.samples(), spec.channels.count(), &mut samples);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::warn!(target: LOG_TARGET, error = %e, "skipping undecodable packet");
                }
                Err(e) => return Err(map_symphonia_error(e)),
            }
        }

        if samples.is_empty() {
            return Err(DecodeError::Empty);
        }

        tracing::debug!(
            target: LOG_TARGET,
            sample_rate,
            samples = samples.len(),
            "decoded audio"
        );
        Ok(AudioClip::new(sample_rate, samples))
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode_file(&self, path: PathBuf) -> BoxFuture<'_, Result<AudioClip>> {
        async move {
            tokio::task::spawn_blocking(move || Self::decode_path(&path))
                .await
                .map_err(|e| DecodeError::Corrupt(format!("decoder task failed: {e}")))?
        }
        .boxed()
    }
}

fn map_symphonia_error(e: SymphoniaError) -> DecodeError {
    match e {
        SymphoniaError::Unsupported(what) => DecodeError::Unsupported(what.to_owned()),
        other => DecodeError::Corrupt(other.to_string()),
    }
}

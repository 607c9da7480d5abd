use crate::decode::{AudioClip, AudioDecoder, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::PathBuf;

const LOG_TARGET: &str = "decode::fallback";

/// Tries `primary`, and on any error hands the same file to `secondary`.
///
/// When both fail the primary's error is returned, since it usually names the
/// actual problem with the upload.
#[derive(Clone)]
pub struct FallbackDecoder<P, S>
where
    P: AudioDecoder,
    S: AudioDecoder,
{
    primary: P,
    secondary: S,
}

impl<P, S> FallbackDecoder<P, S>
where
    P: AudioDecoder,
    S: AudioDecoder,
{
    pub fn new(primary: P, secondary: S) -> Self {
        Self { primary, secondary }
    }
}

impl<P, S> AudioDecoder for FallbackDecoder<P, S>
where
    P: AudioDecoder,
    S: AudioDecoder,
{
    fn decode_file(&self, path: PathBuf) -> BoxFuture<'_, Result<AudioClip>> {
        async move {
            match self.primary.decode_file(path.clone()).await {
                Ok(clip) => Ok(clip),
                Err(primary_err) => {
                    tracing::debug!(
                        target: LOG_TARGET,
                        error = %primary_err,
                        "primary decoder failed, trying fallback"
                    );
                    match self.secondary.decode_file(path).await {
                        Ok(clip) => Ok(clip),
                        Err(e) => {
                            tracing::debug!(target: LOG_TARGET, error = %e, "fallback decoder failed");
                            Err(primary_err)
                        }
                    }
                }
            }
        }
        .boxed()
    }
}

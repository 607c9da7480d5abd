use crate::decode::{AudioClip, DecodeError, Decoder};
use crate::features::{FeatureError, FeatureExtractor};
use crate::model::{EmotionModel, ModelError, Prediction};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

const LOG_TARGET: &str = "service";

#[derive(thiserror::Error, Debug)]
pub enum PredictError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Task(#[from] tokio::task::JoinError),
}

/// Upload → decode → features → scaler → classifier → label.
#[derive(Clone)]
pub struct PredictionService {
    model: Arc<EmotionModel>,
    decoder: Decoder,
    extractor: FeatureExtractor,
    scratch_dir: PathBuf,
}

impl PredictionService {
    pub fn new(model: Arc<EmotionModel>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            model,
            decoder: Decoder::default(),
            extractor: FeatureExtractor::default(),
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Stores `bytes` under the scratch directory for the duration of the call
    /// and returns the predicted label. The stored file is removed on every path.
    pub async fn predict_upload(
        &self,
        file_name: &str,
        bytes: Bytes,
    ) -> Result<Prediction, PredictError> {
        let started = Instant::now();
        tokio::fs::create_dir_all(&self.scratch_dir).await?;

        let scratch = ScratchFile::new(&self.scratch_dir, file_name);
        let decoded = self.store_and_decode(scratch.path(), &bytes).await;
        scratch.remove().await;
        let clip = decoded?;

        tracing::debug!(
            target: LOG_TARGET,
            sample_rate = clip.sample_rate,
            duration_ms = clip.duration().as_millis() as u64,
            "decoded upload"
        );

        let model = Arc::clone(&self.model);
        let extractor = self.extractor;
        let prediction = tokio::task::spawn_blocking(move || -> Result<_, PredictError> {
            let features = extractor.extract(&clip)?;
            Ok(model.predict(features.as_slice())?)
        })
        .await??;

        tracing::info!(
            target: LOG_TARGET,
            label = %prediction.label,
            class_index = prediction.class_index,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "prediction complete"
        );
        tracing::debug!(
            target: LOG_TARGET,
            probabilities = ?prediction.probabilities,
            "class probabilities"
        );
        Ok(prediction)
    }

    async fn store_and_decode(&self, path: &Path, bytes: &[u8]) -> Result<AudioClip, PredictError> {
        tokio::fs::write(path, bytes).await?;
        Ok(self.decoder.decode_file(path).await?)
    }
}

/// A per-request file in the scratch directory. [`ScratchFile::remove`] deletes
/// it off the runtime threads; dropping an unremoved guard (a cancelled
/// request) deletes it synchronously.
struct ScratchFile {
    path: PathBuf,
    removed: bool,
}

impl ScratchFile {
    fn new(dir: &Path, file_name: &str) -> Self {
        let name = format!("{:016x}-{}", rand::random::<u64>(), upload_basename(file_name));
        Self {
            path: dir.join(name),
            removed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn remove(mut self) {
        self.removed = true;
        log_removal(&self.path, tokio::fs::remove_file(&self.path).await);
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.removed {
            log_removal(&self.path, std::fs::remove_file(&self.path));
        }
    }
}

fn log_removal(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            target: LOG_TARGET,
            path = %path.display(),
            error = %e,
            "failed to remove scratch file"
        ),
    }
}

/// Last path component of a client-supplied name, so uploads cannot escape
/// the scratch directory. Keeps the extension for the container probe.
fn upload_basename(file_name: &str) -> &str {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        "upload"
    } else {
        base
    }
}

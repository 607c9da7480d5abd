mod classifier;
mod labels;
mod scaler;

use crate::config::ArtifactPaths;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub use classifier::{argmax, Activation, Classifier, DenseLayer};
pub use labels::LabelEncoder;
pub use scaler::StandardScaler;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("{stage} expected {expected} features, got {actual}")]
    ShapeMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("classifier produced a non-finite output")]
    NonFiniteOutput,
    #[error("class index {index} is out of range for {classes} labels")]
    UnknownClass { index: usize, classes: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum ArtifactError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid artifact: {0}")]
    Invalid(String),
    #[error("{path}: {source}")]
    InvalidFile {
        path: PathBuf,
        #[source]
        source: Box<ArtifactError>,
    },
}

/// Outcome of one forward pass.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub class_index: usize,
    pub probabilities: Vec<f32>,
}

/// Scaler, classifier and label mapping, loaded together and never mutated.
#[derive(Clone, Debug)]
pub struct EmotionModel {
    scaler: StandardScaler,
    classifier: Classifier,
    labels: LabelEncoder,
}

impl EmotionModel {
    pub fn new(scaler: StandardScaler, classifier: Classifier, labels: LabelEncoder) -> Self {
        Self {
            scaler,
            classifier,
            labels,
        }
    }

    /// Reads all three artifacts; any failure here is fatal for the service.
    pub fn load(paths: &ArtifactPaths) -> Result<Self, ArtifactError> {
        let classifier: Classifier = load_json::<classifier::ClassifierFile, _>(&paths.classifier)?;
        let scaler: StandardScaler = load_json::<scaler::ScalerFile, _>(&paths.scaler)?;
        let labels: LabelEncoder = load_json::<labels::LabelsFile, _>(&paths.labels)?;
        Ok(Self::new(scaler, classifier, labels))
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn labels(&self) -> &LabelEncoder {
        &self.labels
    }

    pub fn predict(&self, features: &[f64]) -> Result<Prediction, ModelError> {
        let scaled = self.scaler.transform(features)?;
        let probabilities = self.classifier.predict(&scaled)?;
        let class_index = argmax(&probabilities).ok_or(ModelError::ShapeMismatch {
            stage: "classifier output",
            expected: self.labels.len(),
            actual: 0,
        })?;
        let label = self.labels.inverse_transform(class_index)?.to_owned();
        Ok(Prediction {
            label,
            class_index,
            probabilities,
        })
    }
}

fn load_json<F, T>(path: &Path) -> Result<T, ArtifactError>
where
    F: DeserializeOwned,
    T: TryFrom<F, Error = ArtifactError>,
{
    let raw = std::fs::read(path).map_err(|source| ArtifactError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file: F = serde_json::from_slice(&raw).map_err(|source| ArtifactError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    T::try_from(file).map_err(|e| ArtifactError::InvalidFile {
        path: path.to_path_buf(),
        source: Box::new(e),
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_DIM;

    #[test]
    fn loads_artifact_set_and_predicts_known_label() {
        let dir = tempfile::tempdir().unwrap();
        let model = EmotionModel::load(&fixtures::write_artifacts(dir.path())).unwrap();
        assert_eq!(model.classifier().input_dim(), FEATURE_DIM);
        assert_eq!(model.scaler().dim(), FEATURE_DIM);

        let features: Vec<f64> = (0..FEATURE_DIM).map(|i| i as f64 - 16.0).collect();
        let p = model.predict(&features).unwrap();
        assert!(fixtures::LABELS.contains(&p.label.as_str()));
        assert_eq!(p.probabilities.len(), fixtures::LABELS.len());
        assert_eq!(model.predict(&features).unwrap(), p);
    }

    #[test]
    fn missing_artifact_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EmotionModel::load(&ArtifactPaths::in_dir(dir.path())).unwrap_err();
        assert!(matches!(err, ArtifactError::Read { .. }));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fixtures::write_artifacts(dir.path());
        std::fs::write(&paths.scaler, "{\"mean\": [1.0]").unwrap();
        let err = EmotionModel::load(&paths).unwrap_err();
        assert!(matches!(err, ArtifactError::Parse { .. }));
    }

    #[test]
    fn invalid_contents_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = fixtures::write_artifacts(dir.path());
        std::fs::write(&paths.labels, r#"{"classes": ["sad", "sad"]}"#).unwrap();
        let err = EmotionModel::load(&paths).unwrap_err();
        assert!(err.to_string().contains("label_encoder.json"));
    }

    #[test]
    fn label_count_smaller_than_outputs_surfaces_at_predict() {
        use ndarray::{array, Array2};

        let always_second = DenseLayer::new(
            Array2::zeros((2, 2)),
            array![0.0, 5.0],
            Activation::Softmax,
        )
        .unwrap();
        let model = EmotionModel::new(
            StandardScaler::new(vec![0.0; 2], vec![1.0; 2]).unwrap(),
            Classifier::new(vec![always_second]).unwrap(),
            LabelEncoder::new(vec!["only".to_owned()]).unwrap(),
        );
        let err = model.predict(&[0.5, 0.5]).unwrap_err();
        assert_eq!(err, ModelError::UnknownClass { index: 1, classes: 1 });
    }

    #[test]
    fn feature_dimension_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let model = EmotionModel::load(&fixtures::write_artifacts(dir.path())).unwrap();
        let err = model.predict(&[0.0; 10]).unwrap_err();
        assert!(err.to_string().contains("expected 32"));
    }
}

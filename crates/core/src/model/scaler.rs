use crate::model::{ArtifactError, ModelError};
use serde::Deserialize;

/// Per-dimension standardization fitted at training time.
#[derive(Clone, Debug, PartialEq)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self, ArtifactError> {
        if mean.is_empty() {
            return Err(ArtifactError::Invalid("scaler has no dimensions".to_owned()));
        }
        if mean.len() != scale.len() {
            return Err(ArtifactError::Invalid(format!(
                "scaler mean has {} values but scale has {}",
                mean.len(),
                scale.len()
            )));
        }
        if let Some(i) = scale.iter().position(|s| !s.is_finite() || *s == 0.0) {
            return Err(ArtifactError::Invalid(format!(
                "scaler scale[{i}] must be finite and non-zero"
            )));
        }
        if mean.iter().any(|m| !m.is_finite()) {
            return Err(ArtifactError::Invalid("scaler mean must be finite".to_owned()));
        }
        Ok(Self { mean, scale })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, features: &[f64]) -> Result<Vec<f64>, ModelError> {
        if features.len() != self.dim() {
            return Err(ModelError::ShapeMismatch {
                stage: "scaler",
                expected: self.dim(),
                actual: features.len(),
            });
        }
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }
}

#[derive(Deserialize)]
pub(crate) struct ScalerFile {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl TryFrom<ScalerFile> for StandardScaler {
    type Error = ArtifactError;

    fn try_from(file: ScalerFile) -> Result<Self, Self::Error> {
        Self::new(file.mean, file.scale)
    }
}

use crate::model::{ArtifactError, ModelError};
use serde::Deserialize;
use std::collections::HashSet;

/// Class index to emotion label, in the order the classifier was trained on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new(classes: Vec<String>) -> Result<Self, ArtifactError> {
        if classes.is_empty() {
            return Err(ArtifactError::Invalid("label encoder has no classes".to_owned()));
        }
        let mut seen = HashSet::with_capacity(classes.len());
        for c in &classes {
            if !seen.insert(c.as_str()) {
                return Err(ArtifactError::Invalid(format!("duplicate class label {c:?}")));
            }
        }
        Ok(Self { classes })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn inverse_transform(&self, index: usize) -> Result<&str, ModelError> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or(ModelError::UnknownClass {
                index,
                classes: self.classes.len(),
            })
    }
}

#[derive(Deserialize)]
pub(crate) struct LabelsFile {
    classes: Vec<String>,
}

impl TryFrom<LabelsFile> for LabelEncoder {
    type Error = ArtifactError;

    fn try_from(file: LabelsFile) -> Result<Self, Self::Error> {
        Self::new(file.classes)
    }
}

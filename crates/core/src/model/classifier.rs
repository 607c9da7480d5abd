use crate::model::{ArtifactError, ModelError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

impl Activation {
    fn apply(self, z: &mut Array1<f32>) {
        match self {
            Activation::Linear => {}
            Activation::Relu => z.mapv_inplace(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => z.mapv_inplace(f32::tanh),
            Activation::Softmax => {
                let max = z.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                z.mapv_inplace(|v| (v - max).exp());
                let sum = z.sum();
                if sum > 0.0 {
                    z.mapv_inplace(|v| v / sum);
                }
            }
        }
    }
}

/// One fully connected layer: `activation(x · weights + bias)`.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseLayer {
    weights: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

impl DenseLayer {
    /// `weights` is `[inputs, outputs]`.
    pub fn new(
        weights: Array2<f32>,
        bias: Array1<f32>,
        activation: Activation,
    ) -> Result<Self, ArtifactError> {
        if weights.ncols() != bias.len() {
            return Err(ArtifactError::Invalid(format!(
                "layer has {} outputs but {} biases",
                weights.ncols(),
                bias.len()
            )));
        }
        if weights.is_empty() {
            return Err(ArtifactError::Invalid("layer has no weights".to_owned()));
        }
        Ok(Self {
            weights,
            bias,
            activation,
        })
    }

    pub fn inputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn outputs(&self) -> usize {
        self.weights.ncols()
    }

    fn forward(&self, x: &Array1<f32>) -> Array1<f32> {
        let mut z = x.dot(&self.weights) + &self.bias;
        self.activation.apply(&mut z);
        z
    }
}

/// Feed-forward stack of dense layers; dropout is a no-op at inference and is
/// not represented.
#[derive(Clone, Debug, PartialEq)]
pub struct Classifier {
    layers: Vec<DenseLayer>,
}

impl Classifier {
    pub fn new(layers: Vec<DenseLayer>) -> Result<Self, ArtifactError> {
        if layers.is_empty() {
            return Err(ArtifactError::Invalid("classifier has no layers".to_owned()));
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].outputs() != pair[1].inputs() {
                return Err(ArtifactError::Invalid(format!(
                    "layer {i} emits {} values but layer {} expects {}",
                    pair[0].outputs(),
                    i + 1,
                    pair[1].inputs()
                )));
            }
        }
        Ok(Self { layers })
    }

    pub fn input_dim(&self) -> usize {
        self.layers[0].inputs()
    }

    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].outputs()
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Output activations of the last layer for a single sample.
    pub fn predict(&self, input: &[f64]) -> Result<Vec<f32>, ModelError> {
        if input.len() != self.input_dim() {
            return Err(ModelError::ShapeMismatch {
                stage: "classifier",
                expected: self.input_dim(),
                actual: input.len(),
            });
        }
        let mut x: Array1<f32> = input.iter().map(|&v| v as f32).collect();
        for layer in &self.layers {
            x = layer.forward(&x);
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFiniteOutput);
        }
        Ok(x.to_vec())
    }
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

#[derive(Deserialize)]
pub(crate) struct LayerFile {
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
    #[serde(default = "default_activation")]
    activation: Activation,
}

fn default_activation() -> Activation {
    Activation::Linear
}

#[derive(Deserialize)]
pub(crate) struct ClassifierFile {
    layers: Vec<LayerFile>,
}

impl TryFrom<LayerFile> for DenseLayer {
    type Error = ArtifactError;

    fn try_from(file: LayerFile) -> Result<Self, Self::Error> {
        let rows = file.weights.len();
        let cols = file.weights.first().map(Vec::len).unwrap_or(0);
        if file.weights.iter().any(|r| r.len() != cols) {
            return Err(ArtifactError::Invalid("ragged weight matrix".to_owned()));
        }
        let flat: Vec<f32> = file.weights.into_iter().flatten().collect();
        let weights = Array2::from_shape_vec((rows, cols), flat)
            .map_err(|e| ArtifactError::Invalid(e.to_string()))?;
        DenseLayer::new(weights, Array1::from(file.bias), file.activation)
    }
}

impl TryFrom<ClassifierFile> for Classifier {
    type Error = ArtifactError;

    fn try_from(file: ClassifierFile) -> Result<Self, Self::Error> {
        let layers = file
            .layers
            .into_iter()
            .map(DenseLayer::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Classifier::new(layers)
    }
}

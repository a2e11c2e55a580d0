use std::path::Path;

use log::info;

use crate::error::ModelError;
use crate::network::{InputType, Network};
use crate::preprocess::NormalizedImage;

/// A loaded image classification model.
///
/// Implementations must be deterministic for a given input and return
/// exactly `num_classes()` scores in class-index order; higher means more
/// likely. One instance is shared by every inference worker.
pub trait Classifier: Send + Sync {
    /// Number of scores `infer` returns.
    fn num_classes(&self) -> usize;

    /// Length of the input vector the model consumes.
    fn input_len(&self) -> usize;

    fn infer(&self, image: &NormalizedImage) -> Result<Vec<f64>, ModelError>;
}

/// [`Classifier`] backed by a dense [`Network`] loaded from JSON.
#[derive(Debug, Clone)]
pub struct NetworkClassifier {
    network: Network,
}

impl NetworkClassifier {
    /// Wraps a network after checking its shape.
    pub fn new(network: Network) -> Result<Self, ModelError> {
        network.validate().map_err(ModelError::Invalid)?;
        if let Some(input) = network.metadata.as_ref().and_then(|m| m.input_type.as_ref()) {
            if !matches!(input, InputType::ImageRgb { .. }) {
                return Err(ModelError::Invalid(format!(
                    "model declares {:?} input; only RGB image models can be served",
                    input
                )));
            }
        }
        Ok(NetworkClassifier { network })
    }

    /// Loads and validates a model artifact.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        let network = Network::load_json(&path_str)
            .map_err(|source| ModelError::Load { path: path_str.clone(), source })?;
        let classifier = NetworkClassifier::new(network)?;
        info!(
            "loaded model {} ({} layers, {} inputs, {} classes)",
            path_str,
            classifier.network.layers.len(),
            classifier.input_len(),
            classifier.num_classes()
        );
        Ok(classifier)
    }

    /// Input size declared in the model metadata, if any.
    pub fn declared_input_size(&self) -> Option<(u32, u32)> {
        match self.network.metadata.as_ref()?.input_type.as_ref()? {
            InputType::ImageRgb { width, height } => Some((*width, *height)),
            _ => None,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }
}

impl Classifier for NetworkClassifier {
    fn num_classes(&self) -> usize {
        self.network.output_size()
    }

    fn input_len(&self) -> usize {
        self.network.input_size()
    }

    fn infer(&self, image: &NormalizedImage) -> Result<Vec<f64>, ModelError> {
        let input = image.to_input_vector();
        if input.len() != self.input_len() {
            return Err(ModelError::InputSize { expected: self.input_len(), got: input.len() });
        }
        Ok(self.network.forward(&input))
    }
}

/// Checks a score vector returned by a model before it is ranked.
pub fn check_scores(scores: &[f64], expected: usize) -> Result<(), ModelError> {
    if scores.len() != expected {
        return Err(ModelError::Invalid(format!(
            "model returned {} scores, expected {}",
            scores.len(),
            expected
        )));
    }
    if let Some(i) = scores.iter().position(|s| !s.is_finite()) {
        return Err(ModelError::Invalid(format!("score for class {} is not finite", i)));
    }
    Ok(())
}

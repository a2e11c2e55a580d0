use crate::{activation::activation::ActivationFunction, layers::dense::Layer};
use crate::network::metadata::ModelMetadata;
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub layers: Vec<Layer>,
    /// Optional annotations; absent in older model files.
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}

impl Network {
    /// Builds a network from (size, input_size, activation) tuples.
    pub fn new(layer_specs: Vec<(usize, usize, ActivationFunction)>) -> Network {
        let layers = layer_specs.into_iter()
            .map(|(size, input_size, activation)| Layer::new(size, input_size, activation))
            .collect();
        Network { layers, metadata: None }
    }

    pub fn with_metadata(mut self, metadata: ModelMetadata) -> Network {
        self.metadata = Some(metadata);
        self
    }

    /// Width of the input vector, or 0 for an empty network.
    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.input_size())
    }

    /// Width of the output vector, or 0 for an empty network.
    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |l| l.size)
    }

    /// Verifies every layer's own shape and that each layer consumes what
    /// the previous one produces.
    pub fn validate(&self) -> Result<(), String> {
        if self.layers.is_empty() {
            return Err("network has no layers".into());
        }
        for (i, layer) in self.layers.iter().enumerate() {
            layer.check_shape().map_err(|e| format!("layer {}: {}", i, e))?;
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[1].input_size() != pair[0].size {
                return Err(format!(
                    "layer {} expects {} inputs but layer {} produces {}",
                    i + 1, pair[1].input_size(), i, pair[0].size
                ));
            }
        }
        Ok(())
    }

    /// Forward pass for one sample. Caller guarantees a validated network
    /// and `input.len() == input_size()`.
    pub fn forward(&self, input: &[f64]) -> Vec<f64> {
        let mut current = input.to_vec();
        for layer in &self.layers {
            current = layer.feed_from(&current);
        }
        current
    }

    /// Serializes the network weights to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    /// Deserializes a network from a JSON file previously written by `save_json`.
    pub fn load_json(path: &str) -> std::io::Result<Network> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_catches_layer_chain_mismatch() {
        let net = Network::new(vec![
            (4, 3, ActivationFunction::ReLU),
            (2, 5, ActivationFunction::Softmax),
        ]);
        let err = net.validate().unwrap_err();
        assert!(err.contains("layer 1 expects 5 inputs"), "{}", err);
    }

    #[test]
    fn forward_produces_output_width() {
        let net = Network::new(vec![
            (4, 3, ActivationFunction::ReLU),
            (2, 4, ActivationFunction::Softmax),
        ]);
        assert!(net.validate().is_ok());
        assert_eq!((net.input_size(), net.output_size()), (3, 2));
        assert_eq!(net.forward(&[0.1, 0.2, 0.3]).len(), 2);
    }

    #[test]
    fn json_round_trip_keeps_outputs() {
        let net = Network::new(vec![(3, 2, ActivationFunction::Softmax)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net.json");
        let path = path.to_str().unwrap();
        net.save_json(path).unwrap();
        let loaded = Network::load_json(path).unwrap();
        assert_eq!(net.forward(&[0.4, 0.6]), loaded.forward(&[0.4, 0.6]));
    }

    #[test]
    fn loads_models_without_metadata() {
        let json = r#"{"layers":[{"size":1,"weights":{"rows":1,"cols":1,"data":[[2.0]]},
            "biases":{"rows":1,"cols":1,"data":[[0.0]]},"activator":"Identity"}]}"#;
        let net: Network = serde_json::from_str(json).unwrap();
        assert!(net.metadata.is_none());
        assert_eq!(net.forward(&[1.5]), vec![3.0]);
    }
}

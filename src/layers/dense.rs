use serde::{Serialize, Deserialize};

use crate::{math::matrix::Matrix, activation::activation::ActivationFunction};

/// Fully connected layer: `a = activation(x · W + b)`.
///
/// `weights` has shape (input_size, size); `biases` has shape (1, size).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer{
    pub size: usize,
    pub weights: Matrix,
    pub biases: Matrix,
    pub activator: ActivationFunction
}

impl Layer {
    /// New layer with He-initialized weights and zero biases.
    pub fn new(size: usize, input_size: usize, activation: ActivationFunction) -> Layer {
        Layer {
            size,
            weights: Matrix::he(input_size, size),
            biases: Matrix::zeros(1, size),
            activator: activation
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.rows
    }

    /// Checks that weights and biases agree with `size` and with each other.
    pub fn check_shape(&self) -> Result<(), String> {
        if !self.weights.is_well_formed() || !self.biases.is_well_formed() {
            return Err("weight or bias data does not match its declared shape".into());
        }
        if self.weights.cols != self.size {
            return Err(format!("weights have {} columns, layer size is {}", self.weights.cols, self.size));
        }
        if self.biases.rows != 1 || self.biases.cols != self.size {
            return Err(format!(
                "biases are {}x{}, expected 1x{}",
                self.biases.rows, self.biases.cols, self.size
            ));
        }
        Ok(())
    }

    /// Forward pass for a single sample. Does not mutate the layer, so a
    /// loaded network can be shared between threads.
    pub fn feed_from(&self, input: &[f64]) -> Vec<f64> {
        let mut z = self.weights.left_mul(input);
        for (zj, bj) in z.iter_mut().zip(self.biases.data[0].iter()) {
            *zj += bj;
        }
        self.activator.apply(&mut z);
        z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_from_applies_weights_bias_and_activation() {
        let layer = Layer {
            size: 2,
            weights: Matrix::from_data(vec![vec![1.0, -1.0], vec![2.0, 0.0]]),
            biases: Matrix::from_data(vec![vec![0.5, 0.0]]),
            activator: ActivationFunction::ReLU,
        };
        // z = [1*1 + 1*2 + 0.5, -1 + 0] = [3.5, -1] -> relu -> [3.5, 0]
        assert_eq!(layer.feed_from(&[1.0, 1.0]), vec![3.5, 0.0]);
    }

    #[test]
    fn new_layer_passes_shape_check() {
        let layer = Layer::new(3, 5, ActivationFunction::Identity);
        assert_eq!(layer.input_size(), 5);
        assert!(layer.check_shape().is_ok());
    }

    #[test]
    fn shape_check_rejects_bias_mismatch() {
        let mut layer = Layer::new(3, 2, ActivationFunction::Identity);
        layer.biases = Matrix::zeros(1, 4);
        assert!(layer.check_shape().is_err());
    }
}

use rand::prelude::*;
use serde::{Serialize, Deserialize};
use std::f64::consts::PI;

/// Dense row-major matrix, the storage format of layer weights and biases
/// inside a saved model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix{
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<Vec<f64>>
}

impl Matrix{
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix{
            rows,
            cols,
            data: vec![vec![0.0; cols]; rows]
        }
    }

    /// Samples a single value from N(0, 1) using the Box-Muller transform.
    fn sample_standard_normal(rng: &mut ThreadRng) -> f64 {
        // Both draws in (0, 1] to avoid log(0).
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = 1.0 - rng.gen::<f64>();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    /// He initialization: samples from N(0, sqrt(2 / rows)).
    ///
    /// Shape: (rows, cols). For a weight matrix `rows` is the fan-in.
    pub fn he(rows: usize, cols: usize) -> Matrix {
        let mut rng = rand::thread_rng();
        let std_dev = (2.0 / rows.max(1) as f64).sqrt();
        let mut res = Matrix::zeros(rows, cols);
        for i in 0..rows {
            for j in 0..cols {
                res.data[i][j] = Matrix::sample_standard_normal(&mut rng) * std_dev;
            }
        }
        res
    }

    pub fn from_data(data: Vec<Vec<f64>>) -> Matrix {
        Matrix {
            rows: data.len(),
            cols: data.first().map_or(0, |row| row.len()),
            data
        }
    }

    /// True when `data` actually has `rows` rows of `cols` values each.
    ///
    /// Deserialized matrices carry their shape separately from their data,
    /// so a hand-edited or truncated model file can disagree with itself.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.rows && self.data.iter().all(|row| row.len() == self.cols)
    }

    /// Row vector times matrix: returns `v · self`, of length `cols`.
    ///
    /// Caller guarantees `v.len() == rows`.
    pub fn left_mul(&self, v: &[f64]) -> Vec<f64> {
        debug_assert_eq!(v.len(), self.rows);
        let mut out = vec![0.0; self.cols];
        for (x, row) in v.iter().zip(self.data.iter()) {
            if *x == 0.0 {
                continue;
            }
            for (acc, w) in out.iter_mut().zip(row.iter()) {
                *acc += x * w;
            }
        }
        out
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix { rows: 0, cols: 0, data: vec![] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_mul_matches_hand_computation() {
        // [1 2] · [[1 0 2] [3 1 0]] = [7 2 2]
        let m = Matrix::from_data(vec![vec![1.0, 0.0, 2.0], vec![3.0, 1.0, 0.0]]);
        assert_eq!(m.left_mul(&[1.0, 2.0]), vec![7.0, 2.0, 2.0]);
    }

    #[test]
    fn he_has_requested_shape() {
        let m = Matrix::he(4, 3);
        assert_eq!((m.rows, m.cols), (4, 3));
        assert!(m.is_well_formed());
    }

    #[test]
    fn detects_ragged_data() {
        let mut m = Matrix::zeros(2, 2);
        m.data[1].pop();
        assert!(!m.is_well_formed());
    }
}

pub mod classifier;

pub use classifier::{check_scores, Classifier, NetworkClassifier};

pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod error;
pub mod config;
pub mod labels;
pub mod preprocess;
pub mod model;
pub mod predict;
pub mod server;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use layers::dense::Layer;
pub use network::{InputType, ModelMetadata, Network};
pub use error::{ClassificationError, StartupError};
pub use config::ServiceConfig;
pub use labels::ClassLabelTable;
pub use preprocess::{ImageNormalizer, NormalizedImage};
pub use model::{Classifier, NetworkClassifier};
pub use predict::{ClassificationResult, ClassifyResponse, ResultExtractor};
pub use server::{AppContext, ClassifyServer};

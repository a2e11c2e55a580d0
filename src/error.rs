//! Error types for every stage of the classifier.
//!
//! Each pipeline stage has its own error enum; the request handler folds
//! them into [`ClassificationError`], which knows its HTTP status. Anything
//! that goes wrong before the server starts listening is a [`StartupError`].

use thiserror::Error;

/// Failure while reading or parsing the class label file.
#[derive(Error, Debug)]
pub enum LabelError {
    #[error("could not read label file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("line {line}: duplicate class index {index}")]
    DuplicateIndex { line: usize, index: usize },

    #[error("class indices are not contiguous: index {missing} is missing (highest is {max})")]
    Gap { missing: usize, max: usize },

    #[error("label file contains no entries")]
    Empty,
}

/// Failure while loading a model or running it.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("could not load model {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid model: {0}")]
    Invalid(String),

    #[error("input has {got} values, model expects {expected}")]
    InputSize { expected: usize, got: usize },
}

/// Failure while turning uploaded bytes into a model input.
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("content type '{0}' is not an image type")]
    NotAnImage(String),

    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Failure while ranking scores and resolving labels.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("model returned an empty score vector")]
    Empty,

    #[error("class index {0} has no entry in the label table")]
    UnknownClassIndex(usize),
}

/// Why a single classification request failed.
#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("File must be an image (got content type '{0}')")]
    InvalidContentType(String),

    #[error("upload of {size} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("no file upload found: {0}")]
    MissingUpload(String),

    #[error("could not decode image: {0}")]
    DecodeError(String),

    #[error("inference failed: {0}")]
    InferenceError(String),

    #[error("class index {0} has no entry in the label table")]
    UnknownClassIndex(usize),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl ClassificationError {
    /// HTTP status code the error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            ClassificationError::InvalidContentType(_) => 400,
            ClassificationError::PayloadTooLarge { .. } => 413,
            ClassificationError::UnknownClassIndex(_) => 500,
            ClassificationError::MissingUpload(_)
            | ClassificationError::DecodeError(_)
            | ClassificationError::InferenceError(_)
            | ClassificationError::InternalError(_) => 422,
        }
    }

    /// Short, stable name of the variant for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ClassificationError::InvalidContentType(_) => "InvalidContentType",
            ClassificationError::PayloadTooLarge { .. } => "PayloadTooLarge",
            ClassificationError::MissingUpload(_) => "MissingUpload",
            ClassificationError::DecodeError(_) => "DecodeError",
            ClassificationError::InferenceError(_) => "InferenceError",
            ClassificationError::UnknownClassIndex(_) => "UnknownClassIndex",
            ClassificationError::InternalError(_) => "InternalError",
        }
    }
}

impl From<PreprocessError> for ClassificationError {
    fn from(e: PreprocessError) -> Self {
        match e {
            PreprocessError::NotAnImage(ct) => ClassificationError::InvalidContentType(ct),
            PreprocessError::Decode(inner) => ClassificationError::DecodeError(inner.to_string()),
        }
    }
}

impl From<ModelError> for ClassificationError {
    fn from(e: ModelError) -> Self {
        ClassificationError::InferenceError(e.to_string())
    }
}

impl From<ExtractError> for ClassificationError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::UnknownClassIndex(i) => ClassificationError::UnknownClassIndex(i),
            other => ClassificationError::InternalError(other.to_string()),
        }
    }
}

/// Fatal error before the service accepts traffic.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("label table: {0}")]
    Labels(#[from] LabelError),

    #[error("model: {0}")]
    Model(#[from] ModelError),

    #[error("model produces {model} classes but the label table has {labels}")]
    ClassCountMismatch { model: usize, labels: usize },

    #[error("could not start inference workers: {0}")]
    Workers(#[source] std::io::Error),

    #[error("could not bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
}

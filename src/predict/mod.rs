pub mod extract;

pub use extract::{
    top1, top_k, to_percent, ClassificationResult, ClassifyResponse, LabeledClass, RankedClass,
    ResultExtractor, TopKEntry,
};

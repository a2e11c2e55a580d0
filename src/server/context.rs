use std::path::PathBuf;
use std::sync::Arc;

use log::{info, warn};

use crate::config::ServiceConfig;
use crate::error::{ModelError, StartupError};
use crate::labels::ClassLabelTable;
use crate::model::{Classifier, NetworkClassifier};
use crate::predict::ResultExtractor;
use crate::preprocess::ImageNormalizer;
use crate::server::pool::InferencePool;

/// Everything a request needs, built once before the server starts and
/// shared read-only by every request thread.
pub struct AppContext {
    pub labels: ClassLabelTable,
    pub normalizer: ImageNormalizer,
    pub extractor: ResultExtractor,
    pub pool: InferencePool,
    pub num_classes: usize,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppContext {
    /// Loads the label table and model named in `config`.
    pub fn from_config(config: &ServiceConfig) -> Result<AppContext, StartupError> {
        config.validate()?;
        let labels = ClassLabelTable::load(&config.labels)?;
        let model = NetworkClassifier::load(&config.model)?;
        if let Some(names) = model.network().metadata.as_ref().and_then(|m| m.output_labels.as_ref()) {
            if names.len() != labels.len() {
                warn!(
                    "model metadata lists {} output labels, label file has {}; serving names from the label file",
                    names.len(),
                    labels.len()
                );
            }
        }
        let input_size = config.resolve_input_size(model.declared_input_size())?;
        AppContext::new(config, labels, Arc::new(model), input_size)
    }

    /// Assembles a context around an already-loaded model.
    ///
    /// Fails when the model and label table disagree on the class count or
    /// when the model cannot consume images of `input_size`.
    pub fn new(
        config: &ServiceConfig,
        labels: ClassLabelTable,
        model: Arc<dyn Classifier>,
        input_size: (u32, u32),
    ) -> Result<AppContext, StartupError> {
        let num_classes = model.num_classes();
        if num_classes != labels.len() {
            return Err(StartupError::ClassCountMismatch { model: num_classes, labels: labels.len() });
        }

        let normalizer = ImageNormalizer::new(input_size.0, input_size.1);
        if model.input_len() != normalizer.input_len() {
            return Err(StartupError::Model(ModelError::Invalid(format!(
                "model takes {} inputs but {}x{} RGB images give {}",
                model.input_len(),
                input_size.0,
                input_size.1,
                normalizer.input_len()
            ))));
        }

        let pool = InferencePool::new(
            model,
            config.inference_workers,
            config.inference_queue,
            config.inference_timeout(),
        )?;

        info!(
            "classifier ready: {} classes, input {}x{}, top-k {}, {} inference worker(s)",
            num_classes, input_size.0, input_size.1, config.top_k, config.inference_workers
        );

        Ok(AppContext {
            labels,
            normalizer,
            extractor: ResultExtractor::new(config.top_k),
            pool,
            num_classes,
            static_dir: config.static_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        })
    }
}

use crate::config::ServerConfig;
use crate::model_config::PreprocessorConfig;
use crate::oct_model::{Classifier, ModelError, OnnxClassifier};
use crate::prediction::{DistributionError, Prediction, PredictionVector};
use crate::preprocess::{self, PreprocessError};

/// Failure of a single classification request. The pipeline itself is left
/// untouched, so later requests are unaffected.
#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error("inference failed: {0}")]
    Inference(#[from] ModelError),
    #[error("inference failed: {0}")]
    Distribution(#[from] DistributionError),
}

/// A loaded classifier ready to serve requests.
///
/// There is no unloaded value of this type: a failed load returns an error
/// and the caller never gets a pipeline to serve from.
pub struct InferencePipeline<C> {
    classifier: C,
    config: PreprocessorConfig,
}

impl InferencePipeline<OnnxClassifier> {
    pub fn load(server_config: &ServerConfig) -> Result<Self, ModelError> {
        let model_dir = server_config.model_dir.as_path();
        let config = PreprocessorConfig::load(model_dir)?;
        let classifier = OnnxClassifier::load(model_dir, &config)?;
        Ok(Self::new(classifier, config))
    }
}

impl<C: Classifier> InferencePipeline<C> {
    pub fn new(classifier: C, config: PreprocessorConfig) -> Self {
        Self { classifier, config }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn config(&self) -> &PreprocessorConfig {
        &self.config
    }

    pub fn model_version(&self) -> &str {
        self.classifier.version()
    }

    /// decode -> resize -> rescale -> batch of one -> predict -> argmax.
    pub fn classify(
        &self,
        image_data: &[u8],
        content_type: &str,
        file_name: &str,
    ) -> Result<Prediction, RequestError> {
        preprocess::check_declared_type(content_type, file_name)?;
        let tensor = preprocess::preprocess(image_data, &self.config)?;
        let scores = self.classifier.predict(tensor.view())?;
        let probabilities = PredictionVector::try_from(scores)?;
        Ok(Prediction::from(probabilities))
    }
}

// src/oct_model.rs
use crate::model_config::PreprocessorConfig;
use ndarray::ArrayView4;
use ort::error::Error as OrtError;
use ort::inputs;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionOutputs};
use ort::tensor::TensorElementType;
use ort::value::ValueType;
use std::path::Path;

pub const MODEL_FILE: &str = "retina_oct_model.onnx";

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] OrtError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Invalid path for model files: {0}")]
    InvalidPath(String),
    #[error("Model is incompatible with the preprocessing pipeline: {0}")]
    IncompatibleModel(String),
    #[error("Unsupported resample filter code {0}")]
    InvalidResample(u32),
    #[error("Model output format unexpected")]
    OutputFormatUnexpected,
    #[error("Failed to convert model output")]
    OutputConversion,
}

/// Forward pass over one preprocessed `[1, H, W, 3]` tensor.
///
/// Implementations hold no per-request state, so a single instance is
/// shared read-only by every request.
pub trait Classifier: Send + Sync + 'static {
    fn predict(&self, tensor: ArrayView4<'_, f32>) -> Result<Vec<f32>, ModelError>;

    fn version(&self) -> &str;
}

pub struct OnnxClassifier {
    session: Session,
    input_name: String,
    output_name: String,
    apply_softmax: bool,
    version: String,
}

impl OnnxClassifier {
    pub fn load(model_dir: &Path, config: &PreprocessorConfig) -> Result<Self, ModelError> {
        let model_path = model_dir.join(MODEL_FILE);
        tracing::info!(path = %model_path.display(), "loading classifier");

        if !model_path.exists() {
            return Err(ModelError::InvalidPath(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        let session = SessionBuilder::new()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_cpus::get())?
            .commit_from_file(&model_path)?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| ModelError::IncompatibleModel("model declares no inputs".into()))?;
        check_input_type(&input.input_type, config)?;
        let input_name = input.name.clone();

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| ModelError::IncompatibleModel("model declares no outputs".into()))?;

        let version = config.model_version.clone().unwrap_or_else(|| {
            model_path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| MODEL_FILE.to_string())
        });

        tracing::info!(
            input = %input_name,
            output = %output_name,
            %version,
            "ONNX Runtime session created"
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            apply_softmax: config.apply_softmax,
            version,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, tensor: ArrayView4<'_, f32>) -> Result<Vec<f32>, ModelError> {
        let inputs = inputs![self.input_name.as_str() => tensor.into_dyn()]?;
        let outputs: SessionOutputs = self.session.run(inputs)?;

        let output_value = outputs
            .get(self.output_name.as_str())
            .ok_or(ModelError::OutputFormatUnexpected)?;

        // Shape is [1, num_classes].
        let scores_view = output_value.try_extract_tensor::<f32>()?;
        let scores: Vec<f32> = scores_view.iter().copied().collect();
        if scores.is_empty() {
            return Err(ModelError::OutputConversion);
        }

        if self.apply_softmax {
            Ok(softmax(&scores))
        } else {
            Ok(scores)
        }
    }

    fn version(&self) -> &str {
        &self.version
    }
}

fn check_input_type(input_type: &ValueType, config: &PreprocessorConfig) -> Result<(), ModelError> {
    let ValueType::Tensor { ty, dimensions, .. } = input_type else {
        return Err(ModelError::IncompatibleModel(format!(
            "first input is not a tensor: {input_type:?}"
        )));
    };
    let expected = [1, config.size.height as i64, config.size.width as i64, 3];
    check_tensor_input(*ty, dimensions, &expected)
}

/// The preprocessed batch is always f32, so only a float tensor of the same
/// rank and compatible dimensions can take it.
fn check_tensor_input(
    ty: TensorElementType,
    dimensions: &[i64],
    expected: &[i64],
) -> Result<(), ModelError> {
    if ty != TensorElementType::Float32 {
        return Err(ModelError::IncompatibleModel(format!(
            "input element type {ty:?} is not f32"
        )));
    }
    if !dims_compatible(dimensions, expected) {
        return Err(ModelError::IncompatibleModel(format!(
            "input dimensions {dimensions:?} do not accept {expected:?}"
        )));
    }
    Ok(())
}

/// Symbolic (negative) dimensions accept any size.
fn dims_compatible(declared: &[i64], expected: &[i64]) -> bool {
    declared.len() == expected.len()
        && declared
            .iter()
            .zip(expected)
            .all(|(&d, &e)| d < 0 || d == e)
}

pub fn softmax(data: &[f32]) -> Vec<f32> {
    let max_val = data.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exps: Vec<f32> = data.iter().map(|&x| (x - max_val).exp()).collect();
    let sum_exps: f32 = exps.iter().sum();
    exps.into_iter().map(|x| x / sum_exps).collect()
}

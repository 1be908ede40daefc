//! gRPC service that classifies retinal OCT scans into Normal, CNV, DME or
//! DRUSEN with a pre-trained ONNX model.

pub mod config;
pub mod labels;
pub mod model_config;
pub mod oct_model;
pub mod pipeline;
pub mod prediction;
pub mod preprocess;
pub mod service;

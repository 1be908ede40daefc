use crate::labels::OctClass;
use crate::oct_model::Classifier;
use crate::pipeline::{InferencePipeline, RequestError};
use crate::prediction::{Prediction, format_percent};
use crate::preprocess::{ACCEPTED_MEDIA_TYPES, PreprocessError};
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub mod retina_oct_service {
    tonic::include_proto!("retina_oct_service");
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("retina_oct_descriptor");
}

use retina_oct_service::{
    ClassScore, DescribeModelRequest, DescribeModelResponse, OctClassificationRequest,
    OctClassificationResponse, RetinaCondition,
    retina_oct_classifier_server::{RetinaOctClassifier, RetinaOctClassifierServer},
};

pub const DISCLAIMER: &str =
    "Model trained on dummy data. Replace with real OCT data for medical use.";

impl From<OctClass> for RetinaCondition {
    fn from(class: OctClass) -> Self {
        match class {
            OctClass::Normal => RetinaCondition::Normal,
            OctClass::Cnv => RetinaCondition::Cnv,
            OctClass::Dme => RetinaCondition::Dme,
            OctClass::Drusen => RetinaCondition::Drusen,
        }
    }
}

impl From<RequestError> for Status {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Preprocess(PreprocessError::Config(e)) => Status::internal(e.to_string()),
            RequestError::Preprocess(e) => Status::invalid_argument(e.to_string()),
            e @ (RequestError::Inference(_) | RequestError::Distribution(_)) => {
                Status::internal(e.to_string())
            }
        }
    }
}

pub struct RetinaOctService<C> {
    pipeline: Arc<InferencePipeline<C>>,
}

impl<C> Clone for RetinaOctService<C> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
        }
    }
}

impl<C: Classifier> RetinaOctService<C> {
    pub fn new(pipeline: InferencePipeline<C>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn into_server(self, max_image_bytes: usize) -> RetinaOctClassifierServer<Self> {
        RetinaOctClassifierServer::new(self).max_decoding_message_size(max_image_bytes)
    }

    fn to_response(
        &self,
        request_id: String,
        prediction: &Prediction,
    ) -> OctClassificationResponse {
        let breakdown = OctClass::ALL
            .into_iter()
            .map(|class| {
                let probability = prediction.probabilities.probability(class);
                ClassScore {
                    condition: RetinaCondition::from(class) as i32,
                    label: class.label().to_string(),
                    probability,
                    percentage_text: format_percent(probability),
                }
            })
            .collect();

        OctClassificationResponse {
            request_id,
            predicted_condition: RetinaCondition::from(prediction.class) as i32,
            predicted_label: prediction.label().to_string(),
            confidence: prediction.confidence(),
            confidence_text: prediction.confidence_text(),
            breakdown,
            report: prediction.render(),
            model_version: self.pipeline.model_version().to_string(),
            disclaimer: DISCLAIMER.to_string(),
        }
    }
}

#[tonic::async_trait]
impl<C: Classifier> RetinaOctClassifier for RetinaOctService<C> {
    async fn classify_oct(
        &self,
        request: Request<OctClassificationRequest>,
    ) -> Result<Response<OctClassificationResponse>, Status> {
        let OctClassificationRequest {
            request_id,
            image_data,
            file_name,
            content_type,
        } = request.into_inner();
        tracing::info!(%request_id, bytes = image_data.len(), %file_name, "classifying OCT scan");

        let pipeline = Arc::clone(&self.pipeline);
        let outcome = tokio::task::spawn_blocking(move || {
            pipeline.classify(&image_data, &content_type, &file_name)
        })
        .await
        .map_err(|e| Status::internal(format!("inference worker failed: {e}")))?;

        match outcome {
            Ok(prediction) => {
                tracing::info!(
                    %request_id,
                    label = prediction.label(),
                    confidence = %prediction.confidence_text(),
                    "classification complete"
                );
                Ok(Response::new(self.to_response(request_id, &prediction)))
            }
            Err(err) => {
                tracing::warn!(%request_id, error = %err, "classification failed");
                Err(err.into())
            }
        }
    }

    async fn describe_model(
        &self,
        _request: Request<DescribeModelRequest>,
    ) -> Result<Response<DescribeModelResponse>, Status> {
        let size = self.pipeline.config().size;
        Ok(Response::new(DescribeModelResponse {
            labels: OctClass::labels().map(str::to_string).collect(),
            input_width: size.width as u32,
            input_height: size.height as u32,
            input_channels: 3,
            accepted_media_types: ACCEPTED_MEDIA_TYPES.iter().map(|t| t.to_string()).collect(),
            model_version: self.pipeline.model_version().to_string(),
            disclaimer: DISCLAIMER.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::NUM_CLASSES;
    use crate::model_config::PreprocessorConfig;
    use crate::oct_model::ModelError;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use ndarray::ArrayView4;
    use std::io::Cursor;

    struct FixedClassifier(Vec<f32>);

    impl Classifier for FixedClassifier {
        fn predict(&self, _tensor: ArrayView4<'_, f32>) -> Result<Vec<f32>, ModelError> {
            Ok(self.0.clone())
        }

        fn version(&self) -> &str {
            "stub-v1"
        }
    }

    fn service(scores: &[f32]) -> RetinaOctService<FixedClassifier> {
        RetinaOctService::new(InferencePipeline::new(
            FixedClassifier(scores.to_vec()),
            PreprocessorConfig::default(),
        ))
    }

    fn gray_png() -> Vec<u8> {
        let img = GrayImage::from_pixel(224, 224, Luma([128]));
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn request(image_data: Vec<u8>) -> Request<OctClassificationRequest> {
        Request::new(OctClassificationRequest {
            request_id: "req-1".into(),
            image_data,
            file_name: "scan.png".into(),
            content_type: "image/png".into(),
        })
    }

    #[tokio::test]
    async fn classify_returns_full_breakdown() {
        let response = service(&[0.1, 0.1, 0.1, 0.7])
            .classify_oct(request(gray_png()))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.request_id, "req-1");
        assert_eq!(response.predicted_condition, RetinaCondition::Drusen as i32);
        assert_eq!(response.predicted_label, "DRUSEN");
        assert_eq!(response.confidence_text, "70.00%");
        assert_eq!(response.breakdown.len(), NUM_CLASSES);
        let labels: Vec<_> = response.breakdown.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["Normal", "CNV", "DME", "DRUSEN"]);
        assert_eq!(response.breakdown[0].percentage_text, "10.00%");
        assert!(response.report.starts_with("Prediction: DRUSEN\n"));
        assert_eq!(response.model_version, "stub-v1");
        assert_eq!(response.disclaimer, DISCLAIMER);
    }

    #[tokio::test]
    async fn undecodable_upload_is_invalid_argument() {
        let status = service(&[0.7, 0.1, 0.1, 0.1])
            .classify_oct(request(b"not an image".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn bad_model_output_is_internal() {
        let status = service(&[0.5, 0.5])
            .classify_oct(request(gray_png()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Internal);
    }

    #[tokio::test]
    async fn failed_request_does_not_poison_service() {
        let svc = service(&[0.7, 0.1, 0.1, 0.1]);
        assert!(svc.classify_oct(request(Vec::new())).await.is_err());
        let response = svc.classify_oct(request(gray_png())).await.unwrap().into_inner();
        assert_eq!(response.predicted_label, "Normal");
    }

    #[tokio::test]
    async fn describe_model_lists_labels_in_index_order() {
        let response = service(&[0.7, 0.1, 0.1, 0.1])
            .describe_model(Request::new(DescribeModelRequest {}))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.labels, ["Normal", "CNV", "DME", "DRUSEN"]);
        assert_eq!((response.input_width, response.input_height), (224, 224));
        assert_eq!(response.input_channels, 3);
        assert!(response.accepted_media_types.contains(&"image/png".to_string()));
    }
}

//! Amazon Rekognition label detection

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_rekognition::types::{Image, S3Object};
use aws_sdk_rekognition::Client;
use tracing::debug;

use super::aws::{classify_sdk_error, SdkFailure};
use super::{LabelService, LabelServiceError};
use crate::types::{Label, ObjectRef};

/// Service error code Rekognition returns for bytes it cannot decode
const INVALID_IMAGE_FORMAT: &str = "InvalidImageFormatException";

/// Rekognition-backed label detection (images are read straight from S3)
#[derive(Clone)]
pub struct RekognitionLabelService {
    client: Client,
}

impl std::fmt::Debug for RekognitionLabelService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RekognitionLabelService").finish()
    }
}

impl RekognitionLabelService {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        let builder = aws_sdk_rekognition::config::Builder::from(sdk_config);
        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl LabelService for RekognitionLabelService {
    async fn detect_labels(
        &self,
        object: &ObjectRef,
        max_labels: i32,
        min_confidence: f32,
    ) -> Result<Vec<Label>, LabelServiceError> {
        let image = Image::builder()
            .s3_object(
                S3Object::builder()
                    .bucket(&object.container)
                    .name(&object.key)
                    .build(),
            )
            .build();

        debug!(object = %object, max_labels, min_confidence, "DetectLabels");
        let response = self
            .client
            .detect_labels()
            .image(image)
            .max_labels(max_labels)
            .min_confidence(min_confidence)
            .send()
            .await
            .map_err(|e| label_error(classify_sdk_error(&e)))?;

        Ok(response
            .labels()
            .iter()
            .filter_map(|l| Some(Label::new(l.name()?, f64::from(l.confidence()?))))
            .collect())
    }
}

fn label_error(failure: SdkFailure) -> LabelServiceError {
    match failure {
        SdkFailure::Service { code, message } if code == INVALID_IMAGE_FORMAT => {
            LabelServiceError::UnsupportedFormat(message)
        }
        SdkFailure::Service { message, .. }
        | SdkFailure::Timeout(message)
        | SdkFailure::Dispatch(message)
        | SdkFailure::Construction(message)
        | SdkFailure::Response(message) => LabelServiceError::Service(message),
    }
}

//! Label detection
//!
//! Detection always runs with the same fixed parameters so results are
//! comparable across objects.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::services::{LabelService, LabelServiceError};
use crate::types::{Label, ObjectRef};

/// Maximum number of labels requested and kept
pub const MAX_LABELS: usize = 10;

/// Minimum confidence (percent) a label must reach
pub const MIN_CONFIDENCE: f32 = 70.0;

/// Detects labels in image objects
#[derive(Clone)]
pub struct LabelDetector {
    service: Arc<dyn LabelService>,
}

impl LabelDetector {
    pub fn new(service: Arc<dyn LabelService>) -> Self {
        Self { service }
    }

    /// Detect labels, ordered as returned by the service
    pub async fn detect(&self, object: &ObjectRef) -> PipelineResult<Vec<Label>> {
        debug!(container = %object.container, key = %object.key, "Detecting labels");

        let mut labels = self
            .service
            .detect_labels(object, MAX_LABELS as i32, MIN_CONFIDENCE)
            .await
            .map_err(|e| match e {
                LabelServiceError::UnsupportedFormat(message) => {
                    warn!(container = %object.container, key = %object.key, "Unsupported image format: {}", message);
                    PipelineError::UnsupportedFormat {
                        object: object.clone(),
                        message,
                    }
                }
                source => PipelineError::DetectionService {
                    object: object.clone(),
                    source,
                },
            })?;

        labels.truncate(MAX_LABELS);

        info!(
            container = %object.container,
            key = %object.key,
            count = labels.len(),
            "Detected labels"
        );
        for label in &labels {
            info!("{}: {}", label.name, label.confidence_percent());
        }

        Ok(labels)
    }
}

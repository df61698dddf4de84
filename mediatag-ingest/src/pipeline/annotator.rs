//! Object annotation
//!
//! Writes detected labels back onto the image object, first as user metadata
//! (`Cat: 93.46%`) and then as the object's tag set (`Cat = 93.46`). The two
//! writes are independent; if the tag write fails the metadata stays written
//! and a redelivered event overwrites both.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{AnnotationStep, PipelineError, PipelineResult};
use crate::services::ObjectStore;
use crate::types::{Label, ObjectRef, Tag};

/// Store limit on tags per object
pub const MAX_TAGS: usize = 10;

/// Metadata key for a label name: every whitespace run becomes `-`
pub fn normalize_metadata_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    let mut in_whitespace = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                key.push('-');
            }
            in_whitespace = true;
        } else {
            key.push(c);
            in_whitespace = false;
        }
    }
    key
}

/// Metadata entries for `labels` (one per label, percent-suffixed)
pub fn metadata_for(labels: &[Label]) -> BTreeMap<String, String> {
    labels
        .iter()
        .map(|l| (normalize_metadata_key(&l.name), l.confidence_percent()))
        .collect()
}

/// Tag set for `labels` (first `MAX_TAGS`, raw names, no percent sign)
pub fn tags_for(labels: &[Label]) -> Vec<Tag> {
    labels
        .iter()
        .take(MAX_TAGS)
        .map(|l| Tag::new(l.name.clone(), l.confidence_text()))
        .collect()
}

/// Writes labels onto objects
#[derive(Clone)]
pub struct ObjectAnnotator {
    store: Arc<dyn ObjectStore>,
}

impl ObjectAnnotator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Replace metadata, then replace tags. Returns the tag set written.
    pub async fn annotate(&self, object: &ObjectRef, labels: &[Label]) -> PipelineResult<Vec<Tag>> {
        let metadata = metadata_for(labels);
        self.store
            .replace_metadata(object, &metadata)
            .await
            .map_err(|source| PipelineError::AnnotationWrite {
                object: object.clone(),
                step: AnnotationStep::Metadata,
                source,
            })?;
        debug!(key = %object.key, entries = metadata.len(), "Metadata replaced");

        let tags = tags_for(labels);
        self.store
            .put_tags(object, &tags)
            .await
            .map_err(|source| PipelineError::AnnotationWrite {
                object: object.clone(),
                step: AnnotationStep::Tags,
                source,
            })?;

        info!(
            container = %object.container,
            key = %object.key,
            metadata = metadata.len(),
            tags = tags.len(),
            "Object annotated"
        );
        Ok(tags)
    }
}

//! Notification processing pipeline
//!
//! One notification in, one [`InvocationOutcome`] (or one [`PipelineError`])
//! out. The dispatcher resolves the event, classifies the object by its key
//! extension and routes it:
//!
//! - image created: detect → annotate → index
//! - image tag set replaced: re-index the stored tags
//! - primary object created: aggregate its group
//! - anything else: ignored
//!
//! Steps within one invocation run strictly in sequence and the first error
//! aborts. Invocations share nothing but the client handles.

pub mod aggregator;
pub mod annotator;
pub mod detector;
pub mod resolver;
pub mod tag_indexer;

pub use aggregator::{group_id_for, AggregateOutcome, GroupAggregator, SiblingOrder};
pub use annotator::{metadata_for, normalize_metadata_key, tags_for, ObjectAnnotator, MAX_TAGS};
pub use detector::{LabelDetector, MAX_LABELS, MIN_CONFIDENCE};
pub use resolver::{decode_key, resolve, resolve_bytes, ResolvedEvent};
pub use tag_indexer::{
    is_decimal, is_storable_number, record_id, TagIndexer, TagValuePolicy, MAX_SIGNIFICANT_DIGITS,
};

use mediatag_common::events::{EventKind, NotificationEvent};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::PipelineResult;
use crate::services::Clients;
use crate::types::{GroupAggregateRecord, Label, ObjectRef, TagRecord};

/// Pipeline behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Table receiving per-tag records
    pub tag_table: String,
    /// Table receiving per-group records
    pub group_table: String,
    pub tag_value_policy: TagValuePolicy,
    /// Add object size and last-modified to tag records
    pub include_object_stats: bool,
    pub sibling_order: SiblingOrder,
    /// Re-index an image's stored tags on `ObjectTagging:Put`
    pub reindex_on_tagging: bool,
    /// Lower-case extensions (no dot) treated as images
    pub image_extensions: Vec<String>,
    /// Extension of group-defining objects
    pub primary_extension: String,
    /// Extension of the images merged into a group
    pub companion_extension: String,
}

impl PipelineConfig {
    /// Defaults with both record kinds written to `table`
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            group_table: table.clone(),
            tag_table: table,
            tag_value_policy: TagValuePolicy::default(),
            include_object_stats: true,
            sibling_order: SiblingOrder::default(),
            reindex_on_tagging: true,
            image_extensions: vec!["png".to_string(), "jpg".to_string(), "jpeg".to_string()],
            primary_extension: "fbx".to_string(),
            companion_extension: "png".to_string(),
        }
    }
}

/// Whether the final segment of `key` ends with `.{extension}` (case-insensitive)
pub fn has_extension(key: &str, extension: &str) -> bool {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && ext.eq_ignore_ascii_case(extension),
        None => false,
    }
}

/// What a key's extension makes an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClass {
    Image,
    Primary,
    Other,
}

/// Result of one successful invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvocationOutcome {
    /// New image labelled, annotated and indexed
    ImageProcessed {
        object: ObjectRef,
        labels: Vec<Label>,
        records: Vec<TagRecord>,
    },
    /// Image tag set changed and was re-indexed
    TagsReindexed {
        object: ObjectRef,
        records: Vec<TagRecord>,
    },
    /// Group record written
    GroupAggregated {
        object: ObjectRef,
        record: GroupAggregateRecord,
    },
    /// Primary object outside any folder
    GroupSkipped { object: ObjectRef, reason: String },
    /// Event needs no work
    Ignored {
        object: ObjectRef,
        event: String,
        reason: String,
    },
}

/// The notification pipeline
#[derive(Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    detector: LabelDetector,
    annotator: ObjectAnnotator,
    indexer: TagIndexer,
    aggregator: GroupAggregator,
}

impl Pipeline {
    pub fn new(clients: &Clients, config: PipelineConfig) -> Self {
        Self {
            detector: LabelDetector::new(clients.labels.clone()),
            annotator: ObjectAnnotator::new(clients.store.clone()),
            indexer: TagIndexer::new(clients.store.clone(), clients.index.clone(), &config),
            aggregator: GroupAggregator::new(clients.store.clone(), clients.index.clone(), &config),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Handle one raw JSON notification payload
    pub async fn handle_event(&self, payload: &[u8]) -> PipelineResult<InvocationOutcome> {
        let span = info_span!("invocation", id = %Uuid::new_v4());
        async move {
            let resolved = resolve_bytes(payload)?;
            self.dispatch(resolved).await
        }
        .instrument(span)
        .await
    }

    /// Handle an already parsed notification
    pub async fn handle_notification(
        &self,
        event: &NotificationEvent,
    ) -> PipelineResult<InvocationOutcome> {
        let span = info_span!("invocation", id = %Uuid::new_v4());
        async move {
            let resolved = resolve(event)?;
            self.dispatch(resolved).await
        }
        .instrument(span)
        .await
    }

    pub fn classify(&self, object: &ObjectRef) -> ObjectClass {
        if self.aggregator.is_primary(object) {
            ObjectClass::Primary
        } else if self
            .config
            .image_extensions
            .iter()
            .any(|ext| has_extension(&object.key, ext))
        {
            ObjectClass::Image
        } else {
            ObjectClass::Other
        }
    }

    async fn dispatch(&self, resolved: ResolvedEvent) -> PipelineResult<InvocationOutcome> {
        let ResolvedEvent { object, kind } = resolved;
        let class = self.classify(&object);
        info!(
            container = %object.container,
            key = %object.key,
            event = %kind,
            class = ?class,
            "Processing notification"
        );

        match (class, &kind) {
            // Also skips images a user copies in server-side; only Put/Post uploads are labelled
            (ObjectClass::Image, EventKind::CreatedCopy) => Ok(ignored(
                object,
                &kind,
                "copy events are produced by metadata write-back",
            )),
            (ObjectClass::Image, k) if k.is_created() => self.process_image(object).await,
            (ObjectClass::Image, EventKind::TaggingPut) if self.config.reindex_on_tagging => {
                let records = self.indexer.index_stored_tags(&object).await?;
                Ok(InvocationOutcome::TagsReindexed { object, records })
            }
            (ObjectClass::Primary, k) if k.is_created() => self.process_primary(object).await,
            (_, EventKind::Removed) => Ok(ignored(object, &kind, "removals are not retracted")),
            _ => Ok(ignored(object, &kind, "no handler for this object and event")),
        }
    }

    /// Detect, annotate and index a new image
    pub async fn process_image(&self, object: ObjectRef) -> PipelineResult<InvocationOutcome> {
        let labels = self.detector.detect(&object).await?;
        let tags = self.annotator.annotate(&object, &labels).await?;
        let records = self.indexer.index_tags(&object, &tags).await?;

        Ok(InvocationOutcome::ImageProcessed {
            object,
            labels,
            records,
        })
    }

    /// Aggregate the group a primary object defines
    pub async fn process_primary(&self, object: ObjectRef) -> PipelineResult<InvocationOutcome> {
        match self.aggregator.aggregate(&object).await? {
            AggregateOutcome::Persisted { record } => {
                Ok(InvocationOutcome::GroupAggregated { object, record })
            }
            AggregateOutcome::Skipped { reason } => {
                Ok(InvocationOutcome::GroupSkipped { object, reason })
            }
        }
    }
}

fn ignored(object: ObjectRef, kind: &EventKind, reason: &str) -> InvocationOutcome {
    warn!(key = %object.key, event = %kind, "Event ignored: {}", reason);
    InvocationOutcome::Ignored {
        object,
        event: kind.to_string(),
        reason: reason.to_string(),
    }
}

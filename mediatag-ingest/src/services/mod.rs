//! External collaborators
//!
//! The pipeline reaches the object store, the label detection service and the
//! key-value index only through the traits below. Production implementations
//! talk to S3, Rekognition and DynamoDB; `SqliteIndex` is a local index backend.

pub mod aws;
pub mod dynamodb_index;
pub mod rekognition;
pub mod s3_store;
pub mod sqlite_index;

pub use dynamodb_index::DynamoDbIndex;
pub use rekognition::RekognitionLabelService;
pub use s3_store::S3ObjectStore;
pub use sqlite_index::SqliteIndex;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::{IndexBackend, IngestConfig};
use crate::types::{IndexItem, Label, ObjectHead, ObjectRef, Tag};

// ============================================================================
// Errors
// ============================================================================

/// Object store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Store service error: {0}")]
    Service(String),
}

/// Label detection errors
#[derive(Debug, Error)]
pub enum LabelServiceError {
    /// The object is not a decodable image; retrying cannot help
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Detection service error: {0}")]
    Service(String),
}

/// Key-value index errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index service error: {0}")]
    Service(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ============================================================================
// Traits
// ============================================================================

/// Object store operations consumed by the pipeline
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Current tag set of an object, in store order
    async fn get_tags(&self, object: &ObjectRef) -> Result<Vec<Tag>, StoreError>;

    /// Size and last-modified time of an object
    async fn head(&self, object: &ObjectRef) -> Result<ObjectHead, StoreError>;

    /// Every key in `container` starting with `prefix`, in listing order
    async fn list_keys(&self, container: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Replace the object's tag set
    async fn put_tags(&self, object: &ObjectRef, tags: &[Tag]) -> Result<(), StoreError>;

    /// Replace the object's user metadata, leaving its bytes unchanged
    async fn replace_metadata(
        &self,
        object: &ObjectRef,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), StoreError>;

    /// Public URL of an object
    fn object_url(&self, object: &ObjectRef) -> String;
}

/// Label detection capability
#[async_trait]
pub trait LabelService: Send + Sync {
    /// Detect labels in an image object, highest relevance first
    async fn detect_labels(
        &self,
        object: &ObjectRef,
        max_labels: i32,
        min_confidence: f32,
    ) -> Result<Vec<Label>, LabelServiceError>;
}

/// Key-value index write API (upsert by item id)
#[async_trait]
pub trait KeyValueIndex: Send + Sync {
    async fn put_item(&self, table: &str, item: &IndexItem) -> Result<(), IndexError>;
}

// ============================================================================
// Process-wide client handles
// ============================================================================

/// Client handles created once at startup and shared by every invocation
#[derive(Clone)]
pub struct Clients {
    pub store: Arc<dyn ObjectStore>,
    pub labels: Arc<dyn LabelService>,
    pub index: Arc<dyn KeyValueIndex>,
}

impl Clients {
    /// Build the production clients from resolved configuration
    pub async fn connect(config: &IngestConfig) -> mediatag_common::Result<Self> {
        let sdk_config = aws::load_sdk_config(&config.aws).await;

        let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(&sdk_config, &config.aws));
        let labels: Arc<dyn LabelService> =
            Arc::new(RekognitionLabelService::new(&sdk_config));

        let index: Arc<dyn KeyValueIndex> = match &config.index.backend {
            IndexBackend::DynamoDb => {
                info!(region = %config.index.region, "Using DynamoDB index");
                Arc::new(DynamoDbIndex::new(&sdk_config, &config.index))
            }
            IndexBackend::Sqlite { path } => {
                info!(path = %path.display(), "Using SQLite index");
                let pool = mediatag_common::db::init_index_database(path).await?;
                Arc::new(SqliteIndex::new(pool))
            }
        };

        Ok(Self {
            store,
            labels,
            index,
        })
    }
}

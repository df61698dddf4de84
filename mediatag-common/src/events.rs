//! Object store notification types
//!
//! Mirrors the JSON document an S3-compatible store delivers when an object
//! changes. Only the fields the pipeline reads are modelled; unknown fields
//! are ignored.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Notification payload (one or more records)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<NotificationRecord>,
}

impl NotificationEvent {
    /// Parse a raw JSON payload
    pub fn from_slice(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

/// A single change record
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationRecord {
    /// Event name, e.g. "ObjectCreated:Put"
    #[serde(rename = "eventName")]
    pub event_name: String,

    /// ISO-8601 event time as sent by the store
    #[serde(rename = "eventTime", default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<String>,

    /// Region the store emitted the event from
    #[serde(rename = "awsRegion", default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    pub s3: StoreEntity,
}

/// `s3` block of a record
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreEntity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObjectEntity {
    /// URL-form-encoded object key
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(rename = "eTag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// Classified event name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Object uploaded with a single PUT
    CreatedPut,
    /// Object uploaded with a browser POST
    CreatedPost,
    /// Object created by a server-side copy (includes copy-in-place)
    CreatedCopy,
    /// Multipart upload completed
    CreatedMultipart,
    /// Object's tag set replaced
    TaggingPut,
    /// Object (or a version of it) removed
    Removed,
    /// Anything else, kept verbatim
    Other(String),
}

impl EventKind {
    /// Classify a store event name
    pub fn parse(event_name: &str) -> Self {
        match event_name {
            "ObjectCreated:Put" => EventKind::CreatedPut,
            "ObjectCreated:Post" => EventKind::CreatedPost,
            "ObjectCreated:Copy" => EventKind::CreatedCopy,
            "ObjectCreated:CompleteMultipartUpload" => EventKind::CreatedMultipart,
            "ObjectTagging:Put" => EventKind::TaggingPut,
            name if name.starts_with("ObjectRemoved:") => EventKind::Removed,
            other => EventKind::Other(other.to_string()),
        }
    }

    /// True for every `ObjectCreated:*` kind
    pub fn is_created(&self) -> bool {
        matches!(
            self,
            EventKind::CreatedPut
                | EventKind::CreatedPost
                | EventKind::CreatedCopy
                | EventKind::CreatedMultipart
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::CreatedPut => write!(f, "ObjectCreated:Put"),
            EventKind::CreatedPost => write!(f, "ObjectCreated:Post"),
            EventKind::CreatedCopy => write!(f, "ObjectCreated:Copy"),
            EventKind::CreatedMultipart => write!(f, "ObjectCreated:CompleteMultipartUpload"),
            EventKind::TaggingPut => write!(f, "ObjectTagging:Put"),
            EventKind::Removed => write!(f, "ObjectRemoved"),
            EventKind::Other(name) => write!(f, "{}", name),
        }
    }
}

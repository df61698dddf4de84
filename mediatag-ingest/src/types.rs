//! Core Types for mediatag-ingest
//!
//! Object identity, detected labels, store tags and the records written to
//! the key-value index.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Object identity
// ============================================================================

/// Identity of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Bucket / container name
    pub container: String,
    /// Object key (decoded)
    pub key: String,
}

impl ObjectRef {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.key)
    }
}

/// Object metadata returned by the store's head operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHead {
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
}

impl ObjectHead {
    /// ISO-8601 UTC with millisecond precision, e.g. `2024-01-02T03:04:05.000Z`
    pub fn last_modified_iso(&self) -> String {
        self.last_modified
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

// ============================================================================
// Labels and tags
// ============================================================================

/// Label produced by detection
///
/// `confidence` is a percentage (0-100) exactly as the service reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub confidence: f64,
}

impl Label {
    pub fn new(name: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }

    /// Confidence with two fraction digits, no percent sign ("93.46")
    pub fn confidence_text(&self) -> String {
        format!("{:.2}", self.rounded_confidence())
    }

    /// Confidence with two fraction digits and a percent sign ("93.46%")
    pub fn confidence_percent(&self) -> String {
        format!("{:.2}%", self.rounded_confidence())
    }

    /// Ties round away from zero (72.125 -> 72.13); `{:.2}` alone rounds them to even
    fn rounded_confidence(&self) -> f64 {
        (self.confidence * 100.0).round() / 100.0
    }
}

/// Object tag (store key/value pair)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ============================================================================
// Index items
// ============================================================================

/// Attribute value stored in the key-value index
///
/// Serialized in the store's typed JSON form (`{"S": ..}`, `{"N": ..}`, `{"M": ..}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    #[serde(rename = "S")]
    Text(String),
    /// Decimal number kept in its textual form
    #[serde(rename = "N")]
    Number(String),
    #[serde(rename = "M")]
    Map(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&str> {
        match self {
            AttributeValue::Number(n) => Some(n),
            _ => None,
        }
    }
}

/// One item written with upsert semantics
///
/// `key_attribute` names the attribute holding the item's identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexItem {
    pub key_attribute: String,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl IndexItem {
    /// Create an item whose identifier is stored as text under `key_attribute`
    pub fn new(key_attribute: impl Into<String>, id: impl Into<String>) -> Self {
        let key_attribute = key_attribute.into();
        let mut attributes = BTreeMap::new();
        attributes.insert(key_attribute.clone(), AttributeValue::Text(id.into()));
        Self {
            key_attribute,
            attributes,
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Item identifier (value of the key attribute)
    pub fn id(&self) -> &str {
        self.attributes
            .get(&self.key_attribute)
            .and_then(AttributeValue::as_text)
            .unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

// ============================================================================
// Records
// ============================================================================

/// Attribute names of per-tag rows
pub mod tag_attrs {
    pub const ID: &str = "LabelId";
    pub const OBJECT_KEY: &str = "ObjectKey";
    pub const CONTAINER: &str = "BucketName";
    pub const TAG_NAME: &str = "TagKey";
    pub const TAG_VALUE: &str = "TagValue";
    pub const LAST_MODIFIED: &str = "LastModified";
    pub const SIZE: &str = "Size";
}

/// Attribute names of per-group rows
pub mod group_attrs {
    pub const ID: &str = "FolderID";
    pub const URL: &str = "url";
    pub const SIZE: &str = "size";
    pub const LAST_MODIFIED: &str = "lastModified";
    pub const TAGS: &str = "tags";
}

/// One index row per (object, tag)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    /// `"{object_key}-{tag_name}"`
    pub id: String,
    pub object_key: String,
    pub container: String,
    pub tag_name: String,
    pub tag_value: AttributeValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl TagRecord {
    pub fn to_item(&self) -> IndexItem {
        let mut item = IndexItem::new(tag_attrs::ID, self.id.clone())
            .with(tag_attrs::OBJECT_KEY, AttributeValue::Text(self.object_key.clone()))
            .with(tag_attrs::CONTAINER, AttributeValue::Text(self.container.clone()))
            .with(tag_attrs::TAG_NAME, AttributeValue::Text(self.tag_name.clone()))
            .with(tag_attrs::TAG_VALUE, self.tag_value.clone());

        if let Some(last_modified) = &self.last_modified {
            item = item.with(
                tag_attrs::LAST_MODIFIED,
                AttributeValue::Text(last_modified.clone()),
            );
        }
        if let Some(size) = self.size_bytes {
            item = item.with(tag_attrs::SIZE, AttributeValue::Number(size.to_string()));
        }
        item
    }
}

/// One index row per group, holding the merged tags of its companion images
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAggregateRecord {
    pub group_id: String,
    pub source_url: String,
    pub size_bytes: u64,
    pub last_modified: String,
    pub tags: BTreeMap<String, String>,
}

impl GroupAggregateRecord {
    pub fn to_item(&self) -> IndexItem {
        let tags = self
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), AttributeValue::Text(v.clone())))
            .collect();

        IndexItem::new(group_attrs::ID, self.group_id.clone())
            .with(group_attrs::URL, AttributeValue::Text(self.source_url.clone()))
            .with(group_attrs::SIZE, AttributeValue::Number(self.size_bytes.to_string()))
            .with(
                group_attrs::LAST_MODIFIED,
                AttributeValue::Text(self.last_modified.clone()),
            )
            .with(group_attrs::TAGS, AttributeValue::Map(tags))
    }
}

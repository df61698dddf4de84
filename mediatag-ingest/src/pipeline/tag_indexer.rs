//! Tag indexing
//!
//! One index record per (object, tag), keyed by `"{object_key}-{tag_name}"`
//! so that reprocessing an object overwrites its records instead of
//! duplicating them.
//!
//! How tag values are typed is controlled by [`TagValuePolicy`]; whether the
//! object's size and last-modified time are added is controlled by
//! `include_object_stats`, which costs one head call per object.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use super::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::services::{KeyValueIndex, ObjectStore};
use crate::types::{AttributeValue, ObjectHead, ObjectRef, Tag, TagRecord};

/// How tag values are typed in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagValuePolicy {
    /// Number when the value is a decimal, text otherwise
    #[default]
    Infer,
    /// Always text
    Text,
    /// Always number; non-numeric values fail the write
    Number,
}

impl TagValuePolicy {
    /// Typed attribute for `value`, or the reason it cannot be stored
    pub fn attribute_for(self, value: &str) -> Result<AttributeValue, String> {
        match self {
            TagValuePolicy::Text => Ok(AttributeValue::Text(value.to_string())),
            TagValuePolicy::Infer if is_storable_number(value.trim()) => {
                Ok(AttributeValue::Number(value.trim().to_string()))
            }
            TagValuePolicy::Infer => Ok(AttributeValue::Text(value.to_string())),
            TagValuePolicy::Number if is_storable_number(value.trim()) => {
                Ok(AttributeValue::Number(value.trim().to_string()))
            }
            TagValuePolicy::Number if is_decimal(value.trim()) => Err(format!(
                "tag value '{}' exceeds {} significant digits or the 1E-130..1E+126 range",
                value, MAX_SIGNIFICANT_DIGITS
            )),
            TagValuePolicy::Number => Err(format!("tag value '{}' is not a number", value)),
        }
    }
}

impl FromStr for TagValuePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "infer" => Ok(TagValuePolicy::Infer),
            "text" => Ok(TagValuePolicy::Text),
            "number" => Ok(TagValuePolicy::Number),
            other => Err(format!(
                "Unknown tag value policy '{}' (expected 'infer', 'text' or 'number')",
                other
            )),
        }
    }
}

impl fmt::Display for TagValuePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValuePolicy::Infer => write!(f, "infer"),
            TagValuePolicy::Text => write!(f, "text"),
            TagValuePolicy::Number => write!(f, "number"),
        }
    }
}

/// Significant digits a number attribute may carry
pub const MAX_SIGNIFICANT_DIGITS: usize = 38;

/// Decimal exponent range of a non-zero number attribute (1E-130 ..= 9.99..E+125)
const MIN_EXPONENT: i64 = -130;
const MAX_EXPONENT: i64 = 125;

/// Split a plain decimal (`-?digits(.digits)?`) into whole and fraction digits
fn decimal_parts(value: &str) -> Option<(&str, &str)> {
    let unsigned = value.strip_prefix('-').unwrap_or(value);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) if !fraction.is_empty() => (whole, fraction),
        Some(_) => return None,
        None => (unsigned, ""),
    };
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());

    (!whole.is_empty() && all_digits(whole) && all_digits(fraction)).then_some((whole, fraction))
}

/// Plain decimal: optional minus, digits, optional fraction
pub fn is_decimal(value: &str) -> bool {
    decimal_parts(value).is_some()
}

/// Plain decimal the index can store as a number
///
/// At most [`MAX_SIGNIFICANT_DIGITS`] significant digits, and zero or a
/// magnitude between 1E-130 and 9.99..E+125.
pub fn is_storable_number(value: &str) -> bool {
    let Some((whole, fraction)) = decimal_parts(value) else {
        return false;
    };

    let whole = whole.trim_start_matches('0');
    let exponent = if !whole.is_empty() {
        whole.len() as i64 - 1
    } else {
        match fraction.find(|c: char| c != '0') {
            Some(leading_zeros) => -(leading_zeros as i64) - 1,
            None => return true,
        }
    };

    let digits: String = whole.chars().chain(fraction.chars()).collect();
    let significant = digits.trim_start_matches('0').trim_end_matches('0');

    significant.len() <= MAX_SIGNIFICANT_DIGITS
        && (MIN_EXPONENT..=MAX_EXPONENT).contains(&exponent)
}

/// Identifier of the record for one object tag
pub fn record_id(object_key: &str, tag_name: &str) -> String {
    format!("{}-{}", object_key, tag_name)
}

/// Writes per-tag index records
#[derive(Clone)]
pub struct TagIndexer {
    store: Arc<dyn ObjectStore>,
    index: Arc<dyn KeyValueIndex>,
    table: String,
    policy: TagValuePolicy,
    include_object_stats: bool,
}

impl TagIndexer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        index: Arc<dyn KeyValueIndex>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            index,
            table: config.tag_table.clone(),
            policy: config.tag_value_policy,
            include_object_stats: config.include_object_stats,
        }
    }

    /// Index a tag set already in hand (freshly written by the annotator)
    ///
    /// Records are written one at a time in tag order. The first failure
    /// aborts; records written before it stay.
    pub async fn index_tags(&self, object: &ObjectRef, tags: &[Tag]) -> PipelineResult<Vec<TagRecord>> {
        if tags.is_empty() {
            debug!(key = %object.key, "No tags to index");
            return Ok(Vec::new());
        }

        let stats = if self.include_object_stats {
            let head = self.store.head(object).await.map_err(|e| PipelineError::IndexWrite {
                object: object.clone(),
                reason: format!("reading object stats failed: {}", e),
            })?;
            Some(head)
        } else {
            None
        };

        let mut records = Vec::with_capacity(tags.len());
        for tag in tags {
            let record = self.build_record(object, tag, stats.as_ref())?;
            self.index
                .put_item(&self.table, &record.to_item())
                .await
                .map_err(|e| PipelineError::IndexWrite {
                    object: object.clone(),
                    reason: format!("writing record '{}' failed: {}", record.id, e),
                })?;
            debug!(table = %self.table, id = %record.id, "Tag record written");
            records.push(record);
        }

        info!(
            container = %object.container,
            key = %object.key,
            records = records.len(),
            table = %self.table,
            "Tags indexed"
        );
        Ok(records)
    }

    /// Read the object's current tag set from the store, then index it
    pub async fn index_stored_tags(&self, object: &ObjectRef) -> PipelineResult<Vec<TagRecord>> {
        let tags = self.store.get_tags(object).await.map_err(|e| PipelineError::IndexWrite {
            object: object.clone(),
            reason: format!("reading stored tags failed: {}", e),
        })?;
        info!(key = %object.key, count = tags.len(), "Stored tags retrieved");

        self.index_tags(object, &tags).await
    }

    fn build_record(
        &self,
        object: &ObjectRef,
        tag: &Tag,
        stats: Option<&ObjectHead>,
    ) -> PipelineResult<TagRecord> {
        let tag_value = self
            .policy
            .attribute_for(&tag.value)
            .map_err(|reason| PipelineError::IndexWrite {
                object: object.clone(),
                reason,
            })?;

        Ok(TagRecord {
            id: record_id(&object.key, &tag.key),
            object_key: object.key.clone(),
            container: object.container.clone(),
            tag_name: tag.key.clone(),
            tag_value,
            size_bytes: stats.map(|h| h.size_bytes),
            last_modified: stats.map(ObjectHead::last_modified_iso),
        })
    }
}

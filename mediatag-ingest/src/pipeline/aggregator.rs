//! Group tag aggregation
//!
//! A primary object (e.g. `models/chair.fbx`) defines a group: every object
//! sharing its parent prefix. The tags of the group's companion images are
//! merged into one map and stored as a single record keyed by the prefix.
//!
//! Listing, sibling tag reads and the primary's head call must all succeed
//! before the record is written, so a failed aggregation never leaves a
//! partial group record behind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use super::{has_extension, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::services::{KeyValueIndex, ObjectStore};
use crate::types::{GroupAggregateRecord, ObjectRef};

/// Order in which sibling tag sets are merged (later wins on key collisions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiblingOrder {
    /// Sort sibling keys before merging
    #[default]
    Lexicographic,
    /// Keep the order the store listed them in
    Listing,
}

impl FromStr for SiblingOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexicographic" => Ok(SiblingOrder::Lexicographic),
            "listing" => Ok(SiblingOrder::Listing),
            other => Err(format!(
                "Unknown sibling order '{}' (expected 'lexicographic' or 'listing')",
                other
            )),
        }
    }
}

impl fmt::Display for SiblingOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiblingOrder::Lexicographic => write!(f, "lexicographic"),
            SiblingOrder::Listing => write!(f, "listing"),
        }
    }
}

/// Result of an aggregation attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AggregateOutcome {
    /// Nothing to aggregate (no group prefix)
    Skipped { reason: String },
    /// Record written
    Persisted { record: GroupAggregateRecord },
}

/// Group identifier of a key: everything before its final `/`-segment
///
/// Returns `None` for keys at the container root (or whose parent is blank).
pub fn group_id_for(key: &str) -> Option<String> {
    let (parent, _) = key.rsplit_once('/')?;
    if parent.trim().is_empty() {
        None
    } else {
        Some(parent.to_string())
    }
}

/// Builds and stores group aggregate records
#[derive(Clone)]
pub struct GroupAggregator {
    store: Arc<dyn ObjectStore>,
    index: Arc<dyn KeyValueIndex>,
    table: String,
    primary_extension: String,
    companion_extension: String,
    sibling_order: SiblingOrder,
}

impl GroupAggregator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        index: Arc<dyn KeyValueIndex>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            index,
            table: config.group_table.clone(),
            primary_extension: config.primary_extension.clone(),
            companion_extension: config.companion_extension.clone(),
            sibling_order: config.sibling_order,
        }
    }

    /// Whether `object` defines a group
    pub fn is_primary(&self, object: &ObjectRef) -> bool {
        has_extension(&object.key, &self.primary_extension)
    }

    /// Aggregate the group of `primary` and persist its record
    pub async fn aggregate(&self, primary: &ObjectRef) -> PipelineResult<AggregateOutcome> {
        let Some(group_id) = group_id_for(&primary.key) else {
            info!(key = %primary.key, "Primary object is not inside a folder; nothing to aggregate");
            return Ok(AggregateOutcome::Skipped {
                reason: format!("'{}' has no parent folder", primary.key),
            });
        };

        let tags = self.collect_sibling_tags(&primary.container, &group_id).await?;

        let head = self
            .store
            .head(primary)
            .await
            .map_err(|e| aggregation_error(&group_id, format!("head of '{}' failed: {}", primary.key, e)))?;

        let record = GroupAggregateRecord {
            group_id: group_id.clone(),
            source_url: self.store.object_url(primary),
            size_bytes: head.size_bytes,
            last_modified: head.last_modified_iso(),
            tags,
        };

        self.index
            .put_item(&self.table, &record.to_item())
            .await
            .map_err(|e| aggregation_error(&group_id, format!("writing group record failed: {}", e)))?;

        info!(
            container = %primary.container,
            group_id = %group_id,
            tags = record.tags.len(),
            table = %self.table,
            "Group aggregate stored"
        );
        Ok(AggregateOutcome::Persisted { record })
    }

    /// Merge the tag sets of every companion image under `group_id/`
    pub async fn collect_sibling_tags(
        &self,
        container: &str,
        group_id: &str,
    ) -> PipelineResult<BTreeMap<String, String>> {
        let prefix = format!("{}/", group_id);
        let mut siblings: Vec<String> = self
            .store
            .list_keys(container, &prefix)
            .await
            .map_err(|e| aggregation_error(group_id, format!("listing '{}' failed: {}", prefix, e)))?
            .into_iter()
            .filter(|key| has_extension(key, &self.companion_extension))
            .collect();

        if self.sibling_order == SiblingOrder::Lexicographic {
            siblings.sort();
        }
        debug!(group_id, siblings = siblings.len(), "Companion images found");

        let mut merged = BTreeMap::new();
        for key in siblings {
            let sibling = ObjectRef::new(container, key);
            let tags = self.store.get_tags(&sibling).await.map_err(|e| {
                aggregation_error(group_id, format!("reading tags of '{}' failed: {}", sibling.key, e))
            })?;
            if tags.is_empty() {
                debug!(key = %sibling.key, "Companion has no tags yet");
            }
            for tag in tags {
                merged.insert(tag.key, tag.value);
            }
        }

        Ok(merged)
    }
}

fn aggregation_error(group_id: &str, reason: String) -> PipelineError {
    PipelineError::Aggregation {
        group_id: group_id.to_string(),
        reason,
    }
}

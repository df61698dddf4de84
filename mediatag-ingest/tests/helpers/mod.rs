//! Test Helper Utilities
//!
//! In-memory fakes of the pipeline's three collaborators. Every fake records
//! the calls it receives and can be told to fail specific operations.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use mediatag_ingest::services::{
    Clients, IndexError, KeyValueIndex, LabelService, LabelServiceError, ObjectStore, StoreError,
};
use mediatag_ingest::types::{AttributeValue, IndexItem, Label, ObjectHead, ObjectRef, Tag};
use mediatag_ingest::{Pipeline, PipelineConfig};

pub const BUCKET: &str = "media";
pub const TABLE: &str = "labels";

/// Last-modified time given to every stored object
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
}

// ============================================================================
// Object store
// ============================================================================

/// Store operation, for call logs and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetTags,
    Head,
    ListKeys,
    PutTags,
    ReplaceMetadata,
}

#[derive(Debug, Clone)]
struct StoredObject {
    size_bytes: u64,
    tags: Vec<Tag>,
    metadata: BTreeMap<String, String>,
}

#[derive(Default)]
struct StoreState {
    objects: HashMap<String, StoredObject>,
    /// Keys in the order the store lists them (insertion order)
    listing: Vec<String>,
    calls: Vec<(StoreOp, String)>,
    /// Operation → key it fails for (`None` fails every key)
    failures: HashMap<StoreOp, Option<String>>,
}

/// In-memory object store for a single bucket
#[derive(Default)]
pub struct MemoryObjectStore {
    state: Mutex<StoreState>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&self, key: &str, size_bytes: u64) {
        let mut state = self.state.lock().unwrap();
        if !state.objects.contains_key(key) {
            state.listing.push(key.to_string());
        }
        state.objects.insert(
            key.to_string(),
            StoredObject {
                size_bytes,
                tags: Vec::new(),
                metadata: BTreeMap::new(),
            },
        );
    }

    pub fn add_tagged_object(&self, key: &str, tags: &[(&str, &str)]) {
        self.add_object(key, 1024);
        let mut state = self.state.lock().unwrap();
        if let Some(object) = state.objects.get_mut(key) {
            object.tags = tags.iter().map(|(k, v)| Tag::new(*k, *v)).collect();
        }
    }

    pub fn tags(&self, key: &str) -> Vec<Tag> {
        let state = self.state.lock().unwrap();
        state.objects.get(key).map(|o| o.tags.clone()).unwrap_or_default()
    }

    pub fn metadata(&self, key: &str) -> BTreeMap<String, String> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(key)
            .map(|o| o.metadata.clone())
            .unwrap_or_default()
    }

    /// Fail `op` for `key`, or for every key when `key` is `None`
    pub fn fail(&self, op: StoreOp, key: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.failures.insert(op, key.map(str::to_string));
    }

    pub fn calls(&self) -> Vec<(StoreOp, String)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, op: StoreOp) -> usize {
        self.calls().iter().filter(|(o, _)| *o == op).count()
    }

    fn record(&self, op: StoreOp, key: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((op, key.to_string()));
        match state.failures.get(&op) {
            Some(None) => Err(StoreError::Service(format!("injected {:?} failure", op))),
            Some(Some(target)) if target == key => {
                Err(StoreError::Service(format!("injected {:?} failure for {}", op, key)))
            }
            _ => Ok(()),
        }
    }

    fn not_found(object: &ObjectRef) -> StoreError {
        StoreError::NotFound(format!("no such key: {}", object.key))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_tags(&self, object: &ObjectRef) -> Result<Vec<Tag>, StoreError> {
        self.record(StoreOp::GetTags, &object.key)?;
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&object.key)
            .map(|o| o.tags.clone())
            .ok_or_else(|| Self::not_found(object))
    }

    async fn head(&self, object: &ObjectRef) -> Result<ObjectHead, StoreError> {
        self.record(StoreOp::Head, &object.key)?;
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&object.key)
            .map(|o| ObjectHead {
                size_bytes: o.size_bytes,
                last_modified: fixed_time(),
            })
            .ok_or_else(|| Self::not_found(object))
    }

    async fn list_keys(&self, _container: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.record(StoreOp::ListKeys, prefix)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .listing
            .iter()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn put_tags(&self, object: &ObjectRef, tags: &[Tag]) -> Result<(), StoreError> {
        self.record(StoreOp::PutTags, &object.key)?;
        let mut state = self.state.lock().unwrap();
        let stored = state
            .objects
            .get_mut(&object.key)
            .ok_or_else(|| Self::not_found(object))?;
        stored.tags = tags.to_vec();
        Ok(())
    }

    async fn replace_metadata(
        &self,
        object: &ObjectRef,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        self.record(StoreOp::ReplaceMetadata, &object.key)?;
        let mut state = self.state.lock().unwrap();
        let stored = state
            .objects
            .get_mut(&object.key)
            .ok_or_else(|| Self::not_found(object))?;
        stored.metadata = metadata.clone();
        Ok(())
    }

    fn object_url(&self, object: &ObjectRef) -> String {
        format!("https://{}.s3.amazonaws.com/{}", object.container, object.key)
    }
}

// ============================================================================
// Label service
// ============================================================================

/// Canned detection response for one key
#[derive(Debug, Clone)]
pub enum LabelResponse {
    Labels(Vec<Label>),
    Unsupported,
    ServiceFailure,
}

/// Detection call as received: (key, max labels, min confidence)
pub type DetectCall = (String, i32, f32);

#[derive(Default)]
pub struct MemoryLabelService {
    responses: Mutex<HashMap<String, LabelResponse>>,
    calls: Mutex<Vec<DetectCall>>,
}

impl MemoryLabelService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, key: &str, response: LabelResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(key.to_string(), response);
    }

    pub fn set_labels(&self, key: &str, labels: &[(&str, f64)]) {
        let labels = labels.iter().map(|(n, c)| Label::new(*n, *c)).collect();
        self.respond(key, LabelResponse::Labels(labels));
    }

    pub fn calls(&self) -> Vec<DetectCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LabelService for MemoryLabelService {
    async fn detect_labels(
        &self,
        object: &ObjectRef,
        max_labels: i32,
        min_confidence: f32,
    ) -> Result<Vec<Label>, LabelServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push((object.key.clone(), max_labels, min_confidence));

        match self.responses.lock().unwrap().get(&object.key) {
            Some(LabelResponse::Labels(labels)) => Ok(labels.clone()),
            Some(LabelResponse::Unsupported) => Err(LabelServiceError::UnsupportedFormat(
                "Request has invalid image format".to_string(),
            )),
            Some(LabelResponse::ServiceFailure) => Err(LabelServiceError::Service(
                "Rate exceeded".to_string(),
            )),
            None => Ok(Vec::new()),
        }
    }
}

// ============================================================================
// Key-value index
// ============================================================================

#[derive(Default)]
pub struct MemoryIndex {
    items: Mutex<BTreeMap<(String, String), IndexItem>>,
    /// (table, id) of every put, in order
    puts: Mutex<Vec<(String, String)>>,
    /// Fail every put once this many have succeeded
    fail_after: Mutex<Option<usize>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_after(&self, successful_puts: usize) {
        *self.fail_after.lock().unwrap() = Some(successful_puts);
    }

    pub fn item(&self, table: &str, id: &str) -> Option<IndexItem> {
        self.items
            .lock()
            .unwrap()
            .get(&(table.to_string(), id.to_string()))
            .cloned()
    }

    /// Number of distinct items stored in `table`
    pub fn count(&self, table: &str) -> usize {
        self.items
            .lock()
            .unwrap()
            .keys()
            .filter(|(t, _)| t == table)
            .count()
    }

    pub fn puts(&self) -> Vec<(String, String)> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl KeyValueIndex for MemoryIndex {
    async fn put_item(&self, table: &str, item: &IndexItem) -> Result<(), IndexError> {
        let succeeded = self.puts.lock().unwrap().len();
        if let Some(limit) = *self.fail_after.lock().unwrap() {
            if succeeded >= limit {
                return Err(IndexError::Service("injected put failure".to_string()));
            }
        }

        self.puts
            .lock()
            .unwrap()
            .push((table.to_string(), item.id().to_string()));
        self.items
            .lock()
            .unwrap()
            .insert((table.to_string(), item.id().to_string()), item.clone());
        Ok(())
    }
}

// ============================================================================
// Assembled pipeline
// ============================================================================

/// Pipeline wired to fresh fakes
pub struct TestEnv {
    pub store: Arc<MemoryObjectStore>,
    pub labels: Arc<MemoryLabelService>,
    pub index: Arc<MemoryIndex>,
    pub pipeline: Pipeline,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::new(TABLE))
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        let store = Arc::new(MemoryObjectStore::new());
        let labels = Arc::new(MemoryLabelService::new());
        let index = Arc::new(MemoryIndex::new());

        let clients = Clients {
            store: store.clone(),
            labels: labels.clone(),
            index: index.clone(),
        };
        let pipeline = Pipeline::new(&clients, config);

        Self {
            store,
            labels,
            index,
            pipeline,
        }
    }

    pub fn object(&self, key: &str) -> ObjectRef {
        ObjectRef::new(BUCKET, key)
    }
}

/// Single-record notification payload
pub fn event_payload(event_name: &str, key: &str) -> Vec<u8> {
    serde_json::json!({
        "Records": [{
            "eventVersion": "2.1",
            "eventSource": "aws:s3",
            "awsRegion": "us-west-2",
            "eventName": event_name,
            "s3": {
                "bucket": { "name": BUCKET },
                "object": { "key": key, "size": 1024 }
            }
        }]
    })
    .to_string()
    .into_bytes()
}

/// Text attribute of a stored item
pub fn text_attr<'a>(item: &'a IndexItem, name: &str) -> Option<&'a str> {
    item.get(name).and_then(AttributeValue::as_text)
}

/// Number attribute of a stored item
pub fn number_attr<'a>(item: &'a IndexItem, name: &str) -> Option<&'a str> {
    item.get(name).and_then(AttributeValue::as_number)
}

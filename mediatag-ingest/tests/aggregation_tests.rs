//! Group Aggregation Integration Tests
//!
//! Primary objects (`.fbx`) merge the tags of the companion images in their
//! folder into one group record.

mod helpers;

use helpers::*;
use mediatag_ingest::pipeline::SiblingOrder;
use mediatag_ingest::types::{group_attrs, AttributeValue};
use mediatag_ingest::{InvocationOutcome, PipelineConfig, PipelineError};
use std::collections::BTreeMap;

fn chair_group(env: &TestEnv) {
    env.store.add_object("models/chair.fbx", 4096);
    env.store
        .add_tagged_object("models/chair_a.png", &[("color", "red")]);
    env.store.add_tagged_object(
        "models/chair_b.png",
        &[("color", "blue"), ("style", "modern")],
    );
}

fn stored_tags(env: &TestEnv, group_id: &str) -> BTreeMap<String, String> {
    let item = env.index.item(TABLE, group_id).expect("group record");
    match item.get(group_attrs::TAGS) {
        Some(AttributeValue::Map(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), v.as_text().unwrap_or_default().to_string()))
            .collect(),
        other => panic!("expected tag map, got {:?}", other),
    }
}

/// TC-AGG-001: Sibling tags merge with later siblings overwriting
#[tokio::test]
async fn tc_agg_001_merges_companion_tags() {
    // Given: models/chair.fbx with two tagged companion images
    let env = TestEnv::new();
    chair_group(&env);

    // When: the primary object is uploaded
    let outcome = env
        .pipeline
        .handle_event(&event_payload("ObjectCreated:Put", "models/chair.fbx"))
        .await
        .unwrap();

    // Then: one record keyed by the folder, later sibling wins on "color"
    assert!(matches!(outcome, InvocationOutcome::GroupAggregated { .. }));
    let tags = stored_tags(&env, "models");
    assert_eq!(tags.len(), 2);
    assert_eq!(tags["color"], "blue");
    assert_eq!(tags["style"], "modern");

    let item = env.index.item(TABLE, "models").unwrap();
    assert_eq!(
        text_attr(&item, group_attrs::URL),
        Some("https://media.s3.amazonaws.com/models/chair.fbx")
    );
    assert_eq!(number_attr(&item, group_attrs::SIZE), Some("4096"));
    assert_eq!(
        text_attr(&item, group_attrs::LAST_MODIFIED),
        Some("2024-01-02T03:04:05.000Z")
    );

    // No detection for primary objects
    assert!(env.labels.calls().is_empty());
}

/// TC-AGG-002: Primary object at the container root is a no-op
#[tokio::test]
async fn tc_agg_002_root_primary_skipped() {
    let env = TestEnv::new();
    env.store.add_object("chair.fbx", 10);

    let outcome = env
        .pipeline
        .handle_event(&event_payload("ObjectCreated:Put", "chair.fbx"))
        .await
        .unwrap();

    assert!(matches!(outcome, InvocationOutcome::GroupSkipped { .. }));
    assert!(env.index.puts().is_empty());
    assert!(env.store.calls().is_empty());
}

/// TC-AGG-003: Untagged siblings contribute nothing
#[tokio::test]
async fn tc_agg_003_untagged_sibling_is_valid() {
    let env = TestEnv::new();
    env.store.add_object("props/lamp.fbx", 10);
    env.store.add_object("props/lamp_a.png", 10);
    env.store.add_tagged_object("props/lamp_b.png", &[("Lamp", "97.10")]);

    env.pipeline
        .handle_event(&event_payload("ObjectCreated:Put", "props/lamp.fbx"))
        .await
        .unwrap();

    let tags = stored_tags(&env, "props");
    assert_eq!(tags.len(), 1);
    assert_eq!(tags["Lamp"], "97.10");
}

/// TC-AGG-004: Only companion images are merged
#[tokio::test]
async fn tc_agg_004_non_companions_excluded() {
    let env = TestEnv::new();
    chair_group(&env);
    env.store.add_tagged_object("models/notes.txt", &[("author", "sam")]);
    env.store.add_tagged_object("models/preview.jpg", &[("preview", "yes")]);

    env.pipeline
        .handle_event(&event_payload("ObjectCreated:Put", "models/chair.fbx"))
        .await
        .unwrap();

    let tags = stored_tags(&env, "models");
    assert!(!tags.contains_key("author"));
    assert!(!tags.contains_key("preview"));
}

/// TC-AGG-005: Listing failure writes nothing
#[tokio::test]
async fn tc_agg_005_listing_failure_writes_nothing() {
    let env = TestEnv::new();
    chair_group(&env);
    env.store.fail(StoreOp::ListKeys, None);

    let err = env
        .pipeline
        .handle_event(&event_payload("ObjectCreated:Put", "models/chair.fbx"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Aggregation { .. }));
    assert!(err.is_retryable());
    assert!(env.index.puts().is_empty());
}

/// TC-AGG-006: Sibling tag read failure writes nothing
#[tokio::test]
async fn tc_agg_006_sibling_failure_writes_nothing() {
    let env = TestEnv::new();
    chair_group(&env);
    env.store.fail(StoreOp::GetTags, Some("models/chair_b.png"));

    let err = env
        .pipeline
        .handle_event(&event_payload("ObjectCreated:Put", "models/chair.fbx"))
        .await
        .unwrap_err();

    match err {
        PipelineError::Aggregation { group_id, .. } => assert_eq!(group_id, "models"),
        other => panic!("expected Aggregation, got {:?}", other),
    }
    assert!(env.index.puts().is_empty());
}

/// TC-AGG-007: Head failure on the primary writes nothing
#[tokio::test]
async fn tc_agg_007_head_failure_writes_nothing() {
    let env = TestEnv::new();
    chair_group(&env);
    env.store.fail(StoreOp::Head, Some("models/chair.fbx"));

    let err = env
        .pipeline
        .handle_event(&event_payload("ObjectCreated:Put", "models/chair.fbx"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Aggregation { .. }));
    assert!(env.index.puts().is_empty());
}

/// TC-AGG-008: Persist failure is an aggregation error
#[tokio::test]
async fn tc_agg_008_persist_failure() {
    let env = TestEnv::new();
    chair_group(&env);
    env.index.fail_after(0);

    let err = env
        .pipeline
        .handle_event(&event_payload("ObjectCreated:Put", "models/chair.fbx"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Aggregation { .. }));
}

/// TC-AGG-009: Re-aggregation overwrites the group record
#[tokio::test]
async fn tc_agg_009_reaggregation_is_idempotent() {
    let env = TestEnv::new();
    chair_group(&env);
    let payload = event_payload("ObjectCreated:Put", "models/chair.fbx");

    env.pipeline.handle_event(&payload).await.unwrap();
    env.pipeline.handle_event(&payload).await.unwrap();

    assert_eq!(env.index.puts().len(), 2);
    assert_eq!(env.index.count(TABLE), 1);
}

/// TC-AGG-010: Sibling order policy decides which duplicate key wins
#[tokio::test]
async fn tc_agg_010_sibling_order_policy() {
    // Listed out of lexicographic order: z first, then a
    let setup = |env: &TestEnv| {
        env.store.add_object("set/scene.fbx", 10);
        env.store.add_tagged_object("set/z.png", &[("mood", "dark")]);
        env.store.add_tagged_object("set/a.png", &[("mood", "bright")]);
    };

    let env = TestEnv::new();
    setup(&env);
    env.pipeline
        .handle_event(&event_payload("ObjectCreated:Put", "set/scene.fbx"))
        .await
        .unwrap();
    assert_eq!(stored_tags(&env, "set")["mood"], "dark");

    let mut config = PipelineConfig::new(TABLE);
    config.sibling_order = SiblingOrder::Listing;
    let env = TestEnv::with_config(config);
    setup(&env);
    env.pipeline
        .handle_event(&event_payload("ObjectCreated:Put", "set/scene.fbx"))
        .await
        .unwrap();
    assert_eq!(stored_tags(&env, "set")["mood"], "bright");
}

/// TC-AGG-011: Group records go to the configured group table
#[tokio::test]
async fn tc_agg_011_separate_group_table() {
    let mut config = PipelineConfig::new(TABLE);
    config.group_table = "groups".to_string();
    let env = TestEnv::with_config(config);
    chair_group(&env);

    let outcome = env
        .pipeline
        .handle_event(&event_payload("ObjectCreated:Put", "models/chair.fbx"))
        .await
        .unwrap();

    assert!(env.index.item("groups", "models").is_some());
    assert_eq!(env.index.count(TABLE), 0);

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["outcome"], "group_aggregated");
    assert_eq!(json["record"]["group_id"], "models");
}

/// TC-AGG-012: Nested folders use the full parent path
#[tokio::test]
async fn tc_agg_012_nested_group_id() {
    let env = TestEnv::new();
    env.store.add_object("a/b/c/thing.FBX", 10);
    env.store.add_tagged_object("a/b/c/thing.png", &[("k", "v")]);

    let outcome = env
        .pipeline
        .handle_event(&event_payload("ObjectCreated:Put", "a/b/c/thing.FBX"))
        .await
        .unwrap();

    match outcome {
        InvocationOutcome::GroupAggregated { record, .. } => {
            assert_eq!(record.group_id, "a/b/c");
            assert_eq!(record.tags.get("k").map(String::as_str), Some("v"));
        }
        other => panic!("expected GroupAggregated, got {:?}", other),
    }
}

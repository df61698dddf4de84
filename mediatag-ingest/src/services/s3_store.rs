//! Amazon S3 object store
//!
//! Tag, head and listing calls map one-to-one onto S3 operations. Metadata
//! replacement is a copy of the object onto itself with the `REPLACE`
//! metadata directive, which leaves the object's bytes untouched.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::types::{MetadataDirective, Tag as S3Tag, Tagging};
use aws_sdk_s3::Client;
use chrono::DateTime;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::aws::{classify_sdk_error, SdkFailure};
use super::{ObjectStore, StoreError};
use crate::config::AwsSettings;
use crate::types::{ObjectHead, ObjectRef, Tag};

/// S3-backed object store
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore").finish()
    }
}

impl S3ObjectStore {
    pub fn new(sdk_config: &SdkConfig, settings: &AwsSettings) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);

        // S3-compatible services behind an endpoint override rarely support
        // virtual-hosted bucket addressing
        if settings.endpoint_url.is_some() {
            builder = builder.force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_tags(&self, object: &ObjectRef) -> Result<Vec<Tag>, StoreError> {
        debug!(object = %object, "GetObjectTagging");
        let response = self
            .client
            .get_object_tagging()
            .bucket(&object.container)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| store_error(classify_sdk_error(&e)))?;

        Ok(response
            .tag_set()
            .iter()
            .map(|t| Tag::new(t.key(), t.value()))
            .collect())
    }

    async fn head(&self, object: &ObjectRef) -> Result<ObjectHead, StoreError> {
        debug!(object = %object, "HeadObject");
        let response = self
            .client
            .head_object()
            .bucket(&object.container)
            .key(&object.key)
            .send()
            .await
            .map_err(|e| store_error(classify_sdk_error(&e)))?;

        let size_bytes = response.content_length().unwrap_or(0).max(0) as u64;
        let last_modified = response
            .last_modified()
            .and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos()))
            .ok_or_else(|| {
                StoreError::Service(format!("HeadObject returned no Last-Modified for {}", object))
            })?;

        Ok(ObjectHead {
            size_bytes,
            last_modified,
        })
    }

    async fn list_keys(&self, container: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(container)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| store_error(classify_sdk_error(&e)))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated() == Some(true) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(container, prefix, count = keys.len(), "ListObjectsV2");
        Ok(keys)
    }

    async fn put_tags(&self, object: &ObjectRef, tags: &[Tag]) -> Result<(), StoreError> {
        let tag_set = tags
            .iter()
            .map(|t| {
                S3Tag::builder()
                    .key(&t.key)
                    .value(&t.value)
                    .build()
                    .map_err(|e| StoreError::InvalidRequest(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| StoreError::InvalidRequest(e.to_string()))?;

        debug!(object = %object, count = tags.len(), "PutObjectTagging");
        self.client
            .put_object_tagging()
            .bucket(&object.container)
            .key(&object.key)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| store_error(classify_sdk_error(&e)))?;

        Ok(())
    }

    async fn replace_metadata(
        &self,
        object: &ObjectRef,
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let copy_source = format!(
            "{}/{}",
            object.container,
            urlencoding::encode(&object.key)
        );
        let metadata: HashMap<String, String> = metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        debug!(object = %object, entries = metadata.len(), "CopyObject (metadata replace)");
        self.client
            .copy_object()
            .bucket(&object.container)
            .key(&object.key)
            .copy_source(copy_source)
            .metadata_directive(MetadataDirective::Replace)
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|e| store_error(classify_sdk_error(&e)))?;

        Ok(())
    }

    fn object_url(&self, object: &ObjectRef) -> String {
        format!("https://{}.s3.amazonaws.com/{}", object.container, object.key)
    }
}

/// Map a classified S3 failure onto a store error
fn store_error(failure: SdkFailure) -> StoreError {
    match failure {
        SdkFailure::Service { code, message } => match code.as_str() {
            "NoSuchKey" | "NotFound" | "NoSuchBucket" => StoreError::NotFound(message),
            "AccessDenied" | "AllAccessDisabled" => StoreError::AccessDenied(message),
            "InvalidRequest" | "InvalidArgument" | "InvalidTag" | "MalformedXML" => {
                StoreError::InvalidRequest(message)
            }
            "RequestTimeout" => StoreError::Timeout(message),
            _ => StoreError::Service(message),
        },
        SdkFailure::Timeout(message) => StoreError::Timeout(message),
        SdkFailure::Dispatch(message) => StoreError::Connection(message),
        SdkFailure::Construction(message) => StoreError::InvalidRequest(message),
        SdkFailure::Response(message) => StoreError::Service(message),
    }
}

//! DynamoDB key-value index
//!
//! Items are written with `PutItem`, which replaces any existing item with
//! the same primary key. That upsert is what makes reprocessing idempotent.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::types::AttributeValue as DdbValue;
use aws_sdk_dynamodb::Client;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::aws::{classify_sdk_error, SdkFailure};
use super::{IndexError, KeyValueIndex};
use crate::config::IndexSettings;
use crate::types::{AttributeValue, IndexItem};

/// DynamoDB-backed index
#[derive(Clone)]
pub struct DynamoDbIndex {
    client: Client,
}

impl std::fmt::Debug for DynamoDbIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbIndex").finish()
    }
}

impl DynamoDbIndex {
    /// Create a client for the index region
    ///
    /// Inherits HTTP client, endpoint and timeout settings from `sdk_config`
    /// and overrides only the region.
    pub fn new(sdk_config: &SdkConfig, settings: &IndexSettings) -> Self {
        let builder = aws_sdk_dynamodb::config::Builder::from(sdk_config)
            .region(aws_sdk_dynamodb::config::Region::new(settings.region.clone()));

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl KeyValueIndex for DynamoDbIndex {
    async fn put_item(&self, table: &str, item: &IndexItem) -> Result<(), IndexError> {
        debug!(table, id = %item.id(), "PutItem");
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(to_item_map(&item.attributes)))
            .send()
            .await
            .map_err(|e| index_error(classify_sdk_error(&e)))?;

        Ok(())
    }
}

fn to_item_map(attributes: &BTreeMap<String, AttributeValue>) -> HashMap<String, DdbValue> {
    attributes
        .iter()
        .map(|(name, value)| (name.clone(), to_ddb_value(value)))
        .collect()
}

fn to_ddb_value(value: &AttributeValue) -> DdbValue {
    match value {
        AttributeValue::Text(s) => DdbValue::S(s.clone()),
        AttributeValue::Number(n) => DdbValue::N(n.clone()),
        AttributeValue::Map(m) => DdbValue::M(to_item_map(m)),
    }
}

fn index_error(failure: SdkFailure) -> IndexError {
    match failure {
        SdkFailure::Service { code, message } => match code.as_str() {
            "ValidationException" => IndexError::InvalidItem(message),
            _ => IndexError::Service(message),
        },
        SdkFailure::Timeout(message) => IndexError::Timeout(message),
        SdkFailure::Dispatch(message) => IndexError::Connection(message),
        SdkFailure::Construction(message) => IndexError::InvalidItem(message),
        SdkFailure::Response(message) => IndexError::Service(message),
    }
}

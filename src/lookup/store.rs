use std::collections::HashMap;
use std::error::Error as StdError;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use log::debug;

/// Partition key of the computers table.
pub const PARTITION_KEY: &str = "uId";

/// Raw item as returned by a point read.
pub type Item = HashMap<String, AttributeValue>;

/// Failure talking to the key-value store.
#[derive(Debug, thiserror::Error)]
#[error("key-value store read failed: {source}")]
pub struct StoreError {
    #[source]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl StoreError {
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Point lookups of computer records by user id.
#[async_trait]
pub trait ComputerStore: Send + Sync {
    /// Returns the item stored under `user_id`, or `None` when absent.
    async fn get_computer_record(&self, user_id: &str) -> Result<Option<Item>, StoreError>;
}

/// DynamoDB-backed store. The client is built once by the binary and injected.
#[derive(Debug, Clone)]
pub struct DynamoComputerStore {
    client: Client,
    table_name: String,
}

impl DynamoComputerStore {
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

#[async_trait]
impl ComputerStore for DynamoComputerStore {
    async fn get_computer_record(&self, user_id: &str) -> Result<Option<Item>, StoreError> {
        debug!("GetItem {}[{PARTITION_KEY}={user_id}]", self.table_name);
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(PARTITION_KEY, AttributeValue::S(user_id.to_string()))
            .send()
            .await
            .map_err(StoreError::new)?;
        Ok(output.item().cloned())
    }
}

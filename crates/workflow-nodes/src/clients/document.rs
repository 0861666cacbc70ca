//! Document database client seam
//!
//! Filters, updates, and pipelines are MongoDB-style JSON documents
//! (relaxed extended JSON for special types).

use async_trait::async_trait;
use node_engine::{Closeable, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Options applied to `find`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FindOptions {
    pub limit: Option<i64>,
    pub skip: Option<u64>,
    pub sort: Option<Value>,
    pub projection: Option<Value>,
}

/// Counts reported by an update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<Value>,
}

/// One open client, used for a single `execute` call
#[async_trait]
pub trait DocumentSession: Closeable {
    async fn find(&mut self, collection: &str, filter: &Value, options: &FindOptions) -> Result<Vec<Value>>;

    /// Insert documents, returning their ids in order
    async fn insert(&mut self, collection: &str, documents: &[Value]) -> Result<Vec<Value>>;

    async fn update(
        &mut self,
        collection: &str,
        filter: &Value,
        update: &Value,
        many: bool,
        upsert: bool,
    ) -> Result<UpdateOutcome>;

    /// Delete matching documents, returning how many were removed
    async fn delete(&mut self, collection: &str, filter: &Value, many: bool) -> Result<u64>;

    async fn aggregate(&mut self, collection: &str, pipeline: &[Value]) -> Result<Vec<Value>>;

    async fn count(&mut self, collection: &str, filter: &Value) -> Result<u64>;
}

/// Opens document sessions
#[async_trait]
pub trait DocumentConnector: Send + Sync {
    async fn connect(&self, uri: &str, database: &str) -> Result<Box<dyn DocumentSession>>;
}

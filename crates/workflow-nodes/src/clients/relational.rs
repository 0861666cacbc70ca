//! Relational database client seam

use async_trait::async_trait;
use node_engine::{Closeable, Result};
use serde_json::{Map, Value};

/// Rows returned by one query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRows {
    /// Column names, in select order
    pub fields: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

/// One open connection, used for a single `execute` call
#[async_trait]
pub trait RelationalSession: Closeable {
    /// Run a parameterized statement (`$1`, `$2`, ... placeholders)
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryRows>;
}

/// Opens relational sessions
#[async_trait]
pub trait RelationalConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn RelationalSession>>;
}

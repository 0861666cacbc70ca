//! Database clients consumed by the database nodes
//!
//! Nodes depend on the connector traits only. Real drivers live behind
//! the `postgres` and `mongodb` features; without them the default
//! connector fails every connect with a message naming the feature.

mod document;
mod relational;

#[cfg(feature = "mongodb")]
mod mongo;
#[cfg(feature = "postgres")]
mod postgres;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use node_engine::{NodeEngineError, Result};

pub use document::{DocumentConnector, DocumentSession, FindOptions, UpdateOutcome};
pub use relational::{QueryRows, RelationalConnector, RelationalSession};

#[cfg(feature = "mongodb")]
pub use mongo::MongoConnector;
#[cfg(feature = "postgres")]
pub use postgres::PgConnector;

/// Connector for a driver that was not compiled in
#[derive(Debug, Clone, Copy)]
pub struct UnavailableConnector {
    feature: &'static str,
}

impl UnavailableConnector {
    pub fn new(feature: &'static str) -> Self {
        Self { feature }
    }

    fn error(&self) -> NodeEngineError {
        NodeEngineError::connection(format!(
            "no driver available; rebuild workflow-nodes with the `{}` feature",
            self.feature
        ))
    }
}

#[async_trait]
impl RelationalConnector for UnavailableConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn RelationalSession>> {
        Err(self.error())
    }
}

#[async_trait]
impl DocumentConnector for UnavailableConnector {
    async fn connect(&self, _uri: &str, _database: &str) -> Result<Box<dyn DocumentSession>> {
        Err(self.error())
    }
}

/// The relational connector used by `postgresql-query` unless one is injected
pub fn default_relational_connector() -> Arc<dyn RelationalConnector> {
    #[cfg(feature = "postgres")]
    {
        Arc::new(PgConnector)
    }
    #[cfg(not(feature = "postgres"))]
    {
        Arc::new(UnavailableConnector::new("postgres"))
    }
}

/// The document connector used by `mongodb-operations` unless one is injected
pub fn default_document_connector() -> Arc<dyn DocumentConnector> {
    #[cfg(feature = "mongodb")]
    {
        Arc::new(MongoConnector)
    }
    #[cfg(not(feature = "mongodb"))]
    {
        Arc::new(UnavailableConnector::new("mongodb"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unavailable_connector_is_connection_error() {
        let connector = UnavailableConnector::new("postgres");
        let err = RelationalConnector::connect(&connector, "postgres://localhost/db")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, NodeEngineError::Connection(_)));
        assert!(err.to_string().contains("`postgres` feature"));
    }
}

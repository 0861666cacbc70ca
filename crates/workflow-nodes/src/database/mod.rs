//! Database nodes
//!
//! Nodes that open a client per call, run one operation, and close it.

mod mongodb_operations;
mod postgres_query;

use std::future::Future;
use std::time::Duration;

use node_engine::{retry_with_backoff, NodeEngineError, Result, RetryPolicy};

pub use mongodb_operations::{
    MongoOperation, MongoOperationsConfig, MongoOperationsInput, MongoOperationsNode, MongoOperationsOutput,
};
pub use postgres_query::{PostgresQueryConfig, PostgresQueryInput, PostgresQueryNode, PostgresQueryOutput};

/// Connect with retry, bounding each attempt by `timeout`
async fn connect_with_retry<S, F, Fut>(policy: &RetryPolicy, label: &str, timeout: Duration, mut connect: F) -> Result<S>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S>>,
{
    retry_with_backoff(policy, label, || {
        let attempt = connect();
        async move {
            tokio::time::timeout(timeout, attempt)
                .await
                .map_err(|_| NodeEngineError::Timeout(timeout.as_millis() as u64))?
        }
    })
    .await
}

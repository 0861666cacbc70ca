//! Workflow Nodes
//!
//! Built-in node implementations for the node engine. Every node here
//! registers itself with `inventory`, so `NodeRegistry::with_builtins()`
//! picks all of them up.
//!
//! # Categories
//!
//! - **Database**: `postgresql-query`, `mongodb-operations`
//! - **Transformation**: `data-filter`, `field-mapper`
//!
//! Database nodes reach their servers through the connector traits in
//! [`clients`]. The real drivers sit behind the `postgres` and `mongodb`
//! features; [`register_database_nodes`] swaps in other connectors.

pub mod clients;
pub mod database;
pub mod processing;

use std::sync::Arc;

use node_engine::{into_dyn, NodeEngineError, NodeRegistry, Result};
use serde::de::DeserializeOwned;

pub use clients::{DocumentConnector, RelationalConnector};
pub use database::*;
pub use processing::*;

fn decode_config<C: DeserializeOwned>(node_type: &str, config: serde_json::Value) -> Result<C> {
    let config = if config.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        config
    };
    serde_json::from_value(config).map_err(|e| NodeEngineError::invalid_config(node_type, e.to_string()))
}

/// Register the database nodes with explicit connectors
///
/// Replaces the inventory entries of the same types, keeping their
/// descriptors.
pub fn register_database_nodes(
    registry: &mut NodeRegistry,
    relational: Arc<dyn RelationalConnector>,
    document: Arc<dyn DocumentConnector>,
) {
    registry.register_with::<PostgresQueryNode, _>(PostgresQueryNode::NODE_TYPE, move |config| {
        let config = decode_config(PostgresQueryNode::NODE_TYPE, config)?;
        Ok(into_dyn(PostgresQueryNode::with_connector(config, relational.clone())))
    });
    registry.register_with::<MongoOperationsNode, _>(MongoOperationsNode::NODE_TYPE, move |config| {
        let config = decode_config(MongoOperationsNode::NODE_TYPE, config)?;
        Ok(into_dyn(MongoOperationsNode::with_connector(config, document.clone())))
    });
}

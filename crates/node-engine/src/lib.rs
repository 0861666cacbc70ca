//! Node Engine - pluggable processing nodes for data pipelines
//!
//! This crate defines what a node is and how nodes are found, described,
//! and checked against each other:
//!
//! - [`Node`] / [`DynNode`]: the execution contract. Every call returns an
//!   [`ExecutionResult`] envelope; failures never escape as panics or errors.
//! - [`NodeMetadata`]: static, serializable self-description (pins,
//!   compatibility rules, configuration hints, documentation).
//! - [`NodeRegistry`]: type string to factory mapping, with metadata lookup.
//! - [`CompatibilityValidator`]: can the output of one node type feed another?
//! - [`NodeTask`]: runs a node as a `graph_flow` task.
//! - [`messages`]: payloads for the task-distribution bus.
//!
//! # Example
//!
//! ```ignore
//! use node_engine::NodeRegistry;
//!
//! let registry = NodeRegistry::with_builtins();
//! let node = registry.create("data-filter", serde_json::json!({
//!     "conditions": [{"field": "age", "operator": "greater_than", "value": 18}]
//! }))?;
//! let result = node.execute(serde_json::json!({"data": rows}), None).await;
//! ```

pub mod compatibility;
pub mod descriptor;
pub mod error;
pub mod messages;
pub mod node;
pub mod registry;
pub mod session;
pub mod settings;
pub mod task;
pub mod types;

// Re-export key types
pub use compatibility::{
    CompatibilityCheck, CompatibilityIssue, CompatibilityLevel, CompatibilityReport,
    CompatibilityValidator, IssueSeverity, PinRef,
};
pub use descriptor::{
    CompatibilityRule, ConfigurationHints, FieldCondition, FieldTransformation, InputDescriptor,
    InputValidation, NodeDescriptor, NodeDocumentation, NodeMetadata, OutputDescriptor, PinSchema,
    TroubleshootingEntry, UsageExample,
};
pub use error::{NodeEngineError, Result};
pub use messages::{dispatch, TaskMessage, TaskResultMessage};
pub use node::{
    into_dyn, BoxedNode, DynNode, ExecutionMetrics, ExecutionPhase, ExecutionResult, ExecutionTimer,
    Node,
};
pub use registry::{build_node, NodeFactory, NodeRegistration, NodeRegistry};
pub use session::{retry_with_backoff, scoped, Closeable, RetryPolicy};
pub use settings::{merge_config, EngineConfig};
pub use task::{ContextKeys, NodeTask};
pub use types::{NodeCategory, NodeIdentity, PortDataType};

// Re-export graph-flow types that consumers will need
pub use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};

// Used by `inventory::submit!` in downstream crates
pub use inventory;

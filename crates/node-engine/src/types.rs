//! Core types shared by nodes, descriptors, and the registry
//!
//! These types define node identity and the semantic type tags carried
//! by input and output pins.

use serde::{Deserialize, Serialize};

/// The semantic type tag of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDataType {
    /// Accepts any type
    Any,
    /// Text string
    String,
    /// Numeric value
    Number,
    /// Boolean value
    Boolean,
    /// JSON object
    Object,
    /// JSON array
    Array,
}

impl PortDataType {
    /// Check if this type can connect to another type
    pub fn is_compatible_with(&self, other: &PortDataType) -> bool {
        // Any type is compatible with everything
        if matches!(self, PortDataType::Any) || matches!(other, PortDataType::Any) {
            return true;
        }

        self == other
    }

    /// Tag for a concrete JSON value. `null` maps to `Any`.
    pub fn of_value(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Any,
            serde_json::Value::Bool(_) => Self::Boolean,
            serde_json::Value::Number(_) => Self::Number,
            serde_json::Value::String(_) => Self::String,
            serde_json::Value::Array(_) => Self::Array,
            serde_json::Value::Object(_) => Self::Object,
        }
    }
}

impl std::fmt::Display for PortDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        };
        f.write_str(name)
    }
}

/// Category of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeCategory {
    /// Relational and document database access
    Database,
    /// Record filtering, mapping, and reshaping
    Transformation,
    /// Calls to third-party HTTP APIs
    ExternalApi,
    /// Email, chat, and push delivery
    Notification,
    /// File and object storage
    Storage,
    /// Branching and control flow
    Logic,
    /// Model inference and embeddings
    AiMl,
}

/// Identity triple of a node type
///
/// Fixed when the node type is defined. The `node_type` string is the
/// key for registry and compatibility lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeIdentity {
    /// Unique type identifier (e.g., "data-filter")
    pub node_type: String,
    /// Semantic version of the node implementation
    pub version: String,
    /// Category for grouping and tooling
    pub category: NodeCategory,
}

impl NodeIdentity {
    pub fn new(node_type: impl Into<String>, version: impl Into<String>, category: NodeCategory) -> Self {
        Self {
            node_type: node_type.into(),
            version: version.into(),
            category,
        }
    }
}

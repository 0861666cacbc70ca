//! Node descriptor trait and metadata types
//!
//! This module provides the `NodeDescriptor` trait that allows node types
//! to self-describe their metadata (pins, category, compatibility, docs).
//!
//! Metadata is produced without an instance, so tooling can enumerate
//! capabilities without side effects such as opening a connection.

use serde::{Deserialize, Serialize};

use crate::compatibility::CompatibilityLevel;
use crate::session::RetryPolicy;
use crate::types::{NodeCategory, NodeIdentity, PortDataType};

/// Trait for node types that can describe their metadata
///
/// # Example
///
/// ```ignore
/// use node_engine::{NodeDescriptor, NodeMetadata, InputDescriptor, OutputDescriptor};
/// use node_engine::{NodeCategory, PortDataType};
///
/// impl NodeDescriptor for MyNode {
///     fn descriptor() -> NodeMetadata {
///         NodeMetadata::new("my-node", "1.0.0", NodeCategory::Transformation)
///             .with_label("My Node")
///             .with_input(InputDescriptor::required("data", PortDataType::Array))
///             .with_output(OutputDescriptor::new("result", PortDataType::Array))
///     }
/// }
/// ```
pub trait NodeDescriptor {
    /// Get the static metadata for this node type
    fn descriptor() -> NodeMetadata
    where
        Self: Sized;
}

/// Complete metadata for a node type
///
/// Carries enough structure to render a node, validate its inputs, and
/// decide which nodes it can feed, without consulting its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    /// Unique type identifier (e.g., "data-filter")
    pub node_type: String,
    /// Semantic version
    pub version: String,
    /// Category for grouping
    pub category: NodeCategory,
    /// Human-readable label
    pub label: String,
    /// Description of what the node does
    pub description: String,
    /// Declared inputs
    pub inputs: Vec<InputDescriptor>,
    /// Declared outputs
    pub outputs: Vec<OutputDescriptor>,
    /// Compatibility rules with this node type as source
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compatibility: Vec<CompatibilityRule>,
    /// Configuration defaults and runtime hints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<ConfigurationHints>,
    /// Human documentation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<NodeDocumentation>,
}

impl NodeMetadata {
    /// Create metadata with empty pin lists
    pub fn new(node_type: impl Into<String>, version: impl Into<String>, category: NodeCategory) -> Self {
        let node_type = node_type.into();
        Self {
            label: node_type.clone(),
            node_type,
            version: version.into(),
            category,
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            compatibility: Vec::new(),
            configuration: None,
            documentation: None,
        }
    }

    /// Minimal descriptor synthesized from a live instance's identity
    pub fn minimal(identity: NodeIdentity) -> Self {
        Self::new(identity.node_type, identity.version, identity.category)
    }

    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(self.node_type.clone(), self.version.clone(), self.category)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_input(mut self, input: InputDescriptor) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: OutputDescriptor) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_rule(mut self, rule: CompatibilityRule) -> Self {
        self.compatibility.push(rule);
        self
    }

    pub fn with_configuration(mut self, configuration: ConfigurationHints) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub fn with_documentation(mut self, documentation: NodeDocumentation) -> Self {
        self.documentation = Some(documentation);
        self
    }

    /// Find a declared input by name
    pub fn input(&self, name: &str) -> Option<&InputDescriptor> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Find a declared output by name
    pub fn output(&self, name: &str) -> Option<&OutputDescriptor> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

/// A declared input pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDescriptor {
    /// Pin name (matches the input field name)
    pub name: String,
    /// Semantic type tag
    pub data_type: PortDataType,
    /// Whether this input must be supplied
    pub required: bool,
    /// What the input carries
    #[serde(default)]
    pub description: String,
    /// Value used when the input is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Constraints a generic validator can enforce
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<InputValidation>,
}

impl InputDescriptor {
    /// Create a required input
    pub fn required(name: impl Into<String>, data_type: PortDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            required: true,
            description: String::new(),
            default: None,
            validation: None,
        }
    }

    /// Create an optional input
    pub fn optional(name: impl Into<String>, data_type: PortDataType) -> Self {
        Self {
            required: false,
            ..Self::required(name, data_type)
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_validation(mut self, validation: InputValidation) -> Self {
        self.validation = Some(validation);
        self
    }
}

/// Constraints attached to an input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<serde_json::Value>,
}

/// A declared output pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDescriptor {
    /// Pin name (matches the output field name)
    pub name: String,
    /// Semantic type tag
    pub data_type: PortDataType,
    /// What the output carries
    #[serde(default)]
    pub description: String,
    /// Shape of the produced value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<PinSchema>,
}

impl OutputDescriptor {
    pub fn new(name: impl Into<String>, data_type: PortDataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            description: String::new(),
            schema: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_schema(mut self, schema: PinSchema) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Shape declared for a pin
///
/// Only `type` takes part in compatibility checks; the remaining fields
/// are documentation for tooling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<PortDataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PinSchema>>,
}

impl PinSchema {
    pub fn of(schema_type: PortDataType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::default()
        }
    }

    /// Array schema with the given item schema
    pub fn array_of(items: PinSchema) -> Self {
        Self {
            schema_type: Some(PortDataType::Array),
            items: Some(Box::new(items)),
            ..Self::default()
        }
    }
}

/// Compatibility of one output pin of this node with an input pin of `target_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityRule {
    pub target_type: String,
    pub output_pin: String,
    pub target_input_pin: String,
    pub compatibility_level: CompatibilityLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<FieldCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformations: Vec<FieldTransformation>,
    /// Explanation shown by `CompatibilityValidator::details`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CompatibilityRule {
    pub fn new(
        target_type: impl Into<String>,
        output_pin: impl Into<String>,
        target_input_pin: impl Into<String>,
        level: CompatibilityLevel,
    ) -> Self {
        Self {
            target_type: target_type.into(),
            output_pin: output_pin.into(),
            target_input_pin: target_input_pin.into(),
            compatibility_level: level,
            conditions: Vec::new(),
            transformations: Vec::new(),
            description: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn when(mut self, field: impl Into<String>, requirement: impl Into<String>) -> Self {
        self.conditions.push(FieldCondition {
            field: field.into(),
            requirement: requirement.into(),
        });
        self
    }

    pub fn transform(
        mut self,
        source_field: impl Into<String>,
        target_field: impl Into<String>,
        transformation: impl Into<String>,
    ) -> Self {
        self.transformations.push(FieldTransformation {
            source_field: source_field.into(),
            target_field: target_field.into(),
            transformation: transformation.into(),
        });
        self
    }
}

/// A requirement a field must meet for a conditional connection to work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCondition {
    pub field: String,
    pub requirement: String,
}

/// A suggested reshaping step between two pins
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTransformation {
    pub source_field: String,
    pub target_field: String,
    pub transformation: String,
}

/// Configuration defaults and runtime hints
///
/// Retry and timeout here are hints; enforcement belongs to the node or
/// the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationHints {
    /// Defaults merged under caller-supplied configuration
    #[serde(default)]
    pub defaults: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Human documentation for a node type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDocumentation {
    pub purpose: String,
    #[serde(default)]
    pub examples: Vec<UsageExample>,
    #[serde(default)]
    pub limitations: Vec<String>,
    #[serde(default)]
    pub troubleshooting: Vec<TroubleshootingEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageExample {
    pub title: String,
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TroubleshootingEntry {
    pub problem: String,
    pub solution: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_descriptor_required() {
        let input = InputDescriptor::required("data", PortDataType::Array);
        assert_eq!(input.name, "data");
        assert!(input.required);
        assert!(input.default.is_none());
    }

    #[test]
    fn test_input_descriptor_optional_with_default() {
        let input = InputDescriptor::optional("limit", PortDataType::Number).with_default(json!(10));
        assert!(!input.required);
        assert_eq!(input.default, Some(json!(10)));
    }

    #[test]
    fn test_minimal_has_no_pins() {
        let meta = NodeMetadata::minimal(NodeIdentity::new("x", "0.1.0", NodeCategory::Logic));
        assert_eq!(meta.node_type, "x");
        assert_eq!(meta.label, "x");
        assert!(meta.inputs.is_empty());
        assert!(meta.outputs.is_empty());
        assert!(meta.compatibility.is_empty());
    }

    #[test]
    fn test_metadata_serialization() {
        let meta = NodeMetadata::new("test-node", "1.0.0", NodeCategory::Transformation)
            .with_input(InputDescriptor::required("data", PortDataType::Array))
            .with_output(
                OutputDescriptor::new("filtered", PortDataType::Array)
                    .with_schema(PinSchema::array_of(PinSchema::of(PortDataType::Object))),
            );

        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["nodeType"], "test-node"); // camelCase
        assert_eq!(value["category"], "transformation");
        assert_eq!(value["outputs"][0]["schema"]["type"], "array");
        assert_eq!(value["outputs"][0]["schema"]["items"]["type"], "object");
        assert!(value.get("compatibility").is_none());

        let back: NodeMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_rule_builder() {
        let rule = CompatibilityRule::new("field-mapper", "rows", "data", CompatibilityLevel::Conditional)
            .when("rows", "must contain objects")
            .transform("rows", "data", "rename");
        assert_eq!(rule.conditions.len(), 1);
        assert_eq!(rule.transformations[0].transformation, "rename");
    }
}

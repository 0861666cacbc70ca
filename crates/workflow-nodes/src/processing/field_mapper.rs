//! Field Mapper Node
//!
//! Reshapes a record, or every record of an array, by copying source
//! fields to target fields through a transformation.

use std::sync::Arc;

use async_trait::async_trait;
use node_engine::{
    build_node, CompatibilityLevel, CompatibilityRule, ConfigurationHints, Context, ExecutionResult,
    ExecutionTimer, InputDescriptor, Node, NodeCategory, NodeDescriptor, NodeDocumentation,
    NodeEngineError, NodeIdentity, NodeMetadata, NodeRegistration, OutputDescriptor, PortDataType,
    Result, TroubleshootingEntry, UsageExample,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::expression::{CompiledExpression, ExpressionEngine};
use super::json_path::{get_path, remove_path, set_path};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transformation {
    #[default]
    Rename,
    Uppercase,
    Lowercase,
    Trim,
    ToNumber,
    ToString,
    ToBoolean,
    /// Sandboxed expression from `FieldMapping::expression`
    Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub source_field: String,
    pub target_field: String,
    #[serde(default)]
    pub transformation: Transformation,
    /// Used when the source field is missing or null
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>, transformation: Transformation) -> Self {
        Self {
            source_field: source.into(),
            target_field: target.into(),
            transformation,
            default_value: None,
            expression: None,
        }
    }
}

/// What to do when a transformation fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Fail the whole call, naming the field
    #[default]
    Fail,
    /// Write the untransformed value and log a warning
    PassThrough,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldMapperConfig {
    pub mappings: Vec<FieldMapping>,
    /// Copy fields no mapping consumes
    pub keep_unmapped: bool,
    pub on_error: OnError,
}

/// Field Mapper Node
///
/// Input and output are a single object or an array of objects.
pub struct FieldMapperNode {
    config: FieldMapperConfig,
    engine: Arc<ExpressionEngine>,
    /// Compiled expression per mapping index
    expressions: Vec<Option<CompiledExpression>>,
}

impl FieldMapperNode {
    pub const NODE_TYPE: &'static str = "field-mapper";
    /// Port ID for the record(s) to map; carries the whole input
    pub const PORT_PAYLOAD: &'static str = node_engine::task::PAYLOAD_PORT;
    /// Port ID for the mapped record(s)
    pub const PORT_MAPPED: &'static str = "mapped";

    /// Build a mapper, compiling every expression mapping up front
    pub fn new(config: FieldMapperConfig) -> Result<Self> {
        let engine = Arc::new(ExpressionEngine::new());
        let mut expressions = Vec::with_capacity(config.mappings.len());

        for mapping in &config.mappings {
            if mapping.target_field.is_empty() {
                return Err(NodeEngineError::invalid_config(Self::NODE_TYPE, "targetField cannot be empty"));
            }
            let compiled = match (mapping.transformation, &mapping.expression) {
                (Transformation::Expression, Some(source)) => Some(
                    engine
                        .compile(source)
                        .map_err(|e| NodeEngineError::invalid_config(Self::NODE_TYPE, e.to_string()))?,
                ),
                (Transformation::Expression, None) => {
                    return Err(NodeEngineError::invalid_config(
                        Self::NODE_TYPE,
                        format!("mapping for '{}' needs an expression", mapping.target_field),
                    ))
                }
                _ => None,
            };
            expressions.push(compiled);
        }

        Ok(Self {
            config,
            engine,
            expressions,
        })
    }

    /// Map one record
    pub fn map_record(&self, record: &Map<String, Value>) -> Result<Map<String, Value>> {
        let whole = Value::Object(record.clone());
        let mut output = if self.config.keep_unmapped {
            let mut rest = record.clone();
            for mapping in &self.config.mappings {
                remove_path(&mut rest, &mapping.source_field);
            }
            rest
        } else {
            Map::new()
        };

        for (mapping, compiled) in self.config.mappings.iter().zip(&self.expressions) {
            let source = get_path(&whole, &mapping.source_field)
                .filter(|v| !v.is_null())
                .cloned()
                .or_else(|| mapping.default_value.clone());
            let Some(source) = source else {
                continue;
            };

            let value = match self.transform(mapping, compiled.as_ref(), &source, &whole) {
                Ok(value) => value,
                Err(e) if self.config.on_error == OnError::PassThrough => {
                    log::warn!(
                        "FieldMapper: passing '{}' through untransformed: {}",
                        mapping.source_field,
                        e
                    );
                    source
                }
                Err(e) => {
                    return Err(NodeEngineError::operation(format!(
                        "Failed to map field '{}' to '{}': {}",
                        mapping.source_field, mapping.target_field, e
                    )))
                }
            };

            set_path(&mut output, &mapping.target_field, value).map_err(NodeEngineError::operation)?;
        }

        Ok(output)
    }

    fn transform(
        &self,
        mapping: &FieldMapping,
        compiled: Option<&CompiledExpression>,
        value: &Value,
        record: &Value,
    ) -> Result<Value> {
        match mapping.transformation {
            Transformation::Rename => Ok(value.clone()),
            Transformation::Uppercase => with_str(value, |s| s.to_uppercase()),
            Transformation::Lowercase => with_str(value, |s| s.to_lowercase()),
            Transformation::Trim => with_str(value, |s| s.trim().to_string()),
            Transformation::ToNumber => to_number(value),
            Transformation::ToString => Ok(Value::String(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })),
            Transformation::ToBoolean => to_boolean(value),
            Transformation::Expression => {
                let compiled = compiled.ok_or_else(|| NodeEngineError::Expression("missing expression".into()))?;
                self.engine.evaluate(compiled, value, record)
            }
        }
    }

    fn map_input(&self, input: &Value) -> Result<(Value, u64)> {
        match input {
            Value::Object(record) => Ok((Value::Object(self.map_record(record)?), 1)),
            Value::Array(records) => {
                let mut mapped = Vec::with_capacity(records.len());
                for (index, record) in records.iter().enumerate() {
                    let record = record.as_object().ok_or_else(|| {
                        NodeEngineError::invalid_input(format!("Record at index {} is not an object", index))
                    })?;
                    mapped.push(Value::Object(self.map_record(record)?));
                }
                Ok((Value::Array(mapped), records.len() as u64))
            }
            other => Err(NodeEngineError::invalid_input(format!(
                "Expected an object or an array of objects, got {}",
                PortDataType::of_value(other)
            ))),
        }
    }
}

fn with_str(value: &Value, f: impl FnOnce(&str) -> String) -> Result<Value> {
    value
        .as_str()
        .map(|s| Value::String(f(s)))
        .ok_or_else(|| NodeEngineError::invalid_input(format!("expected a string, got {}", PortDataType::of_value(value))))
}

fn to_number(value: &Value) -> Result<Value> {
    match value {
        Value::Number(_) => Ok(value.clone()),
        Value::Bool(b) => Ok(json!(u8::from(*b))),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(json!(i));
            }
            s.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| NodeEngineError::invalid_input(format!("'{}' is not a number", s)))
        }
        other => Err(NodeEngineError::invalid_input(format!(
            "cannot convert {} to a number",
            PortDataType::of_value(other)
        ))),
    }
}

fn to_boolean(value: &Value) -> Result<Value> {
    match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(Value::Bool(false)),
            other => Err(NodeEngineError::invalid_input(format!("'{}' is not a boolean", other))),
        },
        other => Err(NodeEngineError::invalid_input(format!(
            "cannot convert {} to a boolean",
            PortDataType::of_value(other)
        ))),
    }
}

impl NodeDescriptor for FieldMapperNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new(Self::NODE_TYPE, "1.0.0", NodeCategory::Transformation)
            .with_label("Field Mapper")
            .with_description("Renames and converts record fields")
            .with_input(
                InputDescriptor::required(Self::PORT_PAYLOAD, PortDataType::Any)
                    .describe("A record object or an array of record objects"),
            )
            .with_output(
                OutputDescriptor::new(Self::PORT_MAPPED, PortDataType::Any)
                    .describe("Mapped record(s), same shape as the input"),
            )
            .with_rule(
                CompatibilityRule::new("postgresql-query", Self::PORT_MAPPED, "parameters", CompatibilityLevel::Conditional)
                    .describe("Mapped fields can become query parameters when their order matches the placeholders")
                    .when("parameters", "ordered to match $1..$n placeholders"),
            )
            .with_rule(
                CompatibilityRule::new("mongodb-operations", Self::PORT_MAPPED, "documents", CompatibilityLevel::Full)
                    .describe("Mapped records insert directly as documents"),
            )
            .with_rule(
                CompatibilityRule::new("data-filter", Self::PORT_MAPPED, "data", CompatibilityLevel::Partial)
                    .describe("Only array-shaped mapper output can be filtered")
                    .when("mapped", "must be an array of records"),
            )
            .with_rule(
                CompatibilityRule::new(Self::NODE_TYPE, Self::PORT_MAPPED, Self::PORT_PAYLOAD, CompatibilityLevel::Full)
                    .describe("Mappers chain directly"),
            )
            .with_configuration(ConfigurationHints {
                defaults: json!({"keepUnmapped": false, "onError": "fail"})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
                ..ConfigurationHints::default()
            })
            .with_documentation(NodeDocumentation {
                purpose: "Rename fields and convert their values between pipeline stages".to_string(),
                examples: vec![UsageExample {
                    title: "Snake case to camel case".to_string(),
                    input: json!({"first_name": "John"}),
                    config: Some(json!({
                        "mappings": [{"sourceField": "first_name", "targetField": "firstName", "transformation": "rename"}]
                    })),
                }],
                limitations: vec![
                    "Expressions are single Rhai expressions; statements and imports are rejected".to_string(),
                    "Target paths cannot contain array indices".to_string(),
                ],
                troubleshooting: vec![TroubleshootingEntry {
                    problem: "A conversion error fails the whole call".to_string(),
                    solution: "Set `onError` to `pass_through` to keep the original value instead".to_string(),
                }],
            })
    }
}

inventory::submit! {
    NodeRegistration {
        node_type: FieldMapperNode::NODE_TYPE,
        descriptor: <FieldMapperNode as NodeDescriptor>::descriptor,
        factory: build_node::<FieldMapperNode>,
    }
}

#[async_trait]
impl Node for FieldMapperNode {
    type Config = FieldMapperConfig;
    type Input = Value;
    type Output = Value;

    fn from_config(config: FieldMapperConfig) -> Result<Self> {
        Self::new(config)
    }

    fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(Self::NODE_TYPE, "1.0.0", NodeCategory::Transformation)
    }

    fn config(&self) -> &FieldMapperConfig {
        &self.config
    }

    fn validate(&self, input: &Value) -> bool {
        match input {
            Value::Object(_) => true,
            Value::Array(records) => records.iter().all(Value::is_object),
            _ => false,
        }
    }

    async fn execute(&self, input: Value, _context: Option<&Context>) -> ExecutionResult<Value> {
        let timer = ExecutionTimer::start();
        match self.map_input(&input) {
            Ok((mapped, records)) => {
                log::debug!("FieldMapper: mapped {} records", records);
                ExecutionResult::ok(mapped, timer.finish(records))
            }
            Err(e) => ExecutionResult::failed_after(e, timer.finish(0)),
        }
    }
}

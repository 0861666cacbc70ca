//! Data Filter Node
//!
//! Keeps the records of an array that satisfy a list of field conditions,
//! combined with `and` or `or` logic.

use async_trait::async_trait;
use node_engine::{
    build_node, CompatibilityLevel, CompatibilityRule, ConfigurationHints, Context, ExecutionResult,
    ExecutionTimer, InputDescriptor, Node, NodeCategory, NodeDescriptor, NodeDocumentation,
    NodeIdentity, NodeMetadata, NodeRegistration, OutputDescriptor, PinSchema, PortDataType,
    TroubleshootingEntry, UsageExample,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::json_path::get_path;

/// Comparison applied to one record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Exists,
    NotExists,
}

/// How conditions combine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterLogic {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Dotted path into the record
    pub field: String,
    pub operator: FilterOperator,
    /// Comparison operand; unused by `exists`/`not_exists`
    #[serde(default)]
    pub value: Value,
}

impl FilterCondition {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataFilterConfig {
    pub conditions: Vec<FilterCondition>,
    pub logic: FilterLogic,
    /// Applies to string comparisons only
    pub case_sensitive: bool,
}

impl Default for DataFilterConfig {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            logic: FilterLogic::And,
            case_sensitive: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataFilterInput {
    pub data: Vec<Value>,
    /// Replaces the configured conditions for this call
    #[serde(default)]
    pub conditions: Option<Vec<FilterCondition>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFilterOutput {
    pub filtered: Vec<Value>,
    pub filtered_count: u64,
    pub original_count: u64,
}

/// Data Filter Node
///
/// An empty condition list keeps every record.
pub struct DataFilterNode {
    config: DataFilterConfig,
}

impl DataFilterNode {
    pub const NODE_TYPE: &'static str = "data-filter";
    /// Port ID for the records input
    pub const PORT_DATA: &'static str = "data";
    /// Port ID for the per-call conditions input
    pub const PORT_CONDITIONS: &'static str = "conditions";
    /// Port ID for the kept records
    pub const PORT_FILTERED: &'static str = "filtered";

    pub fn new(config: DataFilterConfig) -> Self {
        Self { config }
    }

    /// Apply conditions to `data`
    pub fn filter(&self, data: Vec<Value>, conditions: &[FilterCondition]) -> DataFilterOutput {
        let original_count = data.len() as u64;
        let filtered: Vec<Value> = data
            .into_iter()
            .filter(|record| self.matches(record, conditions))
            .collect();
        DataFilterOutput {
            filtered_count: filtered.len() as u64,
            original_count,
            filtered,
        }
    }

    fn matches(&self, record: &Value, conditions: &[FilterCondition]) -> bool {
        if conditions.is_empty() {
            return true;
        }
        let mut results = conditions.iter().map(|c| self.evaluate(record, c));
        match self.config.logic {
            FilterLogic::And => results.all(|r| r),
            FilterLogic::Or => results.any(|r| r),
        }
    }

    fn evaluate(&self, record: &Value, condition: &FilterCondition) -> bool {
        let field = get_path(record, &condition.field).filter(|v| !v.is_null());
        let expected = &condition.value;
        let case_sensitive = self.config.case_sensitive;

        match condition.operator {
            FilterOperator::Exists => field.is_some(),
            FilterOperator::NotExists => field.is_none(),
            FilterOperator::Equals => field.is_some_and(|v| loose_eq(v, expected, case_sensitive)),
            FilterOperator::NotEquals => !field.is_some_and(|v| loose_eq(v, expected, case_sensitive)),
            FilterOperator::GreaterThan => compare(field, expected, case_sensitive).is_some_and(|o| o.is_gt()),
            FilterOperator::LessThan => compare(field, expected, case_sensitive).is_some_and(|o| o.is_lt()),
            FilterOperator::GreaterThanOrEqual => compare(field, expected, case_sensitive).is_some_and(|o| o.is_ge()),
            FilterOperator::LessThanOrEqual => compare(field, expected, case_sensitive).is_some_and(|o| o.is_le()),
            FilterOperator::Contains => field.is_some_and(|v| contains(v, expected, case_sensitive)),
            FilterOperator::NotContains => !field.is_some_and(|v| contains(v, expected, case_sensitive)),
            FilterOperator::StartsWith => {
                string_pair(field, expected, case_sensitive).is_some_and(|(v, e)| v.starts_with(&e))
            }
            FilterOperator::EndsWith => {
                string_pair(field, expected, case_sensitive).is_some_and(|(v, e)| v.ends_with(&e))
            }
            FilterOperator::In => field.is_some_and(|v| one_of(v, expected, case_sensitive)),
            FilterOperator::NotIn => !field.is_some_and(|v| one_of(v, expected, case_sensitive)),
        }
    }
}

fn normalize(s: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        s.to_string()
    } else {
        s.to_lowercase()
    }
}

/// Numbers compare numerically, strings honor case sensitivity
fn loose_eq(actual: &Value, expected: &Value, case_sensitive: bool) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::String(b)) => normalize(a, case_sensitive) == normalize(b, case_sensitive),
        _ => actual == expected,
    }
}

fn compare(actual: Option<&Value>, expected: &Value, case_sensitive: bool) -> Option<std::cmp::Ordering> {
    match (actual?, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(normalize(a, case_sensitive).cmp(&normalize(b, case_sensitive))),
        _ => None,
    }
}

fn contains(actual: &Value, expected: &Value, case_sensitive: bool) -> bool {
    match (actual, expected) {
        (Value::String(haystack), Value::String(needle)) => {
            normalize(haystack, case_sensitive).contains(&normalize(needle, case_sensitive))
        }
        (Value::Array(items), _) => items.iter().any(|i| loose_eq(i, expected, case_sensitive)),
        _ => false,
    }
}

fn one_of(actual: &Value, expected: &Value, case_sensitive: bool) -> bool {
    match expected {
        Value::Array(candidates) => candidates.iter().any(|c| loose_eq(actual, c, case_sensitive)),
        _ => false,
    }
}

fn string_pair(actual: Option<&Value>, expected: &Value, case_sensitive: bool) -> Option<(String, String)> {
    match (actual?, expected) {
        (Value::String(a), Value::String(b)) => Some((normalize(a, case_sensitive), normalize(b, case_sensitive))),
        _ => None,
    }
}

impl NodeDescriptor for DataFilterNode {
    fn descriptor() -> NodeMetadata {
        NodeMetadata::new(Self::NODE_TYPE, "1.0.0", NodeCategory::Transformation)
            .with_label("Data Filter")
            .with_description("Keeps array records that match field conditions")
            .with_input(
                InputDescriptor::required(Self::PORT_DATA, PortDataType::Array)
                    .describe("Records to filter"),
            )
            .with_input(
                InputDescriptor::optional(Self::PORT_CONDITIONS, PortDataType::Array)
                    .describe("Conditions overriding the configured ones"),
            )
            .with_output(
                OutputDescriptor::new(Self::PORT_FILTERED, PortDataType::Array)
                    .describe("Records that passed every condition (or any, with `or` logic)")
                    .with_schema(PinSchema::array_of(PinSchema::of(PortDataType::Object))),
            )
            .with_output(OutputDescriptor::new("filtered_count", PortDataType::Number))
            .with_output(OutputDescriptor::new("original_count", PortDataType::Number))
            .with_rule(
                CompatibilityRule::new("postgresql-query", Self::PORT_FILTERED, "parameters", CompatibilityLevel::Partial)
                    .describe("Filtered records can feed query parameters after reshaping")
                    .transform("filtered", "parameters", "flatten_values"),
            )
            .with_rule(
                CompatibilityRule::new("mongodb-operations", Self::PORT_FILTERED, "documents", CompatibilityLevel::Partial)
                    .describe("Filtered records can be inserted as documents when they carry no reserved keys")
                    .when("_id", "must be unique or absent"),
            )
            .with_rule(
                CompatibilityRule::new(Self::NODE_TYPE, Self::PORT_FILTERED, Self::PORT_DATA, CompatibilityLevel::Full)
                    .describe("Filters chain directly"),
            )
            .with_rule(
                CompatibilityRule::new("field-mapper", Self::PORT_FILTERED, "payload", CompatibilityLevel::Full)
                    .describe("Filtered records map field by field"),
            )
            .with_configuration(ConfigurationHints {
                defaults: json!({"logic": "and", "caseSensitive": true})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
                ..ConfigurationHints::default()
            })
            .with_documentation(NodeDocumentation {
                purpose: "Select records by comparing fields against literal values".to_string(),
                examples: vec![UsageExample {
                    title: "Adults only".to_string(),
                    input: json!({"data": [{"age": 25}, {"age": 31}, {"age": 40}]}),
                    config: Some(json!({
                        "conditions": [{"field": "age", "operator": "greater_than", "value": 30}]
                    })),
                }],
                limitations: vec![
                    "Ordering comparisons only apply to number/number and string/string pairs".to_string(),
                ],
                troubleshooting: vec![TroubleshootingEntry {
                    problem: "Nothing matches a nested field".to_string(),
                    solution: "Use a dotted path such as `address.city`".to_string(),
                }],
            })
    }
}

inventory::submit! {
    NodeRegistration {
        node_type: DataFilterNode::NODE_TYPE,
        descriptor: <DataFilterNode as NodeDescriptor>::descriptor,
        factory: build_node::<DataFilterNode>,
    }
}

#[async_trait]
impl Node for DataFilterNode {
    type Config = DataFilterConfig;
    type Input = DataFilterInput;
    type Output = DataFilterOutput;

    fn from_config(config: DataFilterConfig) -> node_engine::Result<Self> {
        Ok(Self::new(config))
    }

    fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(Self::NODE_TYPE, "1.0.0", NodeCategory::Transformation)
    }

    fn config(&self) -> &DataFilterConfig {
        &self.config
    }

    fn validate(&self, input: &DataFilterInput) -> bool {
        input
            .conditions
            .as_ref()
            .unwrap_or(&self.config.conditions)
            .iter()
            .all(|c| !c.field.is_empty())
    }

    async fn execute(&self, input: DataFilterInput, _context: Option<&Context>) -> ExecutionResult<DataFilterOutput> {
        let timer = ExecutionTimer::start();
        let conditions = input.conditions.unwrap_or_else(|| self.config.conditions.clone());
        if conditions.iter().any(|c| c.field.is_empty()) {
            return ExecutionResult::failed_after("Condition field cannot be empty", timer.finish(0));
        }

        let output = self.filter(input.data, &conditions);
        log::debug!(
            "DataFilter: kept {} of {} records",
            output.filtered_count,
            output.original_count
        );
        let count = output.filtered_count;
        ExecutionResult::ok(output, timer.finish(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use node_engine::NodeRegistry;

    fn node(config: Value) -> node_engine::BoxedNode {
        build_node::<DataFilterNode>(config).unwrap()
    }

    fn people() -> Value {
        json!([
            {"name": "Ann", "age": 25, "city": "Oslo", "tags": ["admin"]},
            {"name": "bob", "age": 31, "city": "Bergen", "tags": []},
            {"name": "Cid", "age": 40, "tags": ["ops", "admin"]}
        ])
    }

    #[test]
    fn test_descriptor() {
        let meta = DataFilterNode::descriptor();
        assert_eq!(meta.node_type, "data-filter");
        assert_eq!(meta.category, NodeCategory::Transformation);
        assert!(meta.input("data").unwrap().required);
        assert_eq!(meta.compatibility.len(), 4);
    }

    #[tokio::test]
    async fn test_greater_than_filter() {
        let node = node(json!({
            "conditions": [{"field": "age", "operator": "greater_than", "value": 30}]
        }));
        let result = node
            .execute(json!({"data": [{"age": 25}, {"age": 31}, {"age": 40}]}), None)
            .await;

        assert!(result.success);
        let data = result.data.clone().unwrap();
        assert_eq!(data["filtered"], json!([{"age": 31}, {"age": 40}]));
        assert_eq!(data["filtered_count"], 2);
        assert_eq!(data["original_count"], 3);
        assert_eq!(result.records_processed(), 2);
    }

    #[test]
    fn test_or_logic() {
        let filter = DataFilterNode::new(DataFilterConfig {
            logic: FilterLogic::Or,
            ..DataFilterConfig::default()
        });
        let conditions = vec![
            FilterCondition::new("age", FilterOperator::LessThan, json!(30)),
            FilterCondition::new("city", FilterOperator::NotExists, Value::Null),
        ];
        let data: Vec<Value> = serde_json::from_value(people()).unwrap();
        let output = filter.filter(data, &conditions);
        let names: Vec<&str> = output.filtered.iter().filter_map(|r| r["name"].as_str()).collect();
        assert_eq!(names, vec!["Ann", "Cid"]);
    }

    #[test]
    fn test_case_insensitive_strings() {
        let conditions = vec![FilterCondition::new("name", FilterOperator::StartsWith, json!("B"))];
        let data: Vec<Value> = serde_json::from_value(people()).unwrap();

        let strict = DataFilterNode::new(DataFilterConfig::default());
        assert_eq!(strict.filter(data.clone(), &conditions).filtered_count, 0);

        let relaxed = DataFilterNode::new(DataFilterConfig {
            case_sensitive: false,
            ..DataFilterConfig::default()
        });
        assert_eq!(relaxed.filter(data, &conditions).filtered_count, 1);
    }

    #[test]
    fn test_string_ordering_honors_case_sensitivity() {
        let conditions = vec![FilterCondition::new("name", FilterOperator::GreaterThan, json!("b"))];
        let data: Vec<Value> = serde_json::from_value(people()).unwrap();

        let strict = DataFilterNode::new(DataFilterConfig::default());
        let output = strict.filter(data.clone(), &conditions);
        assert_eq!(output.filtered, vec![people()[1].clone()]);

        let relaxed = DataFilterNode::new(DataFilterConfig {
            case_sensitive: false,
            ..DataFilterConfig::default()
        });
        let names: Vec<String> = relaxed
            .filter(data, &conditions)
            .filtered
            .iter()
            .filter_map(|r| r["name"].as_str().map(String::from))
            .collect();
        assert_eq!(names, vec!["bob", "Cid"]);

        let at_most = vec![FilterCondition::new("name", FilterOperator::LessThanOrEqual, json!("ANN"))];
        let relaxed = DataFilterNode::new(DataFilterConfig {
            case_sensitive: false,
            ..DataFilterConfig::default()
        });
        let data: Vec<Value> = serde_json::from_value(people()).unwrap();
        assert_eq!(relaxed.filter(data, &at_most).filtered_count, 1);
    }

    #[test]
    fn test_membership_operators() {
        let filter = DataFilterNode::new(DataFilterConfig::default());
        let data: Vec<Value> = serde_json::from_value(people()).unwrap();

        let admins = vec![FilterCondition::new("tags", FilterOperator::Contains, json!("admin"))];
        assert_eq!(filter.filter(data.clone(), &admins).filtered_count, 2);

        let cities = vec![FilterCondition::new("city", FilterOperator::In, json!(["Oslo", "Paris"]))];
        assert_eq!(filter.filter(data.clone(), &cities).filtered_count, 1);

        let not_cities = vec![FilterCondition::new("city", FilterOperator::NotIn, json!(["Oslo"]))];
        assert_eq!(filter.filter(data, &not_cities).filtered_count, 2);
    }

    #[test]
    fn test_missing_field_never_orders() {
        let filter = DataFilterNode::new(DataFilterConfig::default());
        let data = vec![json!({"other": 1}), json!({"score": "high"})];
        let conditions = vec![FilterCondition::new("score", FilterOperator::GreaterThanOrEqual, json!(0))];
        assert_eq!(filter.filter(data, &conditions).filtered_count, 0);
    }

    #[tokio::test]
    async fn test_input_conditions_override_config() {
        let node = node(json!({
            "conditions": [{"field": "age", "operator": "greater_than", "value": 100}]
        }));
        let result = node
            .execute(
                json!({
                    "data": people(),
                    "conditions": [{"field": "address.city", "operator": "not_exists"}]
                }),
                None,
            )
            .await;
        assert_eq!(result.data.unwrap()["filtered_count"], 3);
    }

    #[tokio::test]
    async fn test_empty_conditions_keep_everything() {
        let result = node(json!({})).execute(json!({"data": people()}), None).await;
        assert_eq!(result.data.unwrap()["filtered_count"], 3);
    }

    #[test]
    fn test_validate() {
        let node = node(json!({}));
        assert!(node.validate(&json!({"data": []})));
        assert!(!node.validate(&json!({"data": {"not": "array"}})));
        assert!(!node.validate(&json!({"data": [], "conditions": [{"field": "", "operator": "exists"}]})));
        assert!(!node.validate(&Value::Null));
    }

    #[tokio::test]
    async fn test_execute_rejects_unknown_operator() {
        let result = node(json!({}))
            .execute(
                json!({"data": [], "conditions": [{"field": "a", "operator": "matches_regex"}]}),
                None,
            )
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Invalid input"));
    }

    #[test]
    fn test_unknown_operator_in_config() {
        assert!(build_node::<DataFilterNode>(json!({
            "conditions": [{"field": "a", "operator": "matches_regex"}]
        }))
        .is_err());
    }

    #[tokio::test]
    async fn test_registered_through_inventory() {
        let registry = NodeRegistry::with_builtins();
        let node = registry.create("data-filter", json!({})).unwrap();
        assert_eq!(node.identity().node_type, "data-filter");
    }
}

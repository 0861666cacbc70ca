//! MongoDB Operations Node
//!
//! Runs one CRUD, aggregate, or count operation per call on a fresh
//! client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use node_engine::{
    build_node, scoped, CompatibilityLevel, CompatibilityRule, ConfigurationHints, Context, ExecutionResult,
    ExecutionTimer, InputDescriptor, InputValidation, Node, NodeCategory, NodeDescriptor, NodeDocumentation,
    NodeEngineError, NodeIdentity, NodeMetadata, NodeRegistration, OutputDescriptor, PortDataType, Result,
    RetryPolicy, TroubleshootingEntry, UsageExample,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::connect_with_retry;
use crate::clients::{default_document_connector, DocumentConnector, DocumentSession, FindOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MongoOperation {
    Find,
    FindOne,
    InsertOne,
    InsertMany,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
    Aggregate,
    Count,
}

impl MongoOperation {
    pub const ALL: [MongoOperation; 10] = [
        Self::Find,
        Self::FindOne,
        Self::InsertOne,
        Self::InsertMany,
        Self::UpdateOne,
        Self::UpdateMany,
        Self::DeleteOne,
        Self::DeleteMany,
        Self::Aggregate,
        Self::Count,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::FindOne => "find_one",
            Self::InsertOne => "insert_one",
            Self::InsertMany => "insert_many",
            Self::UpdateOne => "update_one",
            Self::UpdateMany => "update_many",
            Self::DeleteOne => "delete_one",
            Self::DeleteMany => "delete_many",
            Self::Aggregate => "aggregate",
            Self::Count => "count",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MongoOperationsConfig {
    pub uri: String,
    pub database: String,
    /// Default collection when the input names none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    pub timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for MongoOperationsConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "test".to_string(),
            collection: None,
            timeout_ms: 30_000,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoOperationsInput {
    pub operation: MongoOperation,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub filter: Option<Value>,
    /// `insert_one`
    #[serde(default)]
    pub document: Option<Value>,
    /// `insert_many`
    #[serde(default)]
    pub documents: Option<Vec<Value>>,
    #[serde(default)]
    pub update: Option<Value>,
    #[serde(default)]
    pub pipeline: Option<Vec<Value>>,
    #[serde(default)]
    pub options: FindOptions,
    #[serde(default)]
    pub upsert: bool,
}

impl MongoOperationsInput {
    /// Operation-specific structural checks
    fn check(&self) -> std::result::Result<(), String> {
        fn object(name: &str, value: Option<&Value>) -> std::result::Result<(), String> {
            match value {
                Some(Value::Object(_)) => Ok(()),
                Some(_) => Err(format!("'{}' must be an object", name)),
                None => Err(format!("'{}' is required", name)),
            }
        }

        if let Some(filter) = &self.filter {
            if !filter.is_object() {
                return Err("'filter' must be an object".to_string());
            }
        }

        match self.operation {
            MongoOperation::Find | MongoOperation::FindOne | MongoOperation::Count => Ok(()),
            MongoOperation::InsertOne => object("document", self.document.as_ref()),
            MongoOperation::InsertMany => match &self.documents {
                Some(docs) if docs.is_empty() => Err("'documents' cannot be empty".to_string()),
                Some(docs) if docs.iter().all(Value::is_object) => Ok(()),
                Some(_) => Err("every entry of 'documents' must be an object".to_string()),
                None => Err("'documents' is required".to_string()),
            },
            MongoOperation::UpdateOne | MongoOperation::UpdateMany => {
                object("filter", self.filter.as_ref())?;
                object("update", self.update.as_ref())
            }
            MongoOperation::DeleteOne | MongoOperation::DeleteMany => object("filter", self.filter.as_ref()),
            MongoOperation::Aggregate => match &self.pipeline {
                Some(stages) if stages.iter().all(Value::is_object) => Ok(()),
                Some(_) => Err("every pipeline stage must be an object".to_string()),
                None => Err("'pipeline' is required".to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MongoOperationsOutput {
    pub operation: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Value>>,
    /// `find_one` result; `null` when nothing matched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted_ids: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl MongoOperationsOutput {
    /// Records touched by the operation
    pub fn records(&self) -> u64 {
        if let Some(documents) = &self.documents {
            return documents.len() as u64;
        }
        if let Some(ids) = &self.inserted_ids {
            return ids.len() as u64;
        }
        match &self.document {
            Some(Value::Null) => 0,
            Some(_) => 1,
            None => self
                .modified_count
                .or(self.deleted_count)
                .or(self.count)
                .unwrap_or(0),
        }
    }
}

async fn perform(
    session: &mut Box<dyn DocumentSession>,
    collection: String,
    input: MongoOperationsInput,
) -> Result<MongoOperationsOutput> {
    let filter = input.filter.unwrap_or_else(|| json!({}));
    let mut output = MongoOperationsOutput {
        operation: input.operation.as_str().to_string(),
        collection: collection.clone(),
        ..MongoOperationsOutput::default()
    };

    match input.operation {
        MongoOperation::Find => {
            output.documents = Some(session.find(&collection, &filter, &input.options).await?);
        }
        MongoOperation::FindOne => {
            let options = FindOptions {
                limit: Some(1),
                ..input.options
            };
            let found = session.find(&collection, &filter, &options).await?;
            output.document = Some(found.into_iter().next().unwrap_or(Value::Null));
        }
        MongoOperation::InsertOne | MongoOperation::InsertMany => {
            let documents = match (input.document, input.documents) {
                (Some(document), _) if input.operation == MongoOperation::InsertOne => vec![document],
                (_, Some(documents)) => documents,
                _ => return Err(NodeEngineError::invalid_input("nothing to insert")),
            };
            output.inserted_ids = Some(session.insert(&collection, &documents).await?);
        }
        MongoOperation::UpdateOne | MongoOperation::UpdateMany => {
            let update = input.update.unwrap_or_else(|| json!({}));
            let many = input.operation == MongoOperation::UpdateMany;
            let outcome = session
                .update(&collection, &filter, &update, many, input.upsert)
                .await?;
            output.matched_count = Some(outcome.matched_count);
            output.modified_count = Some(outcome.modified_count);
            output.upserted_id = outcome.upserted_id;
        }
        MongoOperation::DeleteOne | MongoOperation::DeleteMany => {
            let many = input.operation == MongoOperation::DeleteMany;
            output.deleted_count = Some(session.delete(&collection, &filter, many).await?);
        }
        MongoOperation::Aggregate => {
            let pipeline = input.pipeline.unwrap_or_default();
            output.documents = Some(session.aggregate(&collection, &pipeline).await?);
        }
        MongoOperation::Count => {
            output.count = Some(session.count(&collection, &filter).await?);
        }
    }

    Ok(output)
}

/// MongoDB Operations Node
pub struct MongoOperationsNode {
    config: MongoOperationsConfig,
    connector: Arc<dyn DocumentConnector>,
}

impl MongoOperationsNode {
    pub const NODE_TYPE: &'static str = "mongodb-operations";
    /// Port ID for the operation name
    pub const PORT_OPERATION: &'static str = "operation";
    /// Port ID for documents in and out
    pub const PORT_DOCUMENTS: &'static str = "documents";

    /// Create with an explicit connector
    pub fn with_connector(config: MongoOperationsConfig, connector: Arc<dyn DocumentConnector>) -> Self {
        Self { config, connector }
    }

    fn collection_for(&self, input: &MongoOperationsInput) -> Option<String> {
        input
            .collection
            .clone()
            .or_else(|| self.config.collection.clone())
            .filter(|c| !c.is_empty())
    }

    async fn run(&self, collection: String, input: MongoOperationsInput) -> Result<MongoOperationsOutput> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let connector = &self.connector;
        let (uri, database) = (&self.config.uri, &self.config.database);

        let session = connect_with_retry(&self.config.retry, Self::NODE_TYPE, timeout, || {
            connector.connect(uri, database)
        })
        .await?;

        scoped(session, timeout, move |session| {
            Box::pin(perform(session, collection, input))
        })
        .await
    }
}

impl NodeDescriptor for MongoOperationsNode {
    fn descriptor() -> NodeMetadata {
        let operations = MongoOperation::ALL.iter().map(|op| json!(op.as_str())).collect();

        NodeMetadata::new(Self::NODE_TYPE, "1.0.0", NodeCategory::Database)
            .with_label("MongoDB Operations")
            .with_description("Runs a CRUD, aggregate, or count operation against MongoDB")
            .with_input(
                InputDescriptor::required(Self::PORT_OPERATION, PortDataType::String).with_validation(
                    InputValidation {
                        allowed_values: operations,
                        ..InputValidation::default()
                    },
                ),
            )
            .with_input(
                InputDescriptor::optional("collection", PortDataType::String)
                    .describe("Overrides the configured collection"),
            )
            .with_input(InputDescriptor::optional("filter", PortDataType::Object))
            .with_input(InputDescriptor::optional("document", PortDataType::Object).describe("insert_one payload"))
            .with_input(
                InputDescriptor::optional(Self::PORT_DOCUMENTS, PortDataType::Array).describe("insert_many payload"),
            )
            .with_input(InputDescriptor::optional("update", PortDataType::Object))
            .with_input(InputDescriptor::optional("pipeline", PortDataType::Array))
            .with_input(InputDescriptor::optional("options", PortDataType::Object))
            .with_input(InputDescriptor::optional("upsert", PortDataType::Boolean).with_default(json!(false)))
            .with_output(
                OutputDescriptor::new(Self::PORT_DOCUMENTS, PortDataType::Array)
                    .describe("Documents from find or aggregate"),
            )
            .with_output(OutputDescriptor::new("document", PortDataType::Object).describe("find_one result"))
            .with_output(OutputDescriptor::new("inserted_ids", PortDataType::Array))
            .with_output(OutputDescriptor::new("matched_count", PortDataType::Number))
            .with_output(OutputDescriptor::new("modified_count", PortDataType::Number))
            .with_output(OutputDescriptor::new("deleted_count", PortDataType::Number))
            .with_output(OutputDescriptor::new("count", PortDataType::Number))
            .with_rule(
                CompatibilityRule::new("postgresql-query", Self::PORT_DOCUMENTS, "parameters", CompatibilityLevel::Conditional)
                    .describe("Documents can parameterize a query when they are flat")
                    .when(Self::PORT_DOCUMENTS, "no nested objects or arrays"),
            )
            .with_rule(
                CompatibilityRule::new(Self::NODE_TYPE, Self::PORT_DOCUMENTS, Self::PORT_DOCUMENTS, CompatibilityLevel::Conditional)
                    .describe("Documents can be copied between collections when ids do not collide")
                    .when("_id", "must be removed or unique in the target collection")
                    .transform("_id", "_id", "drop"),
            )
            .with_rule(
                CompatibilityRule::new("data-filter", Self::PORT_DOCUMENTS, "data", CompatibilityLevel::Full)
                    .describe("Documents are records the filter can evaluate directly"),
            )
            .with_rule(
                CompatibilityRule::new("field-mapper", Self::PORT_DOCUMENTS, "payload", CompatibilityLevel::Full)
                    .describe("Documents are records the mapper can reshape directly"),
            )
            .with_configuration(ConfigurationHints {
                defaults: json!({"uri": "mongodb://localhost:27017", "timeoutMs": 30000})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
                retry: Some(RetryPolicy::default()),
                timeout_ms: Some(30_000),
            })
            .with_documentation(NodeDocumentation {
                purpose: "Read and write MongoDB collections as one pipeline step".to_string(),
                examples: vec![UsageExample {
                    title: "Active users".to_string(),
                    input: json!({
                        "operation": "find",
                        "collection": "users",
                        "filter": {"active": true},
                        "options": {"limit": 50}
                    }),
                    config: Some(json!({"uri": "mongodb://db:27017", "database": "app"})),
                }],
                limitations: vec!["One client per call; no sessions or transactions across calls".to_string()],
                troubleshooting: vec![TroubleshootingEntry {
                    problem: "'filter' is required".to_string(),
                    solution: "Updates and deletes need an explicit filter; pass {} to match everything".to_string(),
                }],
            })
    }
}

inventory::submit! {
    NodeRegistration {
        node_type: MongoOperationsNode::NODE_TYPE,
        descriptor: <MongoOperationsNode as NodeDescriptor>::descriptor,
        factory: build_node::<MongoOperationsNode>,
    }
}

#[async_trait]
impl Node for MongoOperationsNode {
    type Config = MongoOperationsConfig;
    type Input = MongoOperationsInput;
    type Output = MongoOperationsOutput;

    fn from_config(config: MongoOperationsConfig) -> Result<Self> {
        Ok(Self::with_connector(config, default_document_connector()))
    }

    fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(Self::NODE_TYPE, "1.0.0", NodeCategory::Database)
    }

    fn config(&self) -> &MongoOperationsConfig {
        &self.config
    }

    fn validate(&self, input: &MongoOperationsInput) -> bool {
        self.collection_for(input).is_some() && input.check().is_ok()
    }

    async fn execute(
        &self,
        input: MongoOperationsInput,
        _context: Option<&Context>,
    ) -> ExecutionResult<MongoOperationsOutput> {
        let timer = ExecutionTimer::start();
        let Some(collection) = self.collection_for(&input) else {
            return ExecutionResult::failed_after("No collection specified", timer.finish(0));
        };
        if let Err(message) = input.check() {
            return ExecutionResult::failed_after(NodeEngineError::invalid_input(message), timer.finish(0));
        }

        let operation = input.operation;
        let result = self.run(collection, input).await;
        if let Err(e) = &result {
            log::debug!("MongoOperations: {} failed: {}", operation.as_str(), e);
        }
        ExecutionResult::from_result(result, &timer, MongoOperationsOutput::records)
    }
}

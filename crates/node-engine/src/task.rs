//! graph-flow adapter for nodes
//!
//! [`NodeTask`] lets a node run as a step in a `graph_flow` graph. Tasks
//! communicate through the shared `Context`:
//!
//! - Inputs: `{task_id}.input.{pin}`, or the whole input at
//!   `{task_id}.input.payload`
//! - Outputs: `{task_id}.output.{field}`; a node declaring a single output
//!   pin that its data does not carry as a field gets all of its data
//!   written under that pin
//! - Result envelope: `{task_id}.output.result`
//!
//! ```ignore
//! context.set("filter_1.input.data", json!([{"age": 30}])).await;
//! graph.add_task(Arc::new(NodeTask::new("filter_1", node, &metadata)));
//! ```

use async_trait::async_trait;
use graph_flow::{Context, GraphError, NextAction, Task, TaskResult};

use crate::descriptor::NodeMetadata;
use crate::node::BoxedNode;

/// Port holding an entire pre-assembled input object
pub const PAYLOAD_PORT: &str = "payload";
/// Output port holding the full result envelope
pub const RESULT_PORT: &str = "result";

/// Helper for building context keys
pub struct ContextKeys;

impl ContextKeys {
    /// Build an input key: `{task_id}.input.{port}`
    pub fn input(task_id: &str, port: &str) -> String {
        format!("{}.input.{}", task_id, port)
    }

    /// Build an output key: `{task_id}.output.{port}`
    pub fn output(task_id: &str, port: &str) -> String {
        format!("{}.output.{}", task_id, port)
    }

    /// Build a metadata key: `{task_id}.meta.{field}`
    pub fn meta(task_id: &str, field: &str) -> String {
        format!("{}.meta.{}", task_id, field)
    }
}

/// A node bound to a task id inside a graph
pub struct NodeTask {
    task_id: String,
    node: BoxedNode,
    /// Declared input pins, read from the context on each run
    inputs: Vec<String>,
    /// Input pins that must be present unless a payload is given
    required: Vec<String>,
    /// Declared output pins
    outputs: Vec<String>,
}

impl NodeTask {
    pub fn new(task_id: impl Into<String>, node: BoxedNode, metadata: &NodeMetadata) -> Self {
        Self {
            task_id: task_id.into(),
            node,
            inputs: metadata.inputs.iter().map(|i| i.name.clone()).collect(),
            required: metadata
                .inputs
                .iter()
                .filter(|i| i.required)
                .map(|i| i.name.clone())
                .collect(),
            outputs: metadata.outputs.iter().map(|o| o.name.clone()).collect(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    async fn gather_input(&self, context: &Context) -> Result<serde_json::Value, String> {
        let payload_key = ContextKeys::input(&self.task_id, PAYLOAD_PORT);
        if let Some(payload) = context.get::<serde_json::Value>(&payload_key).await {
            return Ok(payload);
        }

        let mut input = serde_json::Map::new();
        for pin in &self.inputs {
            let key = ContextKeys::input(&self.task_id, pin);
            match context.get::<serde_json::Value>(&key).await {
                Some(value) => {
                    input.insert(pin.clone(), value);
                }
                None if self.required.contains(pin) => {
                    return Err(format!("missing required input '{}' (expected at '{}')", pin, key));
                }
                None => {}
            }
        }
        Ok(serde_json::Value::Object(input))
    }

    /// Output writes for successful `data`
    fn output_entries(&self, data: &serde_json::Value) -> Vec<(String, serde_json::Value)> {
        if let [pin] = self.outputs.as_slice() {
            if data.get(pin).is_none() {
                return vec![(pin.clone(), data.clone())];
            }
        }
        match data {
            serde_json::Value::Object(fields) => fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl Task for NodeTask {
    fn id(&self) -> &str {
        &self.task_id
    }

    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let node_type = self.node.identity().node_type;
        let input = self.gather_input(&context).await.map_err(|message| {
            log::warn!("Task {}: {}", self.task_id, message);
            GraphError::TaskExecutionFailed(format!("{} ({}): {}", self.task_id, node_type, message))
        })?;
        log::debug!("Task {}: running {} node", self.task_id, node_type);

        let result = self.node.execute(input, Some(&context)).await;

        context
            .set(&ContextKeys::meta(&self.task_id, "node_type"), node_type.clone())
            .await;
        context
            .set(&ContextKeys::output(&self.task_id, RESULT_PORT), result.clone())
            .await;

        if !result.success {
            let message = result
                .error
                .unwrap_or_else(|| "Node execution failed".to_string());
            log::warn!("Task {}: {} failed: {}", self.task_id, node_type, message);
            return Err(GraphError::TaskExecutionFailed(format!(
                "{} ({}): {}",
                self.task_id, node_type, message
            )));
        }

        if let Some(data) = &result.data {
            for (field, value) in self.output_entries(data) {
                context.set(&ContextKeys::output(&self.task_id, &field), value).await;
            }
        }

        log::debug!(
            "Task {}: {} processed {} records",
            self.task_id,
            node_type,
            result.records_processed()
        );

        Ok(TaskResult::new(
            Some(format!("{} completed", node_type)),
            NextAction::Continue,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{InputDescriptor, OutputDescriptor};
    use crate::node::{into_dyn, ExecutionResult, ExecutionTimer, Node};
    use crate::types::{NodeCategory, NodeIdentity, PortDataType};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct SumInput {
        numbers: Vec<f64>,
        #[serde(default)]
        offset: f64,
    }

    struct SumNode {
        config: serde_json::Value,
    }

    #[async_trait]
    impl Node for SumNode {
        type Config = serde_json::Value;
        type Input = SumInput;
        type Output = serde_json::Value;

        fn from_config(config: serde_json::Value) -> crate::Result<Self> {
            Ok(Self { config })
        }

        fn identity(&self) -> NodeIdentity {
            NodeIdentity::new("sum", "1.0.0", NodeCategory::Logic)
        }

        fn config(&self) -> &serde_json::Value {
            &self.config
        }

        async fn execute(&self, input: SumInput, _context: Option<&Context>) -> ExecutionResult<serde_json::Value> {
            let timer = ExecutionTimer::start();
            if input.numbers.is_empty() {
                return ExecutionResult::failed_after("Nothing to sum", timer.finish(0));
            }
            let total: f64 = input.numbers.iter().sum::<f64>() + input.offset;
            let count = input.numbers.len() as u64;
            ExecutionResult::ok(json!({"total": total, "count": count}), timer.finish(count))
        }
    }

    fn sum_task(id: &str) -> NodeTask {
        let metadata = NodeMetadata::new("sum", "1.0.0", NodeCategory::Logic)
            .with_input(InputDescriptor::required("numbers", PortDataType::Array))
            .with_input(InputDescriptor::optional("offset", PortDataType::Number));
        NodeTask::new(id, into_dyn(SumNode { config: json!({}) }), &metadata)
    }

    #[test]
    fn test_context_keys() {
        assert_eq!(ContextKeys::input("task1", "data"), "task1.input.data");
        assert_eq!(ContextKeys::output("task1", "filtered"), "task1.output.filtered");
        assert_eq!(ContextKeys::meta("task1", "node_type"), "task1.meta.node_type");
    }

    #[test]
    fn test_task_id() {
        assert_eq!(sum_task("adder").id(), "adder");
    }

    #[tokio::test]
    async fn test_run_reads_pins_and_writes_outputs() {
        let task = sum_task("adder");
        let context = Context::new();
        context
            .set(&ContextKeys::input("adder", "numbers"), json!([1.0, 2.0, 3.0]))
            .await;
        context.set(&ContextKeys::input("adder", "offset"), json!(4.0)).await;

        let result = task.run(context.clone()).await.unwrap();
        assert!(matches!(result.next_action, NextAction::Continue));

        let total: Option<f64> = context.get(&ContextKeys::output("adder", "total")).await;
        assert_eq!(total, Some(10.0));

        let envelope: Option<ExecutionResult<serde_json::Value>> =
            context.get(&ContextKeys::output("adder", RESULT_PORT)).await;
        assert_eq!(envelope.unwrap().records_processed(), 3);

        let node_type: Option<String> = context.get(&ContextKeys::meta("adder", "node_type")).await;
        assert_eq!(node_type.as_deref(), Some("sum"));
    }

    #[tokio::test]
    async fn test_run_accepts_payload() {
        let task = sum_task("adder");
        let context = Context::new();
        context
            .set(&ContextKeys::input("adder", PAYLOAD_PORT), json!({"numbers": [5.0]}))
            .await;

        task.run(context.clone()).await.unwrap();
        let total: Option<f64> = context.get(&ContextKeys::output("adder", "total")).await;
        assert_eq!(total, Some(5.0));
    }

    #[tokio::test]
    async fn test_run_failure_is_graph_error() {
        let task = sum_task("adder");
        let context = Context::new();
        context.set(&ContextKeys::input("adder", "numbers"), json!([])).await;

        let err = task.run(context.clone()).await.unwrap_err();
        assert!(matches!(err, GraphError::TaskExecutionFailed(m) if m.contains("Nothing to sum")));

        // the failed envelope is still recorded
        let envelope: Option<ExecutionResult<serde_json::Value>> =
            context.get(&ContextKeys::output("adder", RESULT_PORT)).await;
        assert!(!envelope.unwrap().success);
    }

    #[tokio::test]
    async fn test_run_missing_required_pin_fails() {
        let task = sum_task("adder");
        let context = Context::new();
        let err = task.run(context.clone()).await.unwrap_err();
        assert!(matches!(err, GraphError::TaskExecutionFailed(m) if m.contains("'numbers'")));

        // rejected before the node ran
        let envelope: Option<serde_json::Value> = context.get(&ContextKeys::output("adder", RESULT_PORT)).await;
        assert!(envelope.is_none());
    }

    /// Echoes its input; declares a single output pin
    struct EchoNode {
        config: serde_json::Value,
    }

    #[async_trait]
    impl Node for EchoNode {
        type Config = serde_json::Value;
        type Input = serde_json::Value;
        type Output = serde_json::Value;

        fn from_config(config: serde_json::Value) -> crate::Result<Self> {
            Ok(Self { config })
        }

        fn identity(&self) -> NodeIdentity {
            NodeIdentity::new("echo", "1.0.0", NodeCategory::Transformation)
        }

        fn config(&self) -> &serde_json::Value {
            &self.config
        }

        async fn execute(&self, input: serde_json::Value, _context: Option<&Context>) -> ExecutionResult<serde_json::Value> {
            let timer = ExecutionTimer::start();
            ExecutionResult::ok(input, timer.finish(1))
        }
    }

    fn echo_task(id: &str) -> NodeTask {
        let metadata = NodeMetadata::new("echo", "1.0.0", NodeCategory::Transformation)
            .with_input(InputDescriptor::required(PAYLOAD_PORT, PortDataType::Any))
            .with_output(OutputDescriptor::new("echoed", PortDataType::Any));
        NodeTask::new(id, into_dyn(EchoNode { config: json!({}) }), &metadata)
    }

    #[tokio::test]
    async fn test_single_output_pin_receives_whole_data() {
        let task = echo_task("echo");
        let context = Context::new();
        context
            .set(&ContextKeys::input("echo", PAYLOAD_PORT), json!({"first_name": "John"}))
            .await;
        task.run(context.clone()).await.unwrap();

        let echoed: Option<serde_json::Value> = context.get(&ContextKeys::output("echo", "echoed")).await;
        assert_eq!(echoed, Some(json!({"first_name": "John"})));
        let field: Option<serde_json::Value> = context.get(&ContextKeys::output("echo", "first_name")).await;
        assert!(field.is_none());
    }

    #[tokio::test]
    async fn test_single_output_pin_carried_as_field() {
        let task = echo_task("echo");
        let context = Context::new();
        context
            .set(&ContextKeys::input("echo", PAYLOAD_PORT), json!({"echoed": [1, 2]}))
            .await;
        task.run(context.clone()).await.unwrap();

        let echoed: Option<serde_json::Value> = context.get(&ContextKeys::output("echo", "echoed")).await;
        assert_eq!(echoed, Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_missing_payload_fails() {
        let task = echo_task("echo");
        let err = task.run(Context::new()).await.unwrap_err();
        assert!(matches!(err, GraphError::TaskExecutionFailed(m) if m.contains("'payload'")));
    }
}

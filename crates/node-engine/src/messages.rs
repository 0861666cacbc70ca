//! Message schemas for the task-distribution bus
//!
//! Producers publish a [`TaskMessage`] to [`TASKS_EXCHANGE`] with the
//! routing key `task.<node_type>`; workers reply with a
//! [`TaskResultMessage`] on [`RESULTS_EXCHANGE`]. The broker client
//! itself is external; this module only fixes the payload shapes and
//! the worker-side dispatch.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::node::ExecutionResult;
use crate::registry::NodeRegistry;

/// Exchange carrying task requests
pub const TASKS_EXCHANGE: &str = "node.tasks";
/// Exchange carrying task results
pub const RESULTS_EXCHANGE: &str = "node.results";

/// A request to run one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMessage {
    pub task_id: Uuid,
    pub node_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    pub input: serde_json::Value,
    pub created_at_ms: u64,
    /// Routing key override for the reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl TaskMessage {
    pub fn new(node_type: impl Into<String>, config: serde_json::Value, input: serde_json::Value) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            node_type: node_type.into(),
            config,
            input,
            created_at_ms: now_ms(),
            reply_to: None,
        }
    }

    pub fn with_reply_to(mut self, routing_key: impl Into<String>) -> Self {
        self.reply_to = Some(routing_key.into());
        self
    }

    /// Routing key on [`TASKS_EXCHANGE`]
    pub fn routing_key(&self) -> String {
        format!("task.{}", self.node_type)
    }

    /// Routing key the result should be published with
    pub fn result_routing_key(&self) -> String {
        self.reply_to
            .clone()
            .unwrap_or_else(|| format!("result.{}", self.node_type))
    }
}

/// The outcome of a [`TaskMessage`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResultMessage {
    pub task_id: Uuid,
    pub node_type: String,
    pub result: ExecutionResult<serde_json::Value>,
    pub completed_at_ms: u64,
}

/// Instantiate and run the node a message asks for
///
/// Never fails: an unknown node type or bad configuration comes back as a
/// failed envelope, since the bus boundary has no caller to raise to.
pub async fn dispatch(registry: &NodeRegistry, message: &TaskMessage) -> TaskResultMessage {
    log::debug!("Dispatching task {} ({})", message.task_id, message.node_type);

    let result = match registry.create(&message.node_type, message.config.clone()) {
        Ok(node) => node.execute(message.input.clone(), None).await,
        Err(e) => {
            log::warn!("Task {} rejected: {}", message.task_id, e);
            ExecutionResult::failed(e)
        }
    };

    TaskResultMessage {
        task_id: message.task_id,
        node_type: message.node_type.clone(),
        result,
        completed_at_ms: now_ms(),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

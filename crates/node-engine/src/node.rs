//! The node execution contract
//!
//! Every node goes through the same per-call lifecycle:
//! `Idle -> Validating -> Executing -> {Succeeded, Failed}`. Nothing is
//! carried between calls; a node that needs a connection opens and
//! releases it inside one `execute`.
//!
//! Two layers:
//!
//! - [`Node`]: the typed trait concrete nodes implement.
//! - [`DynNode`]: the object-safe JSON view the registry hands out. It
//!   applies the base input checks and turns every failure, panics
//!   included, into a failed [`ExecutionResult`].

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::FutureExt;
use graph_flow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::NodeIdentity;

/// Execution metrics reported with every finished call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    /// Wall time in milliseconds
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
    pub records_processed: u64,
}

/// Result envelope returned by every `execute` call
///
/// The only channel for reporting both success and failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ExecutionMetrics>,
}

impl<T> ExecutionResult<T> {
    pub fn ok(data: T, metrics: ExecutionMetrics) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metrics: Some(metrics),
        }
    }

    pub fn failed(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            metrics: None,
        }
    }

    /// Failure that still reports how long the call ran
    pub fn failed_after(error: impl std::fmt::Display, metrics: ExecutionMetrics) -> Self {
        Self {
            metrics: Some(metrics),
            ..Self::failed(error)
        }
    }

    /// Convert a `Result` produced inside `execute`, measuring with `timer`
    pub fn from_result(result: Result<T>, timer: &ExecutionTimer, records: impl FnOnce(&T) -> u64) -> Self {
        match result {
            Ok(data) => {
                let count = records(&data);
                Self::ok(data, timer.finish(count))
            }
            Err(e) => Self::failed_after(e, timer.finish(0)),
        }
    }

    pub fn records_processed(&self) -> u64 {
        self.metrics.map(|m| m.records_processed).unwrap_or(0)
    }

    pub fn into_result(self) -> std::result::Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (_, _) => Err(self.error.unwrap_or_else(|| "Execution produced no data".to_string())),
        }
    }
}

/// Measures wall time for one `execute` call
#[derive(Debug, Clone, Copy)]
pub struct ExecutionTimer {
    started: Instant,
}

impl ExecutionTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn finish(&self, records_processed: u64) -> ExecutionMetrics {
        ExecutionMetrics {
            execution_time_ms: self.started.elapsed().as_millis() as u64,
            records_processed,
        }
    }
}

/// Lifecycle phase of one call, reported in debug logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Idle,
    Validating,
    Executing,
    Succeeded,
    Failed,
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Executing => "executing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Typed contract implemented by every node
///
/// `execute` must not assume `validate` was called, and must report
/// every failure through the returned envelope.
#[async_trait]
pub trait Node: Send + Sync + 'static {
    /// Node-specific configuration, fixed at construction
    type Config: Serialize + DeserializeOwned + Clone + Send + Sync;
    type Input: DeserializeOwned + Send + Sync;
    type Output: Serialize + Send + Sync;

    /// Construct a node from its configuration
    fn from_config(config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    fn identity(&self) -> NodeIdentity;

    /// The configuration captured at construction
    fn config(&self) -> &Self::Config;

    /// Structural checks layered on top of the base checks. Pure.
    fn validate(&self, _input: &Self::Input) -> bool {
        true
    }

    async fn execute(&self, input: Self::Input, context: Option<&Context>) -> ExecutionResult<Self::Output>;
}

/// Object-safe JSON view of a node
#[async_trait]
pub trait DynNode: Send + Sync {
    fn identity(&self) -> NodeIdentity;

    /// The node configuration as JSON
    fn config(&self) -> serde_json::Value;

    /// Base check (rejects `null`), structural decoding, then node checks
    fn validate(&self, input: &serde_json::Value) -> bool;

    async fn execute(
        &self,
        input: serde_json::Value,
        context: Option<&Context>,
    ) -> ExecutionResult<serde_json::Value>;
}

/// Boxed type-erased node
pub type BoxedNode = Box<dyn DynNode>;

/// Erase a typed node into a [`BoxedNode`]
pub fn into_dyn<N: Node>(node: N) -> BoxedNode {
    Box::new(ErasedNode(node))
}

struct ErasedNode<N>(N);

impl<N: Node> ErasedNode<N> {
    fn decode(input: serde_json::Value) -> std::result::Result<N::Input, String> {
        if input.is_null() {
            return Err("Input cannot be null".to_string());
        }
        serde_json::from_value(input).map_err(|e| format!("Invalid input: {}", e))
    }
}

#[async_trait]
impl<N: Node> DynNode for ErasedNode<N> {
    fn identity(&self) -> NodeIdentity {
        self.0.identity()
    }

    fn config(&self) -> serde_json::Value {
        serde_json::to_value(self.0.config()).unwrap_or(serde_json::Value::Null)
    }

    fn validate(&self, input: &serde_json::Value) -> bool {
        match Self::decode(input.clone()) {
            Ok(typed) => self.0.validate(&typed),
            Err(_) => false,
        }
    }

    async fn execute(
        &self,
        input: serde_json::Value,
        context: Option<&Context>,
    ) -> ExecutionResult<serde_json::Value> {
        let node_type = self.0.identity().node_type;
        log::debug!("{}: {}", node_type, ExecutionPhase::Validating);

        let typed = match Self::decode(input) {
            Ok(typed) => typed,
            Err(message) => {
                log::debug!("{}: {} ({})", node_type, ExecutionPhase::Failed, message);
                return ExecutionResult::failed(message);
            }
        };

        log::debug!("{}: {}", node_type, ExecutionPhase::Executing);
        let timer = ExecutionTimer::start();
        let outcome = AssertUnwindSafe(self.0.execute(typed, context))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                return ExecutionResult::failed_after(
                    format!("Node panicked: {}", message),
                    timer.finish(0),
                );
            }
        };

        let ExecutionResult {
            success,
            data,
            error,
            metrics,
        } = result;
        let data = match data.map(serde_json::to_value).transpose() {
            Ok(data) => data,
            Err(e) => {
                return ExecutionResult::failed_after(
                    format!("Failed to serialize output: {}", e),
                    metrics.unwrap_or_else(|| timer.finish(0)),
                )
            }
        };

        let phase = if success {
            ExecutionPhase::Succeeded
        } else {
            ExecutionPhase::Failed
        };
        log::debug!("{}: {}", node_type, phase);

        ExecutionResult {
            success,
            data,
            error,
            metrics,
        }
    }
}

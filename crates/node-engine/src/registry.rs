//! Node type registry for dynamic node resolution
//!
//! This module provides a registry that maps node type strings to
//! factories and, when available, static metadata. Each entry captures
//! its factory explicitly at registration time; nothing is resolved by
//! reflection.
//!
//! # Usage
//!
//! ```ignore
//! use node_engine::NodeRegistry;
//!
//! let mut registry = NodeRegistry::new();
//! registry.register::<MyNode>("my-node");
//!
//! let node = registry.create("my-node", serde_json::json!({"threshold": 3}))?;
//! let result = node.execute(input, None).await;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::compatibility::CompatibilityValidator;
use crate::descriptor::{NodeDescriptor, NodeMetadata};
use crate::error::{NodeEngineError, Result};
use crate::node::{into_dyn, BoxedNode, Node};
use crate::settings::{merge_config, EngineConfig};
use crate::types::NodeCategory;

/// Factory producing a fresh node from JSON configuration
pub type NodeFactory = Arc<dyn Fn(serde_json::Value) -> Result<BoxedNode> + Send + Sync>;

/// A link-time registration for a built-in node type
///
/// Submitted with `inventory` and collected by [`NodeRegistry::with_builtins`]:
///
/// ```ignore
/// inventory::submit! {
///     node_engine::NodeRegistration {
///         node_type: "data-filter",
///         descriptor: <DataFilterNode as NodeDescriptor>::descriptor,
///         factory: node_engine::build_node::<DataFilterNode>,
///     }
/// }
/// ```
pub struct NodeRegistration {
    pub node_type: &'static str,
    pub descriptor: fn() -> NodeMetadata,
    pub factory: fn(serde_json::Value) -> Result<BoxedNode>,
}

inventory::collect!(NodeRegistration);

/// Decode `config` into `N::Config` and construct an erased `N`
pub fn build_node<N: Node + NodeDescriptor>(config: serde_json::Value) -> Result<BoxedNode> {
    let typed: N::Config = serde_json::from_value(config)
        .map_err(|e| NodeEngineError::invalid_config(N::descriptor().node_type, e.to_string()))?;
    N::from_config(typed).map(into_dyn)
}

/// A registration entry combining a factory with optional static metadata
#[derive(Clone)]
struct RegistryEntry {
    factory: NodeFactory,
    descriptor: Option<fn() -> NodeMetadata>,
}

/// Registry of node types
///
/// Registration is expected during bootstrap; share the populated
/// registry behind an `Arc` afterwards. Entries are never cleared
/// automatically and registering a type again replaces the old entry.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create a registry holding every `NodeRegistration` linked into the binary
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for registration in inventory::iter::<NodeRegistration> {
            let factory = registration.factory;
            registry.entries.insert(
                registration.node_type.to_string(),
                RegistryEntry {
                    factory: Arc::new(factory),
                    descriptor: Some(registration.descriptor),
                },
            );
        }
        log::info!("Registered {} built-in node types", registry.entries.len());
        registry
    }

    /// Register a node type constructed from its configuration
    pub fn register<N>(&mut self, node_type: impl Into<String>)
    where
        N: Node + NodeDescriptor,
    {
        self.insert(node_type.into(), Arc::new(build_node::<N>), Some(N::descriptor));
    }

    /// Register a node type with a custom factory and `N`'s static metadata
    ///
    /// Used when construction needs collaborators that cannot come from
    /// configuration (e.g., an injected client connector).
    pub fn register_with<N, F>(&mut self, node_type: impl Into<String>, factory: F)
    where
        N: NodeDescriptor,
        F: Fn(serde_json::Value) -> Result<BoxedNode> + Send + Sync + 'static,
    {
        self.insert(node_type.into(), Arc::new(factory), Some(N::descriptor));
    }

    /// Register a factory without static metadata
    ///
    /// Metadata for such a type is synthesized from a throwaway instance
    /// built with a `null` configuration.
    pub fn register_factory<F>(&mut self, node_type: impl Into<String>, factory: F)
    where
        F: Fn(serde_json::Value) -> Result<BoxedNode> + Send + Sync + 'static,
    {
        self.insert(node_type.into(), Arc::new(factory), None);
    }

    fn insert(&mut self, node_type: String, factory: NodeFactory, descriptor: Option<fn() -> NodeMetadata>) {
        if self.entries.contains_key(&node_type) {
            log::debug!("Replacing registration for node type '{}'", node_type);
        }
        self.entries
            .insert(node_type, RegistryEntry { factory, descriptor });
    }

    /// Instantiate a fresh node of `node_type`
    pub fn create(&self, node_type: &str, config: serde_json::Value) -> Result<BoxedNode> {
        let entry = self
            .entries
            .get(node_type)
            .ok_or_else(|| NodeEngineError::UnknownNodeType(node_type.to_string()))?;
        (entry.factory)(config)
    }

    /// Instantiate with layered configuration
    ///
    /// Precedence, lowest first: descriptor defaults, engine per-type
    /// defaults, `config`.
    pub fn create_configured(
        &self,
        node_type: &str,
        config: serde_json::Value,
        engine: &EngineConfig,
    ) -> Result<BoxedNode> {
        let entry = self
            .entries
            .get(node_type)
            .ok_or_else(|| NodeEngineError::UnknownNodeType(node_type.to_string()))?;

        let mut effective = serde_json::Value::Object(serde_json::Map::new());
        if let Some(defaults) = entry
            .descriptor
            .and_then(|d| d().configuration)
            .map(|c| serde_json::Value::Object(c.defaults))
        {
            effective = merge_config(effective, defaults);
        }
        if let Some(defaults) = engine.defaults_for(node_type) {
            effective = merge_config(effective, defaults.clone());
        }
        effective = merge_config(effective, config);

        (entry.factory)(effective)
    }

    /// Check if a node type is registered
    pub fn has_node_type(&self, node_type: &str) -> bool {
        self.entries.contains_key(node_type)
    }

    /// List all registered node type strings, sorted
    pub fn available_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.entries.keys().cloned().collect();
        types.sort();
        types
    }

    /// Metadata for a node type, or `None` when it cannot be produced
    ///
    /// Prefers the static descriptor. Without one, a throwaway instance is
    /// built from a `null` configuration and a minimal descriptor is
    /// synthesized from its identity. Construction errors and panics are
    /// swallowed.
    pub fn node_metadata(&self, node_type: &str) -> Option<NodeMetadata> {
        let entry = self.entries.get(node_type)?;
        if let Some(descriptor) = entry.descriptor {
            return Some(descriptor());
        }

        let factory = entry.factory.clone();
        match catch_unwind(AssertUnwindSafe(move || factory(serde_json::Value::Null))) {
            Ok(Ok(node)) => Some(NodeMetadata::minimal(node.identity())),
            Ok(Err(e)) => {
                log::debug!("No metadata for '{}': {}", node_type, e);
                None
            }
            Err(_) => {
                log::debug!("No metadata for '{}': constructor panicked", node_type);
                None
            }
        }
    }

    /// Metadata for every registered type that can produce it
    pub fn all_metadata(&self) -> BTreeMap<String, NodeMetadata> {
        self.entries
            .keys()
            .filter_map(|t| self.node_metadata(t).map(|m| (t.clone(), m)))
            .collect()
    }

    /// Get metadata grouped by category
    pub fn metadata_by_category(&self) -> HashMap<NodeCategory, Vec<NodeMetadata>> {
        let mut grouped: HashMap<NodeCategory, Vec<NodeMetadata>> = HashMap::new();
        for meta in self.all_metadata().into_values() {
            grouped.entry(meta.category).or_default().push(meta);
        }
        grouped
    }

    /// Compatibility table built from every registered descriptor
    ///
    /// Pairs are keyed by registered type strings. A rule whose target
    /// names a descriptor type registered under other keys applies to each
    /// of those keys.
    pub fn compatibility_validator(&self) -> CompatibilityValidator {
        let described: BTreeMap<&str, NodeMetadata> = self
            .entries
            .iter()
            .filter_map(|(key, entry)| entry.descriptor.map(|d| (key.as_str(), d())))
            .collect();

        let mut keys_by_type: HashMap<&str, Vec<&str>> = HashMap::new();
        for (key, meta) in &described {
            keys_by_type.entry(meta.node_type.as_str()).or_default().push(*key);
        }

        let mut validator = CompatibilityValidator::new();
        for (key, meta) in &described {
            for rule in &meta.compatibility {
                match keys_by_type.get(rule.target_type.as_str()) {
                    Some(targets) => {
                        for target in targets {
                            let mut rule = rule.clone();
                            rule.target_type = target.to_string();
                            validator.add_rule(*key, rule);
                        }
                    }
                    None => validator.add_rule(*key, rule.clone()),
                }
            }
        }
        validator
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` if they share the same node_type.
    pub fn merge(&mut self, other: NodeRegistry) {
        self.entries.extend(other.entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compatibility::CompatibilityLevel;
    use crate::descriptor::{CompatibilityRule, ConfigurationHints, InputDescriptor};
    use crate::node::{ExecutionResult, ExecutionTimer};
    use crate::types::{NodeIdentity, PortDataType};
    use async_trait::async_trait;
    use graph_flow::Context;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct CounterConfig {
        step: i64,
        label: String,
    }

    #[derive(Debug, Deserialize)]
    struct CounterInput {
        start: i64,
    }

    struct CounterNode {
        config: CounterConfig,
    }

    #[async_trait]
    impl Node for CounterNode {
        type Config = CounterConfig;
        type Input = CounterInput;
        type Output = i64;

        fn from_config(config: CounterConfig) -> Result<Self> {
            Ok(Self { config })
        }

        fn identity(&self) -> NodeIdentity {
            NodeIdentity::new("counter", "1.0.0", NodeCategory::Logic)
        }

        fn config(&self) -> &CounterConfig {
            &self.config
        }

        async fn execute(&self, input: CounterInput, _context: Option<&Context>) -> ExecutionResult<i64> {
            let timer = ExecutionTimer::start();
            ExecutionResult::ok(input.start + self.config.step, timer.finish(1))
        }
    }

    impl NodeDescriptor for CounterNode {
        fn descriptor() -> NodeMetadata {
            NodeMetadata::new("counter", "1.0.0", NodeCategory::Logic)
                .with_label("Counter")
                .with_input(InputDescriptor::required("start", PortDataType::Number))
                .with_rule(CompatibilityRule::new("counter", "value", "start", CompatibilityLevel::Full))
                .with_configuration(ConfigurationHints {
                    defaults: json!({"step": 1, "label": "descriptor"})
                        .as_object()
                        .cloned()
                        .unwrap_or_default(),
                    ..ConfigurationHints::default()
                })
        }
    }

    /// Factory without static metadata whose constructor needs configuration
    fn strict_factory(config: serde_json::Value) -> Result<BoxedNode> {
        if config.is_null() {
            return Err(NodeEngineError::invalid_config("strict", "configuration required"));
        }
        Ok(into_dyn(CounterNode {
            config: CounterConfig::default(),
        }))
    }

    #[test]
    fn test_register_and_create() {
        let mut registry = NodeRegistry::new();
        registry.register::<CounterNode>("counter");

        assert!(registry.has_node_type("counter"));
        let node = registry.create("counter", json!({"step": 5})).unwrap();
        assert_eq!(node.identity().node_type, "counter");
        assert_eq!(node.config()["step"], 5);
    }

    #[test]
    fn test_create_unknown_type() {
        let registry = NodeRegistry::new();
        let result = registry.create("nonexistent-type", json!({}));
        assert!(matches!(result, Err(NodeEngineError::UnknownNodeType(t)) if t == "nonexistent-type"));
        assert!(!registry
            .available_types()
            .contains(&"nonexistent-type".to_string()));
    }

    #[test]
    fn test_create_rejects_bad_config() {
        let mut registry = NodeRegistry::new();
        registry.register::<CounterNode>("counter");
        let result = registry.create("counter", json!({"step": "not a number"}));
        assert!(matches!(result, Err(NodeEngineError::InvalidConfig { .. })));
    }

    #[test]
    fn test_create_yields_independent_instances() {
        let mut registry = NodeRegistry::new();
        registry.register::<CounterNode>("counter");
        let a = registry.create("counter", json!({"step": 1})).unwrap();
        let b = registry.create("counter", json!({"step": 2})).unwrap();
        assert_eq!(a.config()["step"], 1);
        assert_eq!(b.config()["step"], 2);
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = NodeRegistry::new();
        registry.register::<CounterNode>("a");
        registry.register::<CounterNode>("b");
        registry.register_factory("a", strict_factory);

        assert_eq!(registry.available_types(), vec!["a".to_string(), "b".to_string()]);
        // "a" now has no descriptor and a strict constructor
        assert!(registry.node_metadata("a").is_none());
        assert!(registry.node_metadata("b").is_some());
    }

    #[test]
    fn test_metadata_prefers_descriptor() {
        let mut registry = NodeRegistry::new();
        registry.register::<CounterNode>("counter");
        let meta = registry.node_metadata("counter").unwrap();
        assert_eq!(meta.label, "Counter");
        assert_eq!(meta.inputs.len(), 1);
    }

    #[test]
    fn test_metadata_fallback_from_instance() {
        let mut registry = NodeRegistry::new();
        registry.register_factory("lenient", |_config| {
            Ok(into_dyn(CounterNode {
                config: CounterConfig::default(),
            }))
        });

        let meta = registry.node_metadata("lenient").unwrap();
        assert_eq!(meta.node_type, "counter");
        assert_eq!(meta.category, NodeCategory::Logic);
        assert!(meta.inputs.is_empty());
        assert!(meta.outputs.is_empty());
    }

    #[test]
    fn test_metadata_absent_when_fallback_fails() {
        let mut registry = NodeRegistry::new();
        registry.register_factory("strict", strict_factory);
        registry.register_factory("panicky", |_config| -> Result<BoxedNode> {
            panic!("constructor exploded")
        });

        assert!(registry.node_metadata("strict").is_none());
        assert!(registry.node_metadata("panicky").is_none());
        assert!(registry.node_metadata("unregistered").is_none());
        // still creatable with real config
        assert!(registry.create("strict", json!({})).is_ok());
    }

    #[test]
    fn test_all_metadata_skips_absent() {
        let mut registry = NodeRegistry::new();
        registry.register::<CounterNode>("counter");
        registry.register_factory("strict", strict_factory);

        let all = registry.all_metadata();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("counter"));
    }

    #[test]
    fn test_merge_registries() {
        let mut registry1 = NodeRegistry::new();
        registry1.register::<CounterNode>("node-a");

        let mut registry2 = NodeRegistry::new();
        registry2.register::<CounterNode>("node-b");
        registry2.register_factory("node-a", strict_factory);

        registry1.merge(registry2);
        assert_eq!(registry1.available_types().len(), 2);
        // registry2's "node-a" overrides
        assert!(registry1.node_metadata("node-a").is_none());
    }

    #[test]
    fn test_metadata_by_category() {
        let mut registry = NodeRegistry::new();
        registry.register::<CounterNode>("counter");
        let grouped = registry.metadata_by_category();
        assert_eq!(grouped.get(&NodeCategory::Logic).unwrap().len(), 1);
        assert!(grouped.get(&NodeCategory::Database).is_none());
    }

    #[test]
    fn test_compatibility_validator_from_registry() {
        let mut registry = NodeRegistry::new();
        registry.register::<CounterNode>("counter");
        let validator = registry.compatibility_validator();
        assert!(validator.check("counter", "counter").valid);
        assert!(!validator.check("counter", "other").valid);
    }

    #[test]
    fn test_compatibility_follows_registered_name() {
        let mut registry = NodeRegistry::new();
        registry.register::<CounterNode>("alias");
        let validator = registry.compatibility_validator();
        assert_eq!(validator.check("alias", "alias").level, CompatibilityLevel::Full);
        assert!(!validator.check("counter", "counter").valid);

        registry.register::<CounterNode>("counter");
        let validator = registry.compatibility_validator();
        assert!(validator.check("alias", "counter").valid);
        assert!(validator.check("counter", "alias").valid);
        assert!(validator.check("counter", "counter").valid);
    }

    #[test]
    fn test_bad_config_names_node_type() {
        let mut registry = NodeRegistry::new();
        registry.register::<CounterNode>("counter");
        let err = registry.create("counter", json!({"step": "x"})).err().unwrap();
        assert!(matches!(err, NodeEngineError::InvalidConfig { node_type, .. } if node_type == "counter"));
    }

    #[test]
    fn test_create_configured_layers_defaults() {
        let mut registry = NodeRegistry::new();
        registry.register::<CounterNode>("counter");

        let mut engine = EngineConfig::default();
        engine
            .node_defaults
            .insert("counter".to_string(), json!({"label": "engine"}));

        let node = registry
            .create_configured("counter", json!({}), &engine)
            .unwrap();
        assert_eq!(node.config()["step"], 1);
        assert_eq!(node.config()["label"], "engine");

        let node = registry
            .create_configured("counter", json!({"step": 9, "label": "caller"}), &engine)
            .unwrap();
        assert_eq!(node.config()["step"], 9);
        assert_eq!(node.config()["label"], "caller");

        assert!(matches!(
            registry.create_configured("missing", json!({}), &engine),
            Err(NodeEngineError::UnknownNodeType(_))
        ));
    }

    #[tokio::test]
    async fn test_created_node_executes() {
        let mut registry = NodeRegistry::new();
        registry.register::<CounterNode>("counter");
        let node = registry.create("counter", json!({"step": 2})).unwrap();
        let result = node.execute(json!({"start": 40}), None).await;
        assert!(result.success);
        assert_eq!(result.data, Some(json!(42)));
    }
}

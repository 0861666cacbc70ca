//! Engine configuration storage
//!
//! Handles per-node-type configuration defaults loaded from a JSON file
//! and the `NODE_ENGINE_DEFAULTS` environment variable.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{NodeEngineError, Result};

/// Environment variable holding a JSON object of per-type defaults
pub const DEFAULTS_ENV_VAR: &str = "NODE_ENGINE_DEFAULTS";

/// Engine-wide configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Configuration defaults keyed by node type
    pub node_defaults: HashMap<String, serde_json::Value>,
}

impl EngineConfig {
    /// Load configuration from a JSON file
    ///
    /// A missing file yields the default configuration.
    pub async fn load(path: &Path) -> Result<Self> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            log::debug!("No engine config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&content)?;
        log::info!(
            "Loaded engine config from {:?} ({} node types)",
            path,
            config.node_defaults.len()
        );
        Ok(config)
    }

    /// Save configuration to a JSON file, creating parent directories
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Overlay defaults from `NODE_ENGINE_DEFAULTS`, if set
    pub fn apply_env(&mut self) -> Result<()> {
        match std::env::var(DEFAULTS_ENV_VAR) {
            Ok(raw) => self.apply_overrides(&raw),
            Err(_) => Ok(()),
        }
    }

    /// All-or-nothing: a rejected entry leaves the defaults untouched
    fn apply_overrides(&mut self, raw: &str) -> Result<()> {
        let overrides: HashMap<String, serde_json::Value> = serde_json::from_str(raw)?;
        if let Some((node_type, _)) = overrides.iter().find(|(_, defaults)| !defaults.is_object()) {
            return Err(NodeEngineError::invalid_config(
                node_type.clone(),
                format!("{} entries must be JSON objects", DEFAULTS_ENV_VAR),
            ));
        }

        let mut merged = self.node_defaults.clone();
        for (node_type, defaults) in overrides {
            let value = match merged.remove(&node_type) {
                Some(existing) => merge_config(existing, defaults),
                None => defaults,
            };
            merged.insert(node_type, value);
        }
        self.node_defaults = merged;
        Ok(())
    }

    pub fn defaults_for(&self, node_type: &str) -> Option<&serde_json::Value> {
        self.node_defaults.get(node_type)
    }
}

/// Shallow merge of two configuration objects; keys in `overlay` win
///
/// A non-object `overlay` replaces `base`, except `null`, which keeps it.
pub fn merge_config(base: serde_json::Value, overlay: serde_json::Value) -> serde_json::Value {
    match (base, overlay) {
        (serde_json::Value::Object(mut base), serde_json::Value::Object(overlay)) => {
            base.extend(overlay);
            serde_json::Value::Object(base)
        }
        (base, serde_json::Value::Null) => base,
        (_, overlay) => overlay,
    }
}

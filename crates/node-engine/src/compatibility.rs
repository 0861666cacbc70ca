//! Compatibility validation between node outputs and node inputs
//!
//! Answers "can data produced at pin P of node type A be consumed at pin
//! Q of node type B, and with what confidence?".
//!
//! The table is keyed by the `(source, target)` pair. A pair with no
//! entry is incompatible: lookups are total and never distinguish
//! "unknown" from `none`. Self-compatibility is never assumed; a type
//! chains into itself only when a rule says so.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::descriptor::{CompatibilityRule, FieldTransformation, NodeMetadata, PinSchema};

/// Fallback text for pairs without a recorded explanation
pub const NO_DETAILS: &str = "No specific compatibility information available";

/// Confidence that a source output can feed a target input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompatibilityLevel {
    Full,
    Partial,
    Conditional,
    None,
}

impl CompatibilityLevel {
    /// Ordering used when several rules cover one pair (higher wins)
    fn rank(self) -> u8 {
        match self {
            Self::Full => 3,
            Self::Partial => 2,
            Self::Conditional => 1,
            Self::None => 0,
        }
    }

    pub fn is_compatible(self) -> bool {
        self != Self::None
    }
}

impl std::fmt::Display for CompatibilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Full => "full",
            Self::Partial => "partial",
            Self::Conditional => "conditional",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

/// Result of a type-level lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityCheck {
    pub level: CompatibilityLevel,
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityIssue {
    pub severity: IssueSeverity,
    pub message: String,
}

impl CompatibilityIssue {
    fn new(severity: IssueSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

/// Outcome of a pin-level validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    pub compatible: bool,
    pub issues: Vec<CompatibilityIssue>,
}

impl CompatibilityReport {
    pub fn errors(&self) -> impl Iterator<Item = &CompatibilityIssue> {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &CompatibilityIssue> {
        self.issues.iter().filter(|i| i.severity == IssueSeverity::Warning)
    }
}

/// One side of a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinRef {
    pub node_type: String,
    pub pin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<PinSchema>,
}

impl PinRef {
    pub fn new(node_type: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            pin: pin.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: PinSchema) -> Self {
        self.schema = Some(schema);
        self
    }
}

#[derive(Debug, Clone)]
struct PairEntry {
    level: CompatibilityLevel,
    details: Option<String>,
    rules: Vec<CompatibilityRule>,
}

/// Static knowledge base of node-type compatibility
#[derive(Debug, Clone, Default)]
pub struct CompatibilityValidator {
    entries: HashMap<(String, String), PairEntry>,
}

impl CompatibilityValidator {
    /// Create an empty validator (every pair is `none`)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from the rules declared in node descriptors
    pub fn from_metadata<'a>(metadata: impl IntoIterator<Item = &'a NodeMetadata>) -> Self {
        let mut validator = Self::new();
        for meta in metadata {
            for rule in &meta.compatibility {
                validator.add_rule(&meta.node_type, rule.clone());
            }
        }
        validator
    }

    /// Add a pin-level rule with `source_type` as source
    ///
    /// The pair level becomes the most permissive level across its rules.
    pub fn add_rule(&mut self, source_type: &str, rule: CompatibilityRule) {
        let key = (source_type.to_string(), rule.target_type.clone());
        let entry = self.entries.entry(key).or_insert_with(|| PairEntry {
            level: rule.compatibility_level,
            details: None,
            rules: Vec::new(),
        });
        if rule.compatibility_level.rank() > entry.level.rank() {
            entry.level = rule.compatibility_level;
        }
        if entry.details.is_none() {
            entry.details = rule.description.clone();
        }
        entry.rules.push(rule);
    }

    /// Set the pair level and explanation, replacing any previous level
    pub fn declare(
        &mut self,
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        level: CompatibilityLevel,
        details: Option<String>,
    ) {
        let entry = self
            .entries
            .entry((source_type.into(), target_type.into()))
            .or_insert_with(|| PairEntry {
                level,
                details: None,
                rules: Vec::new(),
            });
        entry.level = level;
        if details.is_some() {
            entry.details = details;
        }
    }

    /// Type-level lookup. Missing pairs are `none`.
    pub fn check(&self, source_type: &str, target_type: &str) -> CompatibilityCheck {
        let level = self
            .entry(source_type, target_type)
            .map(|e| e.level)
            .unwrap_or(CompatibilityLevel::None);
        CompatibilityCheck {
            level,
            valid: level.is_compatible(),
        }
    }

    /// Human-readable explanation for a pair (advisory only)
    pub fn details(&self, source_type: &str, target_type: &str) -> String {
        self.entry(source_type, target_type)
            .and_then(|e| e.details.clone())
            .unwrap_or_else(|| NO_DETAILS.to_string())
    }

    /// Pin-level rules declared for a pair
    pub fn rules_for(&self, source_type: &str, target_type: &str) -> &[CompatibilityRule] {
        self.entry(source_type, target_type)
            .map(|e| e.rules.as_slice())
            .unwrap_or(&[])
    }

    /// Field transformations suggested for a pair, without duplicates
    pub fn suggest_transformations(&self, source_type: &str, target_type: &str) -> Vec<FieldTransformation> {
        let mut suggestions: Vec<FieldTransformation> = Vec::new();
        for rule in self.rules_for(source_type, target_type) {
            for t in &rule.transformations {
                if !suggestions.contains(t) {
                    suggestions.push(t.clone());
                }
            }
        }
        suggestions
    }

    /// Validate a concrete pin-to-pin connection
    ///
    /// A `none` pair level is an error. A schema type mismatch is a
    /// warning, and notes about partial or conditional connections are
    /// info; neither affects `compatible`.
    pub fn validate_compatibility(&self, source: &PinRef, target: &PinRef) -> CompatibilityReport {
        let mut issues = Vec::new();
        let check = self.check(&source.node_type, &target.node_type);

        match check.level {
            CompatibilityLevel::None => issues.push(CompatibilityIssue::new(
                IssueSeverity::Error,
                format!(
                    "Node type '{}' is not compatible with '{}'",
                    source.node_type, target.node_type
                ),
            )),
            CompatibilityLevel::Partial | CompatibilityLevel::Conditional => {
                issues.push(CompatibilityIssue::new(
                    IssueSeverity::Info,
                    format!(
                        "{} compatibility: {}",
                        check.level,
                        self.details(&source.node_type, &target.node_type)
                    ),
                ))
            }
            CompatibilityLevel::Full => {}
        }

        if let (Some(source_type), Some(target_type)) = (
            source.schema.as_ref().and_then(|s| s.schema_type),
            target.schema.as_ref().and_then(|s| s.schema_type),
        ) {
            if !source_type.is_compatible_with(&target_type) {
                issues.push(CompatibilityIssue::new(
                    IssueSeverity::Warning,
                    format!(
                        "Schema type mismatch: '{}.{}' produces {} but '{}.{}' expects {}",
                        source.node_type, source.pin, source_type, target.node_type, target.pin, target_type
                    ),
                ));
            }
        }

        let rules = self.rules_for(&source.node_type, &target.node_type);
        let matching: Vec<&CompatibilityRule> = rules
            .iter()
            .filter(|r| r.output_pin == source.pin && r.target_input_pin == target.pin)
            .collect();
        if !rules.is_empty() && matching.is_empty() {
            issues.push(CompatibilityIssue::new(
                IssueSeverity::Info,
                format!(
                    "No rule declared for pins '{}' -> '{}'; using type-level compatibility",
                    source.pin, target.pin
                ),
            ));
        }
        for rule in matching {
            for condition in &rule.conditions {
                issues.push(CompatibilityIssue::new(
                    IssueSeverity::Info,
                    format!("Condition on '{}': {}", condition.field, condition.requirement),
                ));
            }
        }

        let has_errors = issues.iter().any(|i| i.severity == IssueSeverity::Error);
        CompatibilityReport {
            compatible: check.valid && !has_errors,
            issues,
        }
    }

    /// Number of declared pairs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, source_type: &str, target_type: &str) -> Option<&PairEntry> {
        self.entries
            .get(&(source_type.to_string(), target_type.to_string()))
    }
}

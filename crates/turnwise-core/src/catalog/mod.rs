//! Rule catalog.
//!
//! The catalog maps canonical rule tags to immutable [`RuleDefinition`]s. It
//! is built once (from the embedded built-in table or a user-supplied YAML/JSON
//! document), validated against JSON Schema and then semantically, and shared
//! read-only afterwards.

mod rules;
mod schema;

pub use rules::{
    Applicability, FieldType, KwargField, KwargsSchema, Precondition, RuleDefinition, RuleKind,
};
pub use schema::{validate_catalog_schema, SchemaError};

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::tag::RuleTag;

/// Built-in rule table (loaded at compile time).
const BUILTIN_CATALOG_YAML: &str = include_str!("../../catalog/builtin.yaml");

/// Errors that can occur when loading a catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Catalog does not match schema: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("Catalog validation failed: {0}")]
    ValidationError(String),
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    catalog_version: String,
    rules: Vec<RuleDefinition>,
}

/// Read-only registry of rule definitions.
#[derive(Debug, Clone)]
pub struct Catalog {
    version: String,

    /// Canonical tag string to definition
    rules: BTreeMap<String, Arc<RuleDefinition>>,

    /// (class, name) to canonical tag, for legacy `multi_turn:<class>:<name>` tags
    legacy: BTreeMap<(Applicability, String), String>,
}

impl Catalog {
    /// The built-in rule table.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml(BUILTIN_CATALOG_YAML)
    }

    /// Parse a catalog from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, CatalogError> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse a catalog from JSON string.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse a catalog from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a catalog from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    fn from_value(value: serde_json::Value) -> Result<Self, CatalogError> {
        validate_catalog_schema(&value).map_err(CatalogError::SchemaViolation)?;
        let document: CatalogDocument = serde_json::from_value(value)?;
        Self::from_rules(document.catalog_version, document.rules)
    }

    /// Build a catalog from definitions already in memory.
    pub fn from_rules(
        version: impl Into<String>,
        definitions: Vec<RuleDefinition>,
    ) -> Result<Self, CatalogError> {
        Self::validate(&definitions)?;

        let mut rules = BTreeMap::new();
        let mut legacy = BTreeMap::new();
        for definition in definitions {
            let canonical = definition.tag().to_string();
            if definition.applicability.is_multi_turn() {
                legacy.insert(
                    (definition.applicability, definition.name.clone()),
                    canonical.clone(),
                );
            }
            rules.insert(canonical, Arc::new(definition));
        }

        tracing::debug!(rules = rules.len(), "Rule catalog loaded");

        Ok(Self {
            version: version.into(),
            rules,
            legacy,
        })
    }

    /// Validate the definitions as a whole.
    fn validate(definitions: &[RuleDefinition]) -> Result<(), CatalogError> {
        let mut tags = HashSet::new();
        let mut ids = HashSet::new();
        let mut legacy_keys = HashSet::new();

        for rule in definitions {
            let tag = rule.tag().to_string();
            if !tags.insert(tag.clone()) {
                return Err(CatalogError::ValidationError(format!(
                    "Duplicate rule tag: {}",
                    tag
                )));
            }

            if !ids.insert((rule.applicability.is_multi_turn(), rule.id)) {
                return Err(CatalogError::ValidationError(format!(
                    "Duplicate rule id {} for {}",
                    rule.id, tag
                )));
            }

            if rule.applicability.is_multi_turn()
                && !legacy_keys.insert((rule.applicability, rule.name.as_str()))
            {
                return Err(CatalogError::ValidationError(format!(
                    "Ambiguous legacy tag multi_turn:{}:{}",
                    rule.applicability, rule.name
                )));
            }

            Self::validate_kwargs(&tag, rule)?;
        }

        Ok(())
    }

    fn validate_kwargs(tag: &str, rule: &RuleDefinition) -> Result<(), CatalogError> {
        for (name, field) in &rule.kwargs {
            if field.field_type == FieldType::Enum && field.values.is_empty() {
                return Err(CatalogError::ValidationError(format!(
                    "{}: enum field '{}' declares no values",
                    tag, name
                )));
            }

            if let Some(default) = &field.default {
                if !field.accepts(default) {
                    return Err(CatalogError::ValidationError(format!(
                        "{}: default {} of field '{}' does not match its type",
                        tag, default, name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Look up a rule by canonical tag.
    pub fn lookup(&self, tag: &RuleTag) -> Option<&Arc<RuleDefinition>> {
        self.rules.get(&tag.to_string())
    }

    /// Look up a rule by canonical tag string.
    pub fn get(&self, tag: &str) -> Option<&Arc<RuleDefinition>> {
        self.rules.get(tag)
    }

    /// Look up a multi-turn rule by class and name (legacy tag form).
    pub fn resolve_legacy(&self, class: Applicability, name: &str) -> Option<&Arc<RuleDefinition>> {
        self.legacy
            .get(&(class, name.to_string()))
            .and_then(|canonical| self.rules.get(canonical))
    }

    /// All rules in canonical tag order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<RuleDefinition>> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

//! JSON Schema validation for rule catalogs.
//!
//! Catalog documents are validated against `catalog/catalog.schema.json`
//! before they are deserialized, so shape errors come back as schema paths
//! rather than serde messages.

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded catalog schema (loaded at compile time).
const CATALOG_SCHEMA_JSON: &str = include_str!("../../catalog/catalog.schema.json");

/// Compiled JSON Schema validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Errors from schema validation.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(CATALOG_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| SchemaError::LoadError(e.clone()))
}

/// Validate a catalog document against the schema.
///
/// # Returns
///
/// * `Ok(())` - Document is valid
/// * `Err(Vec<String>)` - One message per violation, with its instance path
pub fn validate_catalog_schema(document: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_catalog_passes() {
        let value = serde_json::json!({
            "catalog_version": "1.0",
            "rules": [{
                "id": 4,
                "category": "ask",
                "name": "multi_question",
                "applicability": "NONE",
                "score": -1,
                "description": "一条消息问多个问题",
                "judgment": { "kind": "deterministic", "check": "question_count" }
            }]
        });
        assert!(validate_catalog_schema(&value).is_ok());
    }

    #[test]
    fn test_unknown_applicability_fails() {
        let value = serde_json::json!({
            "catalog_version": "1.0",
            "rules": [{
                "id": 1,
                "category": "ask",
                "name": "x",
                "applicability": "LAST_N",
                "score": 1,
                "description": "d"
            }]
        });
        let errors = validate_catalog_schema(&value).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_colon_in_name_fails() {
        let value = serde_json::json!({
            "catalog_version": "1.0",
            "rules": [{
                "id": 1,
                "category": "ask",
                "name": "a:b",
                "applicability": "NONE",
                "score": 1,
                "description": "d"
            }]
        });
        assert!(validate_catalog_schema(&value).is_err());
    }
}

//! JSON Schema constraints for LLM replies that must parse into a known
//! shape (`ExecutionPlan`, the summary `{answer, reasoning}` reply).
//! Compiled once per call site with the `jsonschema` crate, the same way
//! this codebase's tool-argument validator does it.

use serde_json::Value;
use std::sync::OnceLock;

fn plan_schema() -> &'static Value {
    static SCHEMA: OnceLock<Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        serde_json::json!({
            "type": "object",
            "required": ["steps"],
            "properties": {
                "steps": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "required": ["title", "description", "services"],
                        "properties": {
                            "title": {"type": "string", "minLength": 1},
                            "description": {"type": "string"},
                            "services": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "required": ["service_name", "operations"],
                                    "properties": {
                                        "service_name": {"type": "string", "minLength": 1},
                                        "operations": {
                                            "type": "array",
                                            "items": {"type": "string", "minLength": 1}
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        })
    })
}

fn summary_schema() -> &'static Value {
    static SCHEMA: OnceLock<Value> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        serde_json::json!({
            "type": "object",
            "required": ["answer", "reasoning"],
            "properties": {
                "answer": {"type": "string"},
                "reasoning": {"type": "string"}
            }
        })
    })
}

/// Parses `text` as JSON and validates it against `schema`, returning the
/// parsed value on success or a list of human-readable violations.
fn validate_against(text: &str, schema: &Value) -> Result<Value, Vec<String>> {
    let value: Value = serde_json::from_str(text).map_err(|e| vec![format!("reply was not valid JSON: {e}")])?;

    let compiled = jsonschema::JSONSchema::compile(schema)
        .expect("schema constants compiled once at startup and are known-valid");

    match compiled.validate(&value) {
        Ok(()) => Ok(value),
        Err(errors) => Err(errors.map(|e| format!("{}: {}", e.instance_path, e)).collect()),
    }
}

/// Validates a candidate plan reply against the `ExecutionPlan` JSON schema.
pub fn validate_plan_reply(text: &str) -> Result<Value, Vec<String>> {
    validate_against(text, plan_schema())
}

/// Validates a candidate summary reply against the `{answer, reasoning}`
/// JSON schema.
pub fn validate_summary_reply(text: &str) -> Result<Value, Vec<String>> {
    validate_against(text, summary_schema())
}

//! Action input/output contract types
//!
//! Every orchestrator capability is an independently addressable action with
//! a declared name, typed parameters, and a typed return value. These types
//! are the contract: the dispatcher validates against them and the Conductor
//! plans over them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while reading action parameters
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter '{0}': {1}")]
    InvalidParameter(String, String),
}

/// Declared contract of a single action in the registry
///
/// `parameters` and `returns` are JSON-schema-shaped descriptions; they are
/// rendered into the Conductor's planning instructions so the model selects
/// actions by name against a known surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Unique action name (e.g. "write_post_caption")
    pub name: String,

    /// One-sentence description of what the action does
    pub description: String,

    /// Parameter schema: parameter name -> {type, description, required}
    pub parameters: serde_json::Value,

    /// Return value schema
    pub returns: serde_json::Value,
}

/// Input to an action invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionInput {
    pub action: String,
    pub params: HashMap<String, serde_json::Value>,
}

impl ActionInput {
    /// Create a new input for the named action
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: HashMap::new(),
        }
    }

    /// Add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Get a required string parameter
    pub fn param_str(&self, key: &str) -> Result<String, ActionError> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| ActionError::MissingParameter(key.to_string()))
    }

    /// Get a required i64 parameter
    pub fn param_i64(&self, key: &str) -> Result<i64, ActionError> {
        self.params
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ActionError::MissingParameter(key.to_string()))
    }

    /// Get an optional string parameter
    pub fn param_str_opt(&self, key: &str) -> Option<String> {
        self.params
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    /// Get an optional i64 parameter
    pub fn param_i64_opt(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(|v| v.as_i64())
    }

    /// Get a required parameter as a raw JSON value
    pub fn param_json(&self, key: &str) -> Result<&serde_json::Value, ActionError> {
        self.params
            .get(key)
            .ok_or_else(|| ActionError::MissingParameter(key.to_string()))
    }

    /// Get an optional parameter as a raw JSON value
    pub fn param_json_opt(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }
}

/// Output from an action invocation
///
/// `data` is the verbatim structured result of the action. Downstream steps
/// consume it as-is; nothing in the engine summarizes or truncates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutput {
    pub success: bool,
    pub data: serde_json::Value,
    pub error: Option<String>,
}

impl ActionOutput {
    /// Create a successful output with text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            success: true,
            data: serde_json::json!({ "text": text.into() }),
            error: None,
        }
    }

    /// Create a successful output with JSON data
    pub fn json(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    /// Create an error output
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

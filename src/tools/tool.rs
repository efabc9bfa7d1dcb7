//! Tool abstraction for the conversational surface.
//!
//! Every workflow operation an assistant can invoke is a `Tool`: a name, a
//! JSON-schema parameter description, and an async `execute`. Outcomes the
//! assistant should relay in conversation ("no transaction found") are
//! successful outputs with human-readable text, not errors; `ToolError` is
//! reserved for malformed calls and internal failures.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("tool not found: {0}")]
    NotFound(String),
}

/// Result of a tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub content: String,
    pub duration_ms: u64,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>, duration: Duration) -> Self {
        Self {
            content: content.into(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Serialize `value` as the output body.
    pub fn json<T: Serialize>(value: &T, duration: Duration) -> Result<Self, ToolError> {
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        Ok(Self::text(content, duration))
    }
}

/// A capability exposed to the conversational layer.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name (snake_case).
    fn name(&self) -> &str;

    /// Human-readable description for function calling.
    fn description(&self) -> &str;

    /// JSON schema of the accepted parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given parameters.
    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError>;
}

/// Extract a required string parameter.
pub fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing required parameter: {key}")))
}

/// Extract an optional string parameter.
pub fn optional_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

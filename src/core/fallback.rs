//! Bounded-attempt execution with a labelled local fallback.
//!
//! Any tool that depends on an external service is run through
//! [`FallbackExecutor::execute_with_fallback`]. The primary attempt is skipped
//! when the service is not configured and is otherwise bounded by a timeout.
//! Whatever goes wrong, the caller receives a well-formed analysis object;
//! only its `status` marker tells the two paths apart.

use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::core::registry::{ExternalTool, ToolArguments};

/// Status marker for results produced by the external service.
pub const STATUS_PRIMARY: &str = "ai_analysis";

/// Status marker for locally synthesized results.
pub const STATUS_FALLBACK: &str = "mock_analysis";

/// Default bound on the primary attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Failure of an external dependency. Never surfaced to protocol callers.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("external service is not configured")]
    NotConfigured,

    #[error("external call timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("external service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Why the fallback path was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    NotConfigured,
    Timeout,
    Failed(String),
}

impl FallbackReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Timeout => "timeout",
            Self::Failed(_) => "request_failed",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => f.write_str("external service not configured"),
            Self::Timeout => f.write_str("external service timed out"),
            Self::Failed(detail) => write!(f, "external service failed: {}", detail),
        }
    }
}

impl From<&DependencyError> for FallbackReason {
    fn from(err: &DependencyError) -> Self {
        match err {
            DependencyError::NotConfigured => Self::NotConfigured,
            DependencyError::Timeout(_) => Self::Timeout,
            other => Self::Failed(other.to_string()),
        }
    }
}

/// Runs external tools with a bounded primary attempt and a local fallback.
#[derive(Debug, Clone, Copy)]
pub struct FallbackExecutor {
    timeout: Duration,
}

impl Default for FallbackExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl FallbackExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run `tool`, substituting its fallback on any failure of the primary
    /// path. Always returns an analysis object carrying a `status` marker.
    pub async fn execute_with_fallback(
        &self,
        tool: &dyn ExternalTool,
        arguments: &ToolArguments,
    ) -> Value {
        let name = &tool.descriptor().name;

        let attempt = if tool.is_configured() {
            match tokio::time::timeout(self.timeout, tool.primary(arguments)).await {
                Ok(result) => result,
                Err(_) => Err(DependencyError::Timeout(self.timeout)),
            }
        } else {
            Err(DependencyError::NotConfigured)
        };

        match attempt {
            Ok(analysis) => {
                tracing::debug!(tool = %name, "External analysis succeeded");
                stamp(analysis, STATUS_PRIMARY, None)
            }
            Err(err) => {
                let reason = FallbackReason::from(&err);
                match &err {
                    DependencyError::NotConfigured => {
                        tracing::debug!(tool = %name, "External service not configured, using fallback");
                    }
                    _ => {
                        tracing::warn!(tool = %name, error = %err, "External analysis failed, using fallback");
                    }
                }
                let analysis = tool.fallback(arguments, &reason);
                stamp(analysis, STATUS_FALLBACK, Some(&reason))
            }
        }
    }
}

fn stamp(analysis: Value, status: &str, reason: Option<&FallbackReason>) -> Value {
    let mut object = match analysis {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    };
    object.insert("status".to_string(), json!(status));
    match reason {
        Some(reason) => {
            object.insert("fallback_reason".to_string(), json!(reason.code()));
        }
        None => {
            object.remove("fallback_reason");
        }
    }
    Value::Object(object)
}

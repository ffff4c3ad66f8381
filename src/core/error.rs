//! Error taxonomy for the protocol engine.
//!
//! Every failure a caller can observe is a [`ProtocolError`], which maps onto a
//! JSON-RPC error code. Tool-level failures ([`ToolError`]) and argument
//! validation failures ([`ValidationError`]) are wrapped into it by the
//! dispatcher. Failures of external services never appear here; they are
//! absorbed by the fallback executor (see [`crate::core::fallback`]).

use serde_json::{Value, json};
use thiserror::Error;

use crate::core::protocol::RpcError;

/// JSON-RPC 2.0 error codes used by this server.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// A request-scoped failure surfaced to the caller as a JSON-RPC error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error(transparent)]
    InvalidArguments(#[from] ValidationError),

    #[error("Tool '{tool}' failed: {source}")]
    ToolExecution {
        tool: String,
        #[source]
        source: ToolError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    /// JSON-RPC error code for this failure.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => codes::PARSE_ERROR,
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) | Self::UnknownTool(_) | Self::InvalidArguments(_) => {
                codes::INVALID_PARAMS
            }
            Self::ToolExecution { .. } | Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    fn data(&self) -> Option<Value> {
        match self {
            Self::UnknownTool(tool) => Some(json!({ "tool": tool })),
            Self::InvalidArguments(err) => Some(json!({
                "tool": err.tool(),
                "parameter": err.parameter(),
            })),
            Self::ToolExecution { tool, .. } => Some(json!({ "tool": tool })),
            _ => None,
        }
    }
}

impl From<&ProtocolError> for RpcError {
    fn from(err: &ProtocolError) -> Self {
        RpcError {
            code: err.code(),
            message: err.to_string(),
            data: err.data(),
        }
    }
}

impl From<ProtocolError> for RpcError {
    fn from(err: ProtocolError) -> Self {
        RpcError::from(&err)
    }
}

/// Rejection of a `tools/call` argument object against a tool descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Arguments for tool '{tool}' must be an object")]
    NotAnObject { tool: String },

    #[error("Missing required parameter '{parameter}' for tool '{tool}'")]
    Missing { tool: String, parameter: String },

    #[error("Parameter '{parameter}' for tool '{tool}' must be of type {expected}, got {actual}")]
    WrongType {
        tool: String,
        parameter: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Parameter '{parameter}' for tool '{tool}' must be one of: {allowed}")]
    NotAllowed {
        tool: String,
        parameter: String,
        allowed: String,
    },

    #[error("Unknown parameter '{parameter}' for tool '{tool}'")]
    Unknown { tool: String, parameter: String },
}

impl ValidationError {
    pub fn tool(&self) -> &str {
        match self {
            Self::NotAnObject { tool }
            | Self::Missing { tool, .. }
            | Self::WrongType { tool, .. }
            | Self::NotAllowed { tool, .. }
            | Self::Unknown { tool, .. } => tool,
        }
    }

    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::NotAnObject { .. } => None,
            Self::Missing { parameter, .. }
            | Self::WrongType { parameter, .. }
            | Self::NotAllowed { parameter, .. }
            | Self::Unknown { parameter, .. } => Some(parameter),
        }
    }
}

/// Failure raised by a local tool while computing its result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

//! JSON-RPC 2.0 envelopes for the MCP protocol.
//!
//! Requests are decoded by [`parse`], which works on raw transport bytes so the
//! HTTP and STDIO adapters share one code path. Responses serialize to either
//! `{"jsonrpc","id","result"}` or `{"jsonrpc","id","error"}`, never both.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::error::ProtocolError;

/// JSON-RPC protocol version accepted and emitted by this server.
pub const JSONRPC_VERSION: &str = "2.0";

/// Emitted when a response cannot be encoded.
const SERIALIZATION_FAILURE: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error: response serialization failed"}}"#;

/// Prefix of the methods clients send without an id.
const NOTIFICATION_PREFIX: &str = "notifications/";

/// Request identifier supplied by the caller and echoed on the response.
///
/// Numbers keep their original representation (`7` stays `7`, `1e3` stays
/// `1e3`, integers past `u64` stay exact) because serde_json is built with
/// `arbitrary_precision`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(serde_json::Number),
    String(String),
    Null,
}

impl RequestId {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n)),
            Value::String(s) => Some(Self::String(s)),
            Value::Null => Some(Self::Null),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "\"{}\"", s),
            Self::Null => f.write_str("null"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Number(id.into())
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

/// A decoded request that expects a response.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
}

/// A decoded notification (no id, no response).
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Option<Value>,
}

/// Anything the parser accepts from a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Request(Request),
    Notification(Notification),
}

/// Malformed envelope. Carries whatever id could be recovered so the error
/// response can still be correlated by the caller.
#[derive(Debug, Clone, Error)]
#[error("{detail}")]
pub struct ParseError {
    pub id: RequestId,
    pub detail: String,
}

impl ParseError {
    fn new(id: RequestId, detail: impl Into<String>) -> Self {
        Self {
            id,
            detail: detail.into(),
        }
    }
}

impl From<ParseError> for ProtocolError {
    fn from(err: ParseError) -> Self {
        ProtocolError::Parse(err.detail)
    }
}

/// Decode a JSON-RPC envelope from raw transport bytes.
pub fn parse(body: &[u8]) -> Result<Incoming, ParseError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ParseError::new(RequestId::Null, e.to_string()))?;

    let Value::Object(mut envelope) = value else {
        return Err(ParseError::new(
            RequestId::Null,
            "envelope must be a JSON object",
        ));
    };

    // Recover the id first so every later rejection can echo it
    let id = match envelope.remove("id") {
        Some(raw) => match RequestId::from_value(raw) {
            Some(id) => Some(id),
            None => {
                return Err(ParseError::new(
                    RequestId::Null,
                    "id must be a number, a string or null",
                ));
            }
        },
        None => None,
    };
    let recovered = id.clone().unwrap_or(RequestId::Null);

    match envelope.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err(ParseError::new(
                recovered,
                format!("unsupported jsonrpc version '{}'", other),
            ));
        }
        None => return Err(ParseError::new(recovered, "missing jsonrpc version")),
    }

    let method = match envelope.remove("method") {
        Some(Value::String(method)) => method,
        Some(_) => return Err(ParseError::new(recovered, "method must be a string")),
        None => return Err(ParseError::new(recovered, "missing method")),
    };

    let params = envelope.remove("params").filter(|p| !p.is_null());

    match id {
        Some(id) => Ok(Incoming::Request(Request { id, method, params })),
        None if method.starts_with(NOTIFICATION_PREFIX) => {
            Ok(Incoming::Notification(Notification { method, params }))
        }
        None => Err(ParseError::new(RequestId::Null, "missing id")),
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Result or error half of a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Payload {
    Result(Value),
    Error(RpcError),
}

/// JSON-RPC response envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    jsonrpc: &'static str,
    pub id: RequestId,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            payload: Payload::Result(result),
        }
    }

    pub fn failure(id: RequestId, error: impl Into<RpcError>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            payload: Payload::Error(error.into()),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Result(value) => Some(value),
            Payload::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&RpcError> {
        match &self.payload {
            Payload::Error(err) => Some(err),
            Payload::Result(_) => None,
        }
    }

    /// Encode the envelope for the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize response");
            SERIALIZATION_FAILURE.as_bytes().to_vec()
        })
    }
}

/// Server identity reported by `initialize` and `ping`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// One typed content block of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
}

/// Successful `tools/call` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ContentBlock>,
    pub is_error: bool,
}

impl CallToolResult {
    /// Wrap an analysis object as a single JSON-encoded text block.
    pub fn from_analysis(analysis: &Value) -> Result<Self, serde_json::Error> {
        Ok(Self {
            content: vec![ContentBlock::Text {
                text: serde_json::to_string(analysis)?,
            }],
            is_error: false,
        })
    }
}

//! Routes parsed requests to the MCP method handlers.
//!
//! The dispatcher owns the server identity, a shared read-only handle on the
//! tool registry and the fallback executor. It is built once at startup and
//! shared by every transport; handling a request never mutates it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::Instrument;

use crate::core::error::ProtocolError;
use crate::core::fallback::FallbackExecutor;
use crate::core::protocol::{self, CallToolResult, Incoming, Request, Response, ServerInfo};
use crate::core::registry::{ToolHandle, ToolRegistry};

/// Protocol revisions this server can speak. The first one is answered when
/// the client asks for something else.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

#[derive(Debug, Deserialize)]
struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    protocol_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Protocol dispatcher shared by all transports.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    info: ServerInfo,
    registry: Arc<ToolRegistry>,
    fallback: FallbackExecutor,
}

impl Dispatcher {
    pub fn new(info: ServerInfo, registry: Arc<ToolRegistry>, fallback: FallbackExecutor) -> Self {
        Self {
            info,
            registry,
            fallback,
        }
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Transport entry point: raw bytes in, response out.
    ///
    /// Returns `None` for notifications, which get no response.
    pub async fn handle_bytes(&self, body: &[u8]) -> Option<Response> {
        match protocol::parse(body) {
            Ok(Incoming::Request(request)) => Some(self.dispatch(request).await),
            Ok(Incoming::Notification(notification)) => {
                tracing::debug!(method = %notification.method, "Received notification");
                None
            }
            Err(err) => {
                tracing::warn!(id = %err.id, error = %err, "Rejected malformed request");
                let id = err.id.clone();
                Some(Response::failure(id, ProtocolError::from(err)))
            }
        }
    }

    /// Handle one request to completion. Never panics and never fails: every
    /// outcome is a response envelope echoing the request id.
    pub async fn dispatch(&self, request: Request) -> Response {
        let id = request.id.clone();
        let span = tracing::info_span!("rpc", id = %id, method = %request.method);

        let outcome = AssertUnwindSafe(self.route(request))
            .catch_unwind()
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        match outcome {
            Ok(Ok(result)) => Response::success(id, result),
            Ok(Err(err)) => {
                match &err {
                    ProtocolError::ToolExecution { .. } | ProtocolError::Internal(_) => {
                        tracing::error!(error = %err, "Request failed");
                    }
                    _ => tracing::info!(code = err.code(), error = %err, "Request rejected"),
                }
                Response::failure(id, err)
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                tracing::error!(panic = %detail, "Handler panicked");
                Response::failure(id, ProtocolError::Internal(detail))
            }
        }
    }

    async fn route(&self, request: Request) -> Result<Value, ProtocolError> {
        match request.method.as_str() {
            "initialize" => self.initialize(request.params),
            "ping" => Ok(self.ping()),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool(request.params).await,
            other => Err(ProtocolError::MethodNotFound(other.to_string())),
        }
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, ProtocolError> {
        let requested = match params {
            None => None,
            Some(params @ Value::Object(_)) => {
                let params: InitializeParams = serde_json::from_value(params)
                    .map_err(|e| ProtocolError::InvalidParams(e.to_string()))?;
                params.protocol_version
            }
            Some(_) => {
                return Err(ProtocolError::InvalidParams(
                    "initialize params must be an object".to_string(),
                ));
            }
        };

        let version = requested
            .as_deref()
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);

        Ok(json!({
            "protocolVersion": version,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": self.info,
        }))
    }

    fn ping(&self) -> Value {
        json!({
            "status": "ok",
            "server": self.info.name,
            "version": self.info.version,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Value> = self.registry.descriptors().map(|d| d.to_listing()).collect();
        json!({ "tools": tools })
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, ProtocolError> {
        let params = match params {
            Some(params @ Value::Object(_)) => params,
            Some(_) => {
                return Err(ProtocolError::InvalidParams(
                    "tools/call params must be an object".to_string(),
                ));
            }
            None => {
                return Err(ProtocolError::InvalidParams(
                    "tools/call requires params with a tool name".to_string(),
                ));
            }
        };
        let params: CallToolParams = serde_json::from_value(params)
            .map_err(|e| ProtocolError::InvalidParams(e.to_string()))?;

        let tool = self
            .registry
            .get(&params.name)
            .ok_or_else(|| ProtocolError::UnknownTool(params.name.clone()))?;

        let arguments = tool.descriptor().validate(params.arguments)?;

        let analysis = match tool {
            ToolHandle::Local(tool) => {
                tool.execute(&arguments)
                    .await
                    .map_err(|source| ProtocolError::ToolExecution {
                        tool: params.name.clone(),
                        source,
                    })?
            }
            ToolHandle::External(tool) => {
                self.fallback
                    .execute_with_fallback(tool.as_ref(), &arguments)
                    .await
            }
        };

        let result = CallToolResult::from_analysis(&analysis)
            .and_then(serde_json::to_value)
            .map_err(|e| ProtocolError::Internal(e.to_string()))?;

        tracing::info!(tool = %params.name, "Tool call completed");
        Ok(result)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#![allow(dead_code)]

use mcp_analysis::core::config::ServerConfig;
use mcp_analysis::core::dispatcher::Dispatcher;
use mcp_analysis::core::server::build_dispatcher;
use serde_json::{Value, json};

pub fn dispatcher() -> Dispatcher {
    dispatcher_with(ServerConfig::default())
}

pub fn dispatcher_with(config: ServerConfig) -> Dispatcher {
    build_dispatcher(&config).unwrap()
}

/// Send one raw envelope and decode the response bytes.
pub async fn roundtrip(dispatcher: &Dispatcher, body: &str) -> Value {
    let response = dispatcher
        .handle_bytes(body.as_bytes())
        .await
        .expect("request should produce a response");
    serde_json::from_slice(&response.to_bytes()).unwrap()
}

pub async fn call(dispatcher: &Dispatcher, id: i64, tool: &str, arguments: Value) -> Value {
    let body = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": tool, "arguments": arguments }
    });
    roundtrip(dispatcher, &body.to_string()).await
}

/// Decode the analysis object carried in the first content block.
pub fn analysis(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"]
        .as_str()
        .expect("result should carry a text block");
    serde_json::from_str(text).unwrap()
}

//! MCP analysis server: a JSON-RPC 2.0 tool server speaking the Model Context
//! Protocol over HTTP and STDIO.

pub mod core;
pub mod tools;

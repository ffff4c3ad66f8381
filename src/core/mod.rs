//! Core Server Framework Module
//!
//! Protocol handling shared by every transport:
//! - protocol.rs: JSON-RPC envelopes, parsing and response encoding
//! - registry.rs: tool descriptors, argument validation and the tool registry
//! - dispatcher.rs: method routing
//! - fallback.rs: degradation for tools that depend on external services
//! - config.rs: environment-driven configuration
//! - server.rs: HTTP and STDIO transports

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fallback;
pub mod protocol;
pub mod registry;
pub mod server;

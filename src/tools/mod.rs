//! Tools Module
//!
//! Concrete tool implementations and the startup wiring that turns the
//! configuration into a registry. Add new tools to [`CATALOG`] and to
//! [`enabled_for`].

pub mod code_review;
pub mod dependencies;
pub mod llm;
pub mod markdown;

use crate::core::config::{ConfigError, ServerConfig};
use crate::core::registry::ToolRegistry;

pub use code_review::CodeReviewer;
pub use dependencies::DependencyScanner;
pub use llm::ChatClient;
pub use markdown::MarkdownChecker;

/// Every tool this server knows, in registration order.
pub const CATALOG: &[&str] = &[markdown::NAME, dependencies::NAME, code_review::NAME];

/// Build the registry from the static catalog, skipping tools switched off in
/// the configuration. Called once at startup.
pub fn enabled_for(config: &ServerConfig) -> Result<ToolRegistry, ConfigError> {
    for name in config.tools.configured_names() {
        if !CATALOG.contains(&name) {
            tracing::warn!(tool = %name, "Configuration mentions an unknown tool, ignoring");
        }
    }

    let mut registry = ToolRegistry::new();
    let enabled = |name: &str| {
        let on = config.tools.is_enabled(name);
        if !on {
            tracing::info!(tool = %name, "Tool disabled by configuration");
        }
        on
    };

    if enabled(markdown::NAME) {
        registry.register_local(MarkdownChecker::new());
    }
    if enabled(dependencies::NAME) {
        registry.register_local(DependencyScanner::new());
    }
    if enabled(code_review::NAME) {
        let client = ChatClient::new(&config.llm)?;
        if !client.is_configured() {
            tracing::info!(
                tool = code_review::NAME,
                "No LLM credentials configured, reviews will use the local fallback"
            );
        }
        registry.register_external(CodeReviewer::new(client));
    }

    tracing::info!(count = registry.len(), tools = ?registry.names(), "Tool registry initialized");
    Ok(registry)
}

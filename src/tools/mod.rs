/// Tools Module
///
/// This module contains all tool implementations. Each tool family exports a
/// `register` function that adds its tools to the registry during start-up.

pub mod echo;
pub mod powerbi;

use std::sync::Arc;

use crate::mcp::error::DispatchError;
use crate::mcp::registry::ToolRegistry;
use powerbi::client::PowerBiClient;

/// Build the registry with every available tool.
///
/// A duplicate tool name is a misconfigured tool set and is returned as an
/// error so start-up can abort. The Power BI tools all use `powerbi`.
pub fn build_registry(powerbi: Arc<PowerBiClient>) -> Result<ToolRegistry, DispatchError> {
    let mut registry = ToolRegistry::new();

    // Add new tool registrations here following this pattern:
    // your_tool::register(&mut registry)?;
    echo::register(&mut registry)?;
    powerbi::register(&mut registry, powerbi)?;

    tracing::info!(tools = registry.len(), "tool registry initialized");
    Ok(registry)
}

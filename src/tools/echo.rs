/// Echo Tool Implementation
///
/// Minimal example tool: returns its `text` argument unchanged as `{text}`.

use serde_json::json;

use crate::mcp::error::DispatchError;
use crate::mcp::registry::{Tool, ToolRegistry};
use crate::mcp::schema::{ArgumentSchema, ParamType};

/// Register the echo tool with the tool registry.
pub fn register(registry: &mut ToolRegistry) -> Result<(), DispatchError> {
    let schema = ArgumentSchema::new().required("text", ParamType::String, "The text to echo");

    registry.register(Tool::new(
        "echo",
        "Echo a message back to the client.",
        schema,
        // `text` is guaranteed present and a string by schema validation
        |args| Ok(json!({ "text": args["text"] })),
    ))
}

/// Tool Registry
///
/// Holds every tool the router can invoke. The registry is filled once during
/// start-up and then shared read-only behind an `Arc`, so lookups need no
/// locking.

use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::mcp::error::DispatchError;
use crate::mcp::schema::ArgumentSchema;

/// Validated arguments handed to a tool handler.
pub type ToolArgs = Map<String, Value>;

/// Tool handler function type definition.
///
/// Handlers receive arguments that already passed schema validation and
/// return either a JSON result or an error string. They must be Send + Sync
/// to be shared across HTTP worker threads.
pub type ToolHandler =
    Arc<dyn Fn(ToolArgs) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// A registered tool: metadata plus the handler that executes it.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub schema: ArgumentSchema,
    pub handler: ToolHandler,
}

impl Tool {
    /// Create a tool from a synchronous handler.
    pub fn new<F>(name: &str, description: &str, schema: ArgumentSchema, handler: F) -> Self
    where
        F: Fn(ToolArgs) -> Result<Value, String> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        Self::with_handler(
            name,
            description,
            schema,
            Arc::new(move |args: ToolArgs| {
                let handler = handler.clone();
                async move { handler(args) }.boxed()
            }),
        )
    }

    /// Create a tool from an async handler.
    pub fn new_async<F, Fut>(name: &str, description: &str, schema: ArgumentSchema, handler: F) -> Self
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self::with_handler(
            name,
            description,
            schema,
            Arc::new(move |args: ToolArgs| handler(args).boxed()),
        )
    }

    fn with_handler(
        name: &str,
        description: &str,
        schema: ArgumentSchema,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            schema,
            handler,
        }
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            schema: self.schema.to_json_schema(),
        }
    }
}

/// Tool metadata as returned by `list_tools`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

/// Registry of available tools, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Tool) -> Result<(), DispatchError> {
        if self.index.contains_key(&tool.name) {
            return Err(DispatchError::DuplicateToolName(tool.name));
        }
        self.index.insert(tool.name.clone(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Descriptors of every registered tool, in registration order.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(Tool::descriptor).collect()
    }

    /// Exact-name lookup.
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Tool Executor
///
/// Resolves a tool by name, validates the arguments against its schema and
/// runs the handler. Handler failures, including panics, come back as
/// `ToolExecutionError`; nothing raw escapes to the caller.

use futures_util::FutureExt;
use futures_util::future;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crate::mcp::error::DispatchError;
use crate::mcp::registry::ToolRegistry;
use crate::mcp::schema::ArgumentPolicy;

#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    policy: ArgumentPolicy,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, policy: ArgumentPolicy) -> Self {
        Self { registry, policy }
    }

    /// Look up `name`, validate `arguments`, invoke the handler.
    ///
    /// The handler is never invoked when lookup or validation fails. On
    /// success its value is returned unchanged.
    pub async fn execute(&self, name: &str, arguments: Value) -> Result<Value, DispatchError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| DispatchError::ToolNotFound(name.to_string()))?;

        let args = tool.schema.validate(arguments, self.policy)?;

        let started = Instant::now();
        // Build the future inside the guard: the handler call can panic too.
        let outcome = AssertUnwindSafe(future::lazy(|_| (tool.handler)(args)).flatten())
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(value)) => {
                tracing::debug!(tool = name, ?elapsed, "tool call succeeded");
                Ok(value)
            }
            Ok(Err(message)) => {
                tracing::warn!(tool = name, ?elapsed, error = %message, "tool call failed");
                Err(DispatchError::ToolExecution {
                    tool: name.to_string(),
                    message,
                })
            }
            Err(panic) => {
                let message = panic_message(&*panic);
                tracing::error!(tool = name, ?elapsed, panic = %message, "tool handler panicked");
                Err(DispatchError::ToolExecution {
                    tool: name.to_string(),
                    message: format!("handler panicked: {message}"),
                })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::error::ErrorKind;
    use crate::mcp::registry::Tool;
    use crate::mcp::schema::{ArgumentSchema, ParamType};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn executor_with(tools: Vec<Tool>) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        ToolExecutor::new(Arc::new(registry), ArgumentPolicy::Permissive)
    }

    fn counting_echo(calls: Arc<AtomicUsize>) -> Tool {
        Tool::new(
            "echo",
            "Echo text",
            ArgumentSchema::new().required("text", ParamType::String, "Text"),
            move |args| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Object(args))
            },
        )
    }

    #[tokio::test]
    async fn returns_handler_value_unchanged() {
        let calls = Arc::new(AtomicUsize::new(0));
        let executor = executor_with(vec![counting_echo(calls.clone())]);
        let result = executor.execute("echo", json!({"text": "hi"})).await.unwrap();
        assert_eq!(result, json!({"text": "hi"}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let calls = Arc::new(AtomicUsize::new(0));
        let executor = executor_with(vec![counting_echo(calls.clone())]);
        let err = executor.execute("missing", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolNotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let executor = executor_with(vec![counting_echo(calls.clone())]);
        let err = executor.execute("echo", json!({"txt": "hi"})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        assert!(err.to_string().contains("`text`"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn strict_policy_rejects_unknown_keys() {
        let mut registry = ToolRegistry::new();
        registry
            .register(counting_echo(Arc::new(AtomicUsize::new(0))))
            .unwrap();
        let executor = ToolExecutor::new(Arc::new(registry), ArgumentPolicy::Strict);
        let err = executor
            .execute("echo", json!({"text": "hi", "extra": 1}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("`extra`"));
    }

    #[tokio::test]
    async fn handler_error_is_wrapped() {
        let executor = executor_with(vec![Tool::new(
            "boom",
            "Always fails",
            ArgumentSchema::new(),
            |_| Err("backend unavailable".to_string()),
        )]);
        let err = executor.execute("boom", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolExecutionError);
        assert!(err.to_string().contains("backend unavailable"));
    }

    #[tokio::test]
    async fn handler_panic_is_caught() {
        let executor = executor_with(vec![Tool::new(
            "panics",
            "Panics when polled",
            ArgumentSchema::new(),
            |_| -> Result<Value, String> { panic!("index out of range") },
        )]);
        let err = executor.execute("panics", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolExecutionError);
        assert!(err.to_string().contains("index out of range"));
    }

    #[tokio::test]
    async fn panic_before_future_is_built_is_caught() {
        let executor = executor_with(vec![Tool::new_async(
            "eager",
            "Panics while building its future",
            ArgumentSchema::new(),
            |args| {
                if args.is_empty() {
                    panic!("no arguments to build from");
                }
                async { Ok::<_, String>(Value::Null) }
            },
        )]);
        let outcome = tokio::spawn(async move { executor.execute("eager", json!({})).await })
            .await
            .expect("panic escaped the executor");
        let err = outcome.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolExecutionError);
        assert!(err.to_string().contains("handler panicked"));
    }

    #[tokio::test]
    async fn repeated_calls_to_pure_tool_are_identical() {
        let executor = executor_with(vec![counting_echo(Arc::new(AtomicUsize::new(0)))]);
        let first = executor.execute("echo", json!({"text": "x"})).await.unwrap();
        let second = executor.execute("echo", json!({"text": "x"})).await.unwrap();
        assert_eq!(first, second);
    }
}

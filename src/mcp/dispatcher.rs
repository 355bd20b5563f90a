/// Request Dispatcher
///
/// Decodes the `{method, params}` envelope, routes it to the registry or the
/// executor, and always produces a `DispatchResponse`. No state is kept
/// between calls.

use serde::Deserialize;
use serde_json::{Value, json};
use std::str::FromStr;
use std::sync::Arc;

use crate::mcp::error::{DispatchError, DispatchResponse};
use crate::mcp::executor::ToolExecutor;
use crate::mcp::registry::ToolRegistry;
use crate::mcp::schema::ArgumentPolicy;

/// Methods the router understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    ListTools,
    CallTool,
}

impl FromStr for Method {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list_tools" => Ok(Method::ListTools),
            "call_tool" => Ok(Method::CallTool),
            other => Err(DispatchError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// `params` of a `call_tool` request.
#[derive(Deserialize, Debug)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    executor: ToolExecutor,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>, policy: ArgumentPolicy) -> Self {
        let executor = ToolExecutor::new(registry.clone(), policy);
        Self { registry, executor }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Dispatch a raw request body.
    pub async fn dispatch(&self, body: &[u8]) -> DispatchResponse {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => self.dispatch_value(value).await,
            Err(e) => {
                tracing::debug!(error = %e, "request body is not valid JSON");
                DispatchResponse::unparseable(&DispatchError::MalformedRequest(e.to_string()))
            }
        }
    }

    /// Dispatch an already-decoded request envelope.
    pub async fn dispatch_value(&self, request: Value) -> DispatchResponse {
        match self.route(request).await {
            Ok(data) => DispatchResponse::success(data),
            Err(e) => {
                tracing::info!(kind = ?e.kind(), error = %e, "request failed");
                DispatchResponse::failure(&e)
            }
        }
    }

    async fn route(&self, request: Value) -> Result<Value, DispatchError> {
        let Value::Object(mut envelope) = request else {
            return Err(DispatchError::MalformedRequest(
                "request body must be a JSON object".to_string(),
            ));
        };

        let method = match envelope.get("method") {
            Some(Value::String(m)) => m.parse::<Method>()?,
            Some(other) => return Err(DispatchError::UnsupportedMethod(other.to_string())),
            None => return Err(DispatchError::UnsupportedMethod("<missing>".to_string())),
        };
        tracing::debug!(?method, "dispatching request");

        match method {
            Method::ListTools => Ok(json!({ "tools": self.registry.list() })),
            Method::CallTool => {
                let params = envelope.remove("params").ok_or_else(|| {
                    DispatchError::MalformedRequest("call_tool requires params".to_string())
                })?;
                let params: CallToolParams = serde_json::from_value(params).map_err(|e| {
                    DispatchError::MalformedRequest(format!("invalid call_tool params: {e}"))
                })?;
                let arguments = match params.arguments {
                    None | Some(Value::Null) => json!({}),
                    Some(arguments) => arguments,
                };
                let result = self.executor.execute(&params.name, arguments).await?;
                Ok(json!({ "result": result }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::registry::Tool;
    use crate::mcp::schema::{ArgumentSchema, ParamType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo_tool() -> Tool {
        Tool::new(
            "echo",
            "Echo the text back",
            ArgumentSchema::new().required("text", ParamType::String, "Text to echo"),
            |args| Ok(json!({ "text": args["text"] })),
        )
    }

    fn dispatcher_with(tools: Vec<Tool>) -> Dispatcher {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        Dispatcher::new(Arc::new(registry), ArgumentPolicy::Permissive)
    }

    async fn dispatch_json(dispatcher: &Dispatcher, body: Value) -> Value {
        let response = dispatcher.dispatch(body.to_string().as_bytes()).await;
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn echo_scenario() {
        let dispatcher = dispatcher_with(vec![echo_tool()]);
        let response = dispatch_json(
            &dispatcher,
            json!({"method": "call_tool", "params": {"name": "echo", "arguments": {"text": "hi"}}}),
        )
        .await;
        assert_eq!(
            response,
            json!({"success": true, "data": {"result": {"text": "hi"}}})
        );
    }

    #[tokio::test]
    async fn missing_tool_scenario() {
        let dispatcher = dispatcher_with(vec![echo_tool()]);
        let response = dispatch_json(
            &dispatcher,
            json!({"method": "call_tool", "params": {"name": "missing", "arguments": {}}}),
        )
        .await;
        assert_eq!(response["success"], json!(false));
        assert_eq!(response["error"]["kind"], json!("ToolNotFound"));
        assert!(response.get("data").is_none());
    }

    #[tokio::test]
    async fn unknown_method_scenario() {
        let dispatcher = dispatcher_with(vec![]);
        let response = dispatch_json(&dispatcher, json!({"method": "unknown"})).await;
        assert_eq!(response["success"], json!(false));
        assert_eq!(response["error"]["kind"], json!("UnsupportedMethod"));
    }

    #[tokio::test]
    async fn missing_or_non_string_method_is_unsupported() {
        let dispatcher = dispatcher_with(vec![]);
        for body in [json!({}), json!({"method": 7}), json!({"params": {}})] {
            let response = dispatch_json(&dispatcher, body).await;
            assert_eq!(response["error"]["kind"], json!("UnsupportedMethod"));
        }
    }

    #[tokio::test]
    async fn malformed_json_scenario() {
        let dispatcher = dispatcher_with(vec![]);
        let response = dispatcher.dispatch(b"{\"method\": ").await;
        assert_eq!(response.status_code(), actix_web::http::StatusCode::BAD_REQUEST);
        let value = serde_json::to_value(response).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"]["kind"], json!("MalformedRequest"));
    }

    #[tokio::test]
    async fn non_object_body_is_malformed() {
        let dispatcher = dispatcher_with(vec![]);
        let response = dispatch_json(&dispatcher, json!(["list_tools"])).await;
        assert_eq!(response["error"]["kind"], json!("MalformedRequest"));
    }

    #[tokio::test]
    async fn call_tool_without_name_is_malformed() {
        let dispatcher = dispatcher_with(vec![echo_tool()]);
        for body in [
            json!({"method": "call_tool"}),
            json!({"method": "call_tool", "params": {"arguments": {}}}),
            json!({"method": "call_tool", "params": {"name": 3}}),
        ] {
            let response = dispatcher.dispatch(body.to_string().as_bytes()).await;
            assert_eq!(response.status_code(), actix_web::http::StatusCode::OK);
            let value = serde_json::to_value(response).unwrap();
            assert_eq!(value["error"]["kind"], json!("MalformedRequest"));
        }
    }

    #[tokio::test]
    async fn list_tools_returns_each_tool_once() {
        let noop = |name: &str| Tool::new(name, "noop", ArgumentSchema::new(), |_| Ok(json!(null)));
        let dispatcher = dispatcher_with(vec![echo_tool(), noop("a"), noop("b")]);
        let response = dispatch_json(&dispatcher, json!({"method": "list_tools"})).await;
        let tools = response["data"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, ["echo", "a", "b"]);
        assert_eq!(tools[0]["description"], json!("Echo the text back"));
        assert_eq!(tools[0]["schema"]["required"], json!(["text"]));
    }

    #[tokio::test]
    async fn list_tools_is_repeatable() {
        let dispatcher = dispatcher_with(vec![echo_tool()]);
        let first = dispatch_json(&dispatcher, json!({"method": "list_tools"})).await;
        let second = dispatch_json(&dispatcher, json!({"method": "list_tools"})).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn absent_arguments_default_to_empty_object() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let dispatcher = dispatcher_with(vec![Tool::new(
            "ping",
            "No arguments",
            ArgumentSchema::new(),
            move |args| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "received": args.len() }))
            },
        )]);
        for params in [json!({"name": "ping"}), json!({"name": "ping", "arguments": null})] {
            let response =
                dispatch_json(&dispatcher, json!({"method": "call_tool", "params": params})).await;
            assert_eq!(response["data"]["result"], json!({"received": 0}));
        }
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_required_argument_names_field() {
        let dispatcher = dispatcher_with(vec![echo_tool()]);
        let response = dispatch_json(
            &dispatcher,
            json!({"method": "call_tool", "params": {"name": "echo", "arguments": {}}}),
        )
        .await;
        assert_eq!(response["error"]["kind"], json!("InvalidArguments"));
        assert!(response["error"]["message"].as_str().unwrap().contains("text"));
    }

    #[tokio::test]
    async fn non_object_arguments_are_invalid() {
        let dispatcher = dispatcher_with(vec![echo_tool()]);
        let response = dispatch_json(
            &dispatcher,
            json!({"method": "call_tool", "params": {"name": "echo", "arguments": "hi"}}),
        )
        .await;
        assert_eq!(response["error"]["kind"], json!("InvalidArguments"));
    }

    #[tokio::test]
    async fn handler_failure_becomes_execution_error() {
        let dispatcher = dispatcher_with(vec![Tool::new(
            "flaky",
            "Fails",
            ArgumentSchema::new(),
            |_| Err("HTTP 503: service unavailable".to_string()),
        )]);
        let response = dispatch_json(
            &dispatcher,
            json!({"method": "call_tool", "params": {"name": "flaky"}}),
        )
        .await;
        assert_eq!(response["error"]["kind"], json!("ToolExecutionError"));
        assert!(response["error"]["message"].as_str().unwrap().contains("HTTP 503"));
    }
}

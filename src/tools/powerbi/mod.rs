/// Power BI Tools
///
/// Discovery and query tools over a Power BI tenant: list workspaces and
/// datasets, fetch a semantic model's TMDL definition, run DAX queries and
/// probe the connection. All tools share one `PowerBiClient`.

pub mod client;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::mcp::error::DispatchError;
use crate::mcp::registry::{Tool, ToolArgs, ToolRegistry};
use crate::mcp::schema::ArgumentSchema;
use client::{FABRIC_API, POWERBI_API, PowerBiClient};

#[derive(Deserialize)]
struct WorkspaceArgs {
    workspace_id: String,
}

#[derive(Deserialize)]
struct DatasetArgs {
    workspace_id: String,
    dataset_id: String,
}

#[derive(Deserialize)]
struct DaxArgs {
    workspace_id: String,
    dataset_id: String,
    query: String,
}

/// Register every Power BI tool against a shared client.
pub fn register(registry: &mut ToolRegistry, client: Arc<PowerBiClient>) -> Result<(), DispatchError> {
    let c = client.clone();
    registry.register(Tool::new_async(
        "list_workspaces",
        "List all Power BI workspaces you have access to. Returns workspace names and IDs.",
        ArgumentSchema::new(),
        move |_| list_workspaces(c.clone()),
    ))?;

    let c = client.clone();
    registry.register(Tool::new_async(
        "list_datasets",
        "List all datasets in a specific workspace. Returns dataset names and IDs.",
        ArgumentSchema::new().required_id("workspace_id", "The workspace ID to list datasets from"),
        move |args| list_datasets(c.clone(), args),
    ))?;

    let c = client.clone();
    registry.register(Tool::new_async(
        "get_model_definition",
        "Get the complete TMDL definition of a semantic model including tables, columns, measures, and relationships.",
        ArgumentSchema::new()
            .required_id("workspace_id", "The workspace ID")
            .required_id("dataset_id", "The dataset ID"),
        move |args| get_model_definition(c.clone(), args),
    ))?;

    let c = client.clone();
    registry.register(Tool::new_async(
        "execute_dax_query",
        "Execute a DAX query against a Power BI dataset. Returns query results as JSON data.",
        ArgumentSchema::new()
            .required_id("workspace_id", "The workspace ID")
            .required_id("dataset_id", "The dataset ID")
            .required_id("query", "The DAX query to execute"),
        move |args| execute_dax_query(c.clone(), args),
    ))?;

    registry.register(Tool::new_async(
        "test_connection",
        "Test the connection and authentication to Power BI API. Returns connection status.",
        ArgumentSchema::new(),
        move |_| test_connection(client.clone()),
    ))?;

    Ok(())
}

async fn list_workspaces(client: Arc<PowerBiClient>) -> Result<Value, String> {
    let body = client
        .get_json(&format!("{POWERBI_API}/groups"))
        .await
        .map_err(|e| e.to_string())?;
    Ok(summarize_collection(&body, "workspaces"))
}

async fn list_datasets(client: Arc<PowerBiClient>, args: ToolArgs) -> Result<Value, String> {
    let args: WorkspaceArgs = parse_args(args)?;
    let body = client
        .get_json(&format!("{POWERBI_API}/groups/{}/datasets", args.workspace_id))
        .await
        .map_err(|e| e.to_string())?;
    Ok(summarize_collection(&body, "datasets"))
}

async fn get_model_definition(client: Arc<PowerBiClient>, args: ToolArgs) -> Result<Value, String> {
    let args: DatasetArgs = parse_args(args)?;
    let url = format!(
        "{FABRIC_API}/workspaces/{}/semanticModels/{}/getDefinition",
        args.workspace_id, args.dataset_id
    );
    let body = client
        .post_long_running(&url)
        .await
        .map_err(|e| e.to_string())?;
    decode_definition(&body)
}

async fn execute_dax_query(client: Arc<PowerBiClient>, args: ToolArgs) -> Result<Value, String> {
    let args: DaxArgs = parse_args(args)?;
    let url = format!(
        "{POWERBI_API}/groups/{}/datasets/{}/executeQueries",
        args.workspace_id, args.dataset_id
    );
    let body = client
        .post_json(&url, &json!({ "queries": [{ "query": args.query }] }))
        .await
        .map_err(|e| e.to_string())?;
    Ok(first_result_tables(&body))
}

async fn test_connection(client: Arc<PowerBiClient>) -> Result<Value, String> {
    client.refresh_token().await.map_err(|e| e.to_string())?;
    Ok(json!({
        "authenticated": true,
        "message": "Authentication successful! Token obtained and ready to use.",
    }))
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: ToolArgs) -> Result<T, String> {
    serde_json::from_value(Value::Object(args)).map_err(|e| e.to_string())
}

/// Reduce a `{"value": [...]}` listing to ids and names.
fn summarize_collection(body: &Value, key: &str) -> Value {
    let items: Vec<Value> = body
        .get("value")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| json!({ "id": item["id"], "name": item["name"] }))
                .collect()
        })
        .unwrap_or_default();
    json!({ "count": items.len(), key: items })
}

/// Decode the base64 `.tmdl` parts of a model definition. Parts that fail to
/// decode are reported alongside the ones that succeed.
fn decode_definition(body: &Value) -> Result<Value, String> {
    let parts = body
        .pointer("/definition/parts")
        .and_then(Value::as_array)
        .filter(|parts| !parts.is_empty())
        .ok_or_else(|| "No model definition found".to_string())?;

    let mut files = Vec::new();
    let mut errors = Vec::new();
    for part in parts {
        let path = part.get("path").and_then(Value::as_str).unwrap_or_default();
        if !path.ends_with(".tmdl") {
            continue;
        }
        let payload = part.get("payload").and_then(Value::as_str).unwrap_or_default();
        let decoded = STANDARD
            .decode(payload)
            .map_err(|e| e.to_string())
            .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()));
        match decoded {
            Ok(content) => files.push(json!({ "path": path, "content": content })),
            Err(message) => errors.push(json!({ "path": path, "message": message })),
        }
    }

    Ok(json!({ "files": files, "errors": errors }))
}

fn first_result_tables(body: &Value) -> Value {
    let tables = body
        .pointer("/results/0/tables")
        .cloned()
        .unwrap_or_else(|| json!([]));
    json!({ "tables": tables })
}

/// Power BI / Fabric REST Client
///
/// Thin async wrapper over the Power BI and Fabric REST APIs authenticated
/// with the OAuth2 client-credentials flow. The bearer token is cached and
/// refreshed once when an API call answers 401.

use reqwest::{Method, StatusCode, header};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::mcp::config::PowerBiCredentials;

pub const POWERBI_API: &str = "https://api.powerbi.com/v1.0/myorg";
pub const FABRIC_API: &str = "https://api.fabric.microsoft.com/v1";
const LOGIN_HOST: &str = "https://login.microsoftonline.com";
const SCOPE: &str = "https://analysis.windows.net/powerbi/api/.default";

/// Seconds between long-running operation polls when no Retry-After is sent.
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;
const MAX_POLLS: u32 = 5;
/// Error bodies are truncated to this many characters.
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum PowerBiError {
    #[error("missing Power BI credentials: set CLIENT_ID, CLIENT_SECRET and TENANT_ID")]
    MissingCredentials,

    #[error("token request failed: HTTP {status}: {body}")]
    Token { status: u16, body: String },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("long-running operation failed: {0}")]
    OperationFailed(String),

    #[error("long-running operation did not finish after {0} polls")]
    OperationTimedOut(u32),

    #[error("accepted operation returned no Location header")]
    MissingLocation,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

pub struct PowerBiClient {
    http: reqwest::Client,
    credentials: PowerBiCredentials,
    token: RwLock<Option<String>>,
}

impl PowerBiClient {
    pub fn new(credentials: PowerBiCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            token: RwLock::new(None),
        }
    }

    /// Request a fresh token and cache it.
    pub async fn refresh_token(&self) -> Result<String, PowerBiError> {
        let (Some(client_id), Some(client_secret), Some(tenant_id)) = (
            self.credentials.client_id.as_deref(),
            self.credentials.client_secret.as_deref(),
            self.credentials.tenant_id.as_deref(),
        ) else {
            return Err(PowerBiError::MissingCredentials);
        };

        let url = format!("{LOGIN_HOST}/{tenant_id}/oauth2/v2.0/token");
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", SCOPE),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = truncate(&response.text().await.unwrap_or_default());
            tracing::error!(status = status.as_u16(), "token request rejected");
            return Err(PowerBiError::Token {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        tracing::info!(expires_in = ?token.expires_in, "obtained Power BI access token");
        *self.token.write().await = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    async fn bearer(&self) -> Result<String, PowerBiError> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.refresh_token().await
    }

    /// Send an authenticated request, retrying once with a new token on 401.
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, PowerBiError> {
        let mut token = self.bearer().await?;
        let mut refreshed = false;
        loop {
            let mut request = self.http.request(method.clone(), url).bearer_auth(&token);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await?;
            if response.status() == StatusCode::UNAUTHORIZED && !refreshed {
                tracing::debug!(url, "token rejected, refreshing");
                token = self.refresh_token().await?;
                refreshed = true;
                continue;
            }
            return Ok(response);
        }
    }

    async fn json_or_error(response: reqwest::Response) -> Result<Value, PowerBiError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            Err(PowerBiError::Http {
                status: status.as_u16(),
                body: truncate(&response.text().await.unwrap_or_default()),
            })
        }
    }

    pub async fn get_json(&self, url: &str) -> Result<Value, PowerBiError> {
        let response = self.send(Method::GET, url, None).await?;
        Self::json_or_error(response).await
    }

    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value, PowerBiError> {
        let response = self.send(Method::POST, url, Some(body)).await?;
        Self::json_or_error(response).await
    }

    /// POST that may answer `202 Accepted` with a long-running operation.
    pub async fn post_long_running(&self, url: &str) -> Result<Value, PowerBiError> {
        let response = self.send(Method::POST, url, None).await?;
        if response.status() != StatusCode::ACCEPTED {
            return Self::json_or_error(response).await;
        }

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(PowerBiError::MissingLocation)?
            .to_string();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);

        self.wait_for_operation(&location, Duration::from_secs(retry_after))
            .await
    }

    async fn wait_for_operation(
        &self,
        location: &str,
        interval: Duration,
    ) -> Result<Value, PowerBiError> {
        for attempt in 1..=MAX_POLLS {
            tokio::time::sleep(interval).await;
            let status = self.get_json(location).await?;
            match operation_state(&status) {
                OperationState::Succeeded => {
                    return self.get_json(&format!("{location}/result")).await;
                }
                OperationState::Failed(reason) => {
                    return Err(PowerBiError::OperationFailed(reason));
                }
                OperationState::Running => {
                    tracing::debug!(attempt, location, "operation still running");
                }
            }
        }
        Err(PowerBiError::OperationTimedOut(MAX_POLLS))
    }
}

#[derive(Debug, PartialEq)]
enum OperationState {
    Succeeded,
    Failed(String),
    Running,
}

fn operation_state(status: &Value) -> OperationState {
    match status.get("status").and_then(Value::as_str) {
        Some("Succeeded") => OperationState::Succeeded,
        Some("Failed") => OperationState::Failed(match status.get("error") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "Operation failed".to_string(),
        }),
        _ => OperationState::Running,
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(ERROR_BODY_LIMIT).collect()
}

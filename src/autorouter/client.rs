//! Autorouting service clients.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::circuit::CircuitGraph;
use crate::error::AutorouterError;

/// Default autorouting endpoint host.
pub const DEFAULT_SERVER_URL: &str = "https://registry-api.tscircuit.com";

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Path of the solve endpoint relative to the server URL.
const SOLVE_PATH: &str = "/autorouting/solve";

/// An external engine that routes a circuit graph.
///
/// Implementations return the raw response payload; validation of its shape
/// is the caller's job.
#[async_trait]
pub trait AutorouterService: Send + Sync {
    async fn solve(
        &self,
        autorouter_id: &str,
        input: &CircuitGraph,
    ) -> Result<Value, AutorouterError>;
}

#[derive(Serialize)]
struct SolveRequest<'a> {
    input_circuit_json: &'a CircuitGraph,
    autorouter: &'a str,
}

/// Calls a remote autorouting service over HTTP.
pub struct HttpAutorouterClient {
    server_url: String,
    timeout: Duration,
    http_client: Client,
}

impl HttpAutorouterClient {
    /// Creates a client for `server_url`.
    ///
    /// Idle connections are not pooled, so each call opens and closes its
    /// own connection.
    pub fn new(server_url: impl Into<String>, timeout: Duration) -> Result<Self, AutorouterError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| AutorouterError::Service(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            timeout,
            http_client,
        })
    }

    pub fn with_defaults() -> Result<Self, AutorouterError> {
        Self::new(DEFAULT_SERVER_URL, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn solve_url(&self) -> String {
        format!("{}{}", self.server_url, SOLVE_PATH)
    }

    fn map_send_error(&self, e: reqwest::Error) -> AutorouterError {
        if e.is_timeout() {
            AutorouterError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            AutorouterError::Service(e.to_string())
        }
    }
}

/// Pulls the routed element array out of a response body.
///
/// Accepts a bare array, or an object carrying it under
/// `output_circuit_json` or `routed_circuit_json`. Anything else is passed
/// through unchanged for validation to reject.
pub fn extract_routed_payload(body: Value) -> Value {
    match body {
        Value::Object(mut map) => {
            for key in ["output_circuit_json", "routed_circuit_json"] {
                if let Some(inner) = map.remove(key) {
                    return inner;
                }
            }
            Value::Object(map)
        }
        other => other,
    }
}

#[async_trait]
impl AutorouterService for HttpAutorouterClient {
    async fn solve(
        &self,
        autorouter_id: &str,
        input: &CircuitGraph,
    ) -> Result<Value, AutorouterError> {
        let url = self.solve_url();
        debug!(url = %url, autorouter = autorouter_id, elements = input.len(), "Calling autorouting service");

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&SolveRequest {
                input_circuit_json: input,
                autorouter: autorouter_id,
            })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(AutorouterError::ServiceStatus {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await.map_err(|e| self.map_send_error(e))?;
        debug!(autorouter = autorouter_id, bytes = text.len(), "Autorouting service responded");

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => Ok(extract_routed_payload(body)),
            // Hand the raw text on so validation reports it as unparseable.
            Err(_) => Ok(Value::String(text)),
        }
    }
}

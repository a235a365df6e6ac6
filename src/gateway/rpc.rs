use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::{generate_password, ClientGateway, GatewayError, NewClient, RemoteId};
use crate::config::{ApiConfig, CustomFieldEncoding};
use crate::constants::{ACTION_ADD_CLIENT, ACTION_GET_CLIENTS, RESPONSE_TYPE_JSON, RESULT_ERROR};

/// Decoded JSON object returned by the RPC endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    body: Value,
}

impl RpcResponse {
    pub fn new(body: Value) -> Self {
        Self { body }
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn result(&self) -> Option<&str> {
        self.body.get("result").and_then(Value::as_str)
    }

    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }

    /// `clientid` as sent by the remote, number or string.
    pub fn client_id(&self) -> Option<RemoteId> {
        match self.body.get("clientid")? {
            Value::Number(n) => Some(RemoteId(n.to_string())),
            Value::String(s) if !s.trim().is_empty() => Some(RemoteId(s.trim().to_string())),
            _ => None,
        }
    }

    /// True when the lookup returned any client. The remote search is a
    /// substring match, so the one entry returned under `limitnum=1` is not
    /// necessarily the exact address; any hit counts as existing.
    pub fn has_clients(&self) -> bool {
        let listed = match self.body.pointer("/clients/client") {
            Some(Value::Array(clients)) => !clients.is_empty(),
            Some(Value::Object(client)) => !client.is_empty(),
            _ => false,
        };
        let counted = self
            .body
            .get("totalresults")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
            .is_some_and(|n| n > 0);
        listed || counted
    }
}

#[derive(Debug, Default)]
struct Diagnostics {
    last_error: Option<GatewayError>,
    last_response: Option<String>,
}

/// HTTP implementation of [`ClientGateway`].
pub struct RpcGateway {
    http: reqwest::Client,
    config: ApiConfig,
    diagnostics: Mutex<Diagnostics>,
}

impl RpcGateway {
    pub fn new(config: ApiConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { http, config, diagnostics: Mutex::new(Diagnostics::default()) })
    }

    /// Error of the most recent call, `None` if it succeeded.
    pub fn last_error(&self) -> Option<GatewayError> {
        self.lock_diagnostics().last_error.clone()
    }

    /// Raw body of the most recent response that reached us.
    pub fn last_response(&self) -> Option<String> {
        self.lock_diagnostics().last_response.clone()
    }

    /// Issues one RPC action with credentials and response format injected.
    /// Transport failures of read-only actions are retried per the configured
    /// policy; everything else is attempted once.
    #[instrument(skip(self, params))]
    pub async fn call(&self, action: &str, params: &[(String, String)]) -> Result<RpcResponse, GatewayError> {
        {
            let mut diag = self.lock_diagnostics();
            diag.last_error = None;
            diag.last_response = None;
        }

        let attempts = if is_read_only(action) { 1 + self.config.retry.max_retries } else { 1 };
        let mut attempt = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            let result = self.call_once(action, params).await;
            histogram!("importer_gateway_call_duration_seconds", "action" => action.to_string())
                .record(started.elapsed().as_secs_f64());

            match result {
                Err(GatewayError::Transport(ref reason)) if attempt < attempts => {
                    let delay = self.config.retry.backoff(attempt);
                    warn!("{} attempt {} failed ({}); retrying in {:?}", action, attempt, reason, delay);
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => {
                    counter!("importer_gateway_calls_total", "action" => action.to_string(), "result" => "ok")
                        .increment(1);
                    return Ok(response);
                }
                Err(e) => {
                    counter!("importer_gateway_calls_total", "action" => action.to_string(), "result" => "error")
                        .increment(1);
                    debug!("{} failed: {}", action, e);
                    self.lock_diagnostics().last_error = Some(e.clone());
                    return Err(e);
                }
            }
        }
    }

    /// Checks the endpoint with a minimal lookup.
    pub async fn test_connection(&self) -> Result<(), GatewayError> {
        self.call(ACTION_GET_CLIENTS, &[("limitnum".to_string(), "1".to_string())])
            .await
            .map(|_| ())
    }

    async fn call_once(&self, action: &str, params: &[(String, String)]) -> Result<RpcResponse, GatewayError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("identifier", self.config.identifier.as_str()),
            ("secret", self.config.secret.as_str()),
            ("action", action),
            ("responsetype", RESPONSE_TYPE_JSON),
        ];
        form.extend(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let response = self
            .http
            .post(&self.config.url)
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
        self.lock_diagnostics().last_response = Some(body.clone());

        let parsed = match serde_json::from_str::<Value>(&body) {
            Ok(value) if value.is_object() => value,
            Ok(_) if status.is_success() => {
                return Err(GatewayError::Decode { message: "response is not a JSON object".into(), body })
            }
            Err(e) if status.is_success() => {
                return Err(GatewayError::Decode { message: e.to_string(), body })
            }
            _ => return Err(GatewayError::Transport(format!("HTTP status {}", status))),
        };

        let response = RpcResponse::new(parsed);
        if response.result() == Some(RESULT_ERROR) {
            let message = response.message().unwrap_or("unknown remote error").to_string();
            return Err(GatewayError::Remote(message));
        }
        if !status.is_success() {
            return Err(GatewayError::Transport(format!("HTTP status {}", status)));
        }
        Ok(response)
    }

    fn add_client_params(&self, client: &NewClient) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = client
            .remote_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let password = client
            .password
            .clone()
            .unwrap_or_else(|| generate_password(self.config.password_length));
        params.push(("password2".to_string(), password));

        if let Some(document) = &client.document {
            let slot = self.config.custom_field_slot;
            let key = match self.config.custom_field_encoding {
                CustomFieldEncoding::Flat => format!("customfield{}", slot),
                CustomFieldEncoding::Indexed => format!("customfield[{}]", slot),
            };
            params.push((key, document.digits().to_string()));
        }

        if self.config.skip_remote_validation {
            params.push(("skipvalidation".to_string(), "true".to_string()));
        }
        params
    }

    fn lock_diagnostics(&self) -> std::sync::MutexGuard<'_, Diagnostics> {
        self.diagnostics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn is_read_only(action: &str) -> bool {
    action == ACTION_GET_CLIENTS
}

#[async_trait]
impl ClientGateway for RpcGateway {
    async fn client_exists(&self, email: &str) -> Result<bool, GatewayError> {
        let params = [
            ("search".to_string(), email.to_string()),
            ("limitnum".to_string(), "1".to_string()),
        ];
        let response = self.call(ACTION_GET_CLIENTS, &params).await?;
        Ok(response.has_clients())
    }

    async fn create_client(&self, client: &NewClient) -> Result<RemoteId, GatewayError> {
        let params = self.add_client_params(client);
        let response = self.call(ACTION_ADD_CLIENT, &params).await?;
        response.client_id().ok_or_else(|| {
            let err = GatewayError::Decode {
                message: "response carries no clientid".into(),
                body: response.body().to_string(),
            };
            self.lock_diagnostics().last_error = Some(err.clone());
            err
        })
    }
}

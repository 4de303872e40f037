//! Recognition over HTTP — invokes the hosted backend's OCR edge function.
//!
//! Request: `POST {backend_url}/functions/v1/{function}` with JSON
//! `{ "base64Image": ... }`, `Authorization: Bearer <key>` and `apikey: <key>`.
//! Response: `{ "text": ... }` on 2xx; an `error`/`message` field otherwise.

use super::{BackendFailure, RecognitionBackend, RecognitionRequest};
use crate::settings::{Settings, SettingsError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Longest plain-text error body passed through as an upstream message.
const MAX_PLAIN_ERROR_LEN: usize = 300;

pub struct EdgeFunctionBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl EdgeFunctionBackend {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    /// Build from resolved settings. Fails if no backend URL is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let endpoint = settings.function_endpoint()?;
        Self::new(endpoint, settings.api_key.clone(), settings.timeout)
            .map_err(|e| SettingsError::HttpClient(e.to_string()))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RecognitionBackend for EdgeFunctionBackend {
    async fn invoke(&self, request: &RecognitionRequest) -> Result<Value, BackendFailure> {
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key).header("apikey", key);
        }

        let resp = req.send().await.map_err(|e| {
            log::error!("[OCR] HTTP request failed: {}", e);
            let message = if e.is_timeout() {
                "Recognition service timed out".to_string()
            } else {
                format!("Failed to reach recognition service: {}", e)
            };
            BackendFailure::new(Some(message), None)
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            log::error!("[OCR] Failed to read response body: {}", e);
            BackendFailure::new(None, Some(status.as_u16()))
        })?;

        if !status.is_success() {
            log::error!("[OCR] Edge function returned {}: {}", status, body);
            return Err(BackendFailure::new(
                upstream_message(&body),
                Some(status.as_u16()),
            ));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or_else(|e| {
            log::warn!("[OCR] Response is not JSON: {}", e);
            Value::Null
        }))
    }
}

/// Dig a human-readable message out of an error body.
///
/// Understands `{"error": "..."}`, `{"error": {"message": "..."}}`,
/// `{"message": "..."}` and `{"msg": "..."}`; short plain-text bodies are
/// passed through as-is.
fn upstream_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => {
            let error = json.get("error");
            error
                .and_then(Value::as_str)
                .or_else(|| error.and_then(|e| e.get("message")).and_then(Value::as_str))
                .or_else(|| json.get("message").and_then(Value::as_str))
                .or_else(|| json.get("msg").and_then(Value::as_str))
                .filter(|m| !m.trim().is_empty())
                .map(str::to_string)
        }
        Err(_) if trimmed.len() <= MAX_PLAIN_ERROR_LEN && !trimmed.starts_with('<') => {
            Some(trimmed.to_string())
        }
        Err(_) => None,
    }
}

//! REST implementation of [`OfficeHoursApi`] over `reqwest`.
//!
//! Every response is wrapped in the backend envelope
//! `{ "success": bool, "data": T, "message": string, "code": string }`.
//! A fresh bearer token is resolved for every request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use campus_core::config::ApiConfig;
use campus_core::traits::TokenSupplier;
use campus_core::types::SlotId;
use campus_core::{AppError, AppResult, ErrorKind};

use crate::api::OfficeHoursApi;
use crate::entry::{ProviderView, QueueEntry};

/// Response envelope used by every endpoint.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    message: Option<String>,
    code: Option<String>,
}

/// Office-hours REST client.
#[derive(Debug, Clone)]
pub struct RestOfficeHoursApi {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenSupplier>,
}

impl RestOfficeHoursApi {
    /// Build a client for the configured API.
    pub fn new(config: &ApiConfig, tokens: Arc<dyn TokenSupplier>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .build()
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Configuration,
                    format!("Failed to build HTTP client: {e}"),
                    e,
                )
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> AppResult<Option<T>> {
        let url = self.url(path);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(token) = self.tokens.bearer_token().await? {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        debug!(method = %method, path = %path, status = status.as_u16(), "API response");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::authentication(format!(
                "{method} {path} was refused: {status}"
            )));
        }

        let envelope = match serde_json::from_slice::<ApiEnvelope<T>>(&bytes) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                return Err(AppError::with_source(
                    ErrorKind::Serialization,
                    format!("Malformed response from {method} {path}: {e}"),
                    e,
                ));
            }
            Err(_) => return Err(status_error(status, &method, path)),
        };

        if !status.is_success() || !envelope.success {
            let message = envelope
                .message
                .unwrap_or_else(|| format!("{method} {path} failed: {status}"));
            let error = match envelope.code.as_deref() {
                Some(code) => AppError::from_code(code, message),
                None => AppError::new(kind_for_status(status), message),
            };
            warn!(path = %path, code = %error.kind, "API rejected request");
            return Err(error);
        }

        Ok(envelope.data)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> AppError {
    let kind = if e.is_timeout() {
        ErrorKind::Timeout
    } else {
        ErrorKind::Transport
    };
    AppError::with_source(kind, format!("HTTP request failed: {e}"), e)
}

fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::CONFLICT => ErrorKind::InvalidState,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Timeout,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => ErrorKind::Transport,
        _ => ErrorKind::Api,
    }
}

fn status_error(status: StatusCode, method: &Method, path: &str) -> AppError {
    AppError::new(
        kind_for_status(status),
        format!("{method} {path} failed: {status}"),
    )
}

#[async_trait]
impl OfficeHoursApi for RestOfficeHoursApi {
    async fn join(&self, slot: SlotId, metadata: &Value) -> AppResult<Option<QueueEntry>> {
        self.request(
            Method::POST,
            &format!("/office-hours/slots/{slot}/queue"),
            Some(json!({ "metadata": metadata })),
        )
        .await
    }

    async fn status(&self, slot: SlotId) -> AppResult<Option<QueueEntry>> {
        self.request(
            Method::GET,
            &format!("/office-hours/slots/{slot}/queue/me"),
            None,
        )
        .await
    }

    async fn check_in(&self, slot: SlotId, token: &str) -> AppResult<Option<QueueEntry>> {
        self.request(
            Method::POST,
            &format!("/office-hours/slots/{slot}/check-in"),
            Some(json!({ "token": token })),
        )
        .await
    }

    async fn provider_view(&self, slot: SlotId) -> AppResult<ProviderView> {
        let view: Option<ProviderView> = self
            .request(Method::GET, &format!("/office-hours/slots/{slot}/queue"), None)
            .await?;
        Ok(view.unwrap_or_default())
    }

    async fn call_next(&self, slot: SlotId) -> AppResult<()> {
        self.request::<Value>(
            Method::POST,
            &format!("/office-hours/slots/{slot}/call-next"),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn complete_current(&self, slot: SlotId) -> AppResult<()> {
        self.request::<Value>(
            Method::POST,
            &format!("/office-hours/slots/{slot}/complete"),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn mark_no_show(&self, slot: SlotId) -> AppResult<()> {
        self.request::<Value>(
            Method::POST,
            &format!("/office-hours/slots/{slot}/no-show"),
            None,
        )
        .await
        .map(|_| ())
    }
}

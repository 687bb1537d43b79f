use crate::config::ApiConfig;
use crate::core::classifier::classify;
use crate::domain::model::{Failure, OutboundRequest, Outcome, Receipt};
use crate::domain::ports::PaymentGateway;
use crate::utils::error::Result;
use crate::utils::mask_secret;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.1win.win/v1/client";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the cash desk API. One attempt per call, bounded by a
/// total timeout, no retries.
#[derive(Clone)]
pub struct PaymentClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for PaymentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentClient")
            .field("base_url", &self.base_url)
            .field("api_key", &mask_secret(&self.api_key))
            .finish()
    }
}

impl PaymentClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, api_key, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Self::with_timeout(
            config.base_url.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_seconds),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, request: &OutboundRequest) -> Outcome {
        let url = format!(
            "{}/{}",
            self.base_url,
            request.operation.kind().endpoint()
        );
        let api_key = request.credential.as_deref().unwrap_or(&self.api_key);

        tracing::debug!(
            "📡 POST {} (key {}) body: {}",
            url,
            mask_secret(api_key),
            request.operation.body()
        );

        let response = match self
            .client
            .post(&url)
            .header("X-API-KEY", api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(&request.operation.body())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Outcome::Failure(transport_failure(&url, e)),
        };

        let status = response.status().as_u16();
        tracing::info!("API request: POST {} - Status: {}", url, status);

        match response.text().await {
            Ok(body) => interpret(status, &body),
            Err(e) => Outcome::Failure(transport_failure(&url, e)),
        }
    }
}

#[async_trait]
impl PaymentGateway for PaymentClient {
    async fn call(&self, request: &OutboundRequest) -> Outcome {
        self.send(request).await
    }
}

/// Turns a status and raw body into an outcome. Bodies that are not JSON
/// are kept verbatim for diagnostics.
pub fn interpret(status: u16, body: &str) -> Outcome {
    let payload: Value = match serde_json::from_str(body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(
                "Failed to parse JSON response (status {}): {} ({})",
                status,
                body,
                e
            );
            return Outcome::Failure(Failure::Unparseable {
                status,
                body: body.to_string(),
            });
        }
    };

    if matches!(status, 200 | 201) {
        return match serde_json::from_value::<Receipt>(payload) {
            Ok(receipt) => Outcome::Success(receipt),
            Err(e) => {
                tracing::error!("Success response is not a receipt object: {}", e);
                Outcome::Failure(Failure::Unparseable {
                    status,
                    body: body.to_string(),
                })
            }
        };
    }

    let error_code = text_field(&payload, "errorCode");
    let error_message = text_field(&payload, "errorMessage");
    let classification = classify(status, &error_code, &error_message);
    tracing::warn!(
        "❌ API rejected request: status {}, code '{}', message '{}' -> {:?}",
        status,
        error_code,
        error_message,
        classification.category
    );

    Outcome::Failure(Failure::Classified {
        status,
        classification,
    })
}

fn text_field(payload: &Value, key: &str) -> String {
    match payload.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn transport_failure(url: &str, err: reqwest::Error) -> Failure {
    if err.is_timeout() {
        tracing::error!("Request to {} timed out", url);
        Failure::Timeout
    } else if err.is_connect() || err.is_request() || err.is_body() {
        tracing::error!("HTTP request to {} failed: {}", url, err);
        Failure::Network {
            detail: err.to_string(),
        }
    } else {
        tracing::error!("Unexpected error calling {}: {}", url, err);
        Failure::Unexpected {
            detail: err.to_string(),
        }
    }
}

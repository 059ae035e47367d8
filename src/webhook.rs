use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::models::UrlPayload;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("webhook request failed: {0}")]
    Request(String),
    #[error("webhook response was not JSON: {0}")]
    Decode(String),
}

/// Client for the automation endpoint that scrapes a product page.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl WebhookClient {
    /// `timeout` replaces the client-wide request timeout for webhook calls.
    pub fn new(http: reqwest::Client, endpoint: Url, timeout: Duration) -> Self {
        Self {
            http,
            endpoint,
            timeout,
        }
    }

    /// POST `{"url": product}` and return the decoded body as-is.
    pub async fn fetch_product(&self, product: &Url) -> Result<Value, WebhookError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(&UrlPayload {
                url: product.as_str(),
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WebhookError::Request(format!("TimeoutError: {}", e))
                } else if e.is_connect() {
                    WebhookError::Request(format!("ConnectError: {}", e))
                } else {
                    WebhookError::Request(format!("RequestError: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::Status(status));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| WebhookError::Decode(e.to_string()))
    }
}

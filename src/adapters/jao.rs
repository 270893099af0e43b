use crate::config::AdapterConfig;
use crate::domain::model::{CorridorId, FetchWindow, IngestedBatch};
use crate::domain::ports::{CorridorCatalog, FetchClient};
use crate::utils::error::{IngressError, Result};
use async_trait::async_trait;
use chrono::Duration;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration as StdDuration;
use url::Url;

const API_KEY_HEADER: &str = "AUTH_API_KEY";

/// JAO auction API client.
pub struct JaoClient {
    client: Client,
    base_url: Url,
    api_key: String,
    horizon: String,
    empty_is_complete: bool,
}

impl JaoClient {
    pub fn new(
        server_url: &str,
        api_key: &str,
        horizon: &str,
        timeout: StdDuration,
        empty_is_complete: bool,
    ) -> Result<Self> {
        // Url::join 會取代最後一段路徑，確保結尾有斜線
        let normalized = if server_url.ends_with('/') {
            server_url.to_string()
        } else {
            format!("{}/", server_url)
        };
        let base_url = Url::parse(&normalized).map_err(|e| IngressError::InvalidConfigValueError {
            field: "JAO Server.server_url".to_string(),
            value: server_url.to_string(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngressError::config(format!("cannot build JAO client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            horizon: horizon.to_string(),
            empty_is_complete,
        })
    }

    pub fn from_config(config: &AdapterConfig) -> Result<Self> {
        Self::new(
            &config.jao_server.server_url,
            &config.jao_server.auth_api_key,
            config.horizon(),
            config.jao_timeout(),
            config.empty_response_is_authoritative(),
        )
    }

    async fn get_json(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|e| IngressError::config(format!("invalid JAO endpoint: {}", e)))?;

        tracing::debug!("Making JAO request to {} {:?}", url, query);

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| classify_request_error(endpoint, e))?;

        let status = response.status();
        tracing::debug!("JAO response status: {}", status);

        // 5xx 與 429 視為暫時性錯誤，下次執行再試
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(IngressError::network(format!(
                "{} answered {}",
                endpoint, status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngressError::api(Some(status.as_u16()), body));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_request_error(endpoint, e))?;
        serde_json::from_slice(&body).map_err(|e| {
            IngressError::api(None, format!("malformed {} response: {}", endpoint, e))
        })
    }
}

fn classify_request_error(endpoint: &str, error: reqwest::Error) -> IngressError {
    if error.is_timeout() {
        IngressError::network(format!("{} timed out: {}", endpoint, error))
    } else {
        IngressError::network(format!("{} request failed: {}", endpoint, error))
    }
}

/// JAO answers errors with an object like `{"status": 400, "message": "..."}`.
fn api_error_from_object(object: &serde_json::Map<String, Value>) -> IngressError {
    let status = object
        .get("status")
        .and_then(|s| s.as_u64().or_else(|| s.as_str().and_then(|s| s.parse().ok())))
        .and_then(|s| u16::try_from(s).ok());
    let message = object
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| Value::Object(object.clone()).to_string());
    IngressError::api(status, message)
}

#[async_trait]
impl FetchClient for JaoClient {
    async fn fetch(&self, window: &FetchWindow) -> Result<IngestedBatch> {
        // todate 為包含端點，window 為半開區間
        let last_day = window.end - Duration::seconds(1);
        let query = [
            ("corridor", window.corridor.to_string()),
            ("fromdate", window.start.format("%Y-%m-%d").to_string()),
            ("todate", last_day.format("%Y-%m-%d").to_string()),
            ("horizon", self.horizon.clone()),
        ];

        match self.get_json("getauctions", &query).await? {
            Value::Array(records) => Ok(IngestedBatch::new(records, self.empty_is_complete)),
            Value::Object(object) => Err(api_error_from_object(&object)),
            other => Err(IngressError::api(
                None,
                format!("unexpected getauctions response: {}", other),
            )),
        }
    }
}

#[async_trait]
impl CorridorCatalog for JaoClient {
    async fn list_corridors(&self) -> Result<Vec<CorridorId>> {
        let items = match self.get_json("getcorridors", &[]).await? {
            Value::Array(items) => items,
            Value::Object(object) => return Err(api_error_from_object(&object)),
            other => {
                return Err(IngressError::api(
                    None,
                    format!("unexpected getcorridors response: {}", other),
                ))
            }
        };

        let mut corridors = Vec::with_capacity(items.len());
        for item in items {
            match item.get("value").and_then(Value::as_str) {
                Some(value) => match CorridorId::parse(value) {
                    Ok(id) => corridors.push(id),
                    Err(e) => tracing::warn!("Skipping corridor from JAO: {}", e),
                },
                None => tracing::warn!("Skipping corridor entry without value: {}", item),
            }
        }
        Ok(corridors)
    }
}

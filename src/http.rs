use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ResolvedConfig;
use crate::domain::{DatasetPatch, DatasetRecord};
use crate::error::DatasetError;
use crate::source::DatasetSource;

const LIST_FAILED: &str = "failed to fetch dataset list";

#[derive(Debug, Deserialize)]
struct DatasetPage {
    #[serde(default)]
    datasets: Vec<DatasetRecord>,
}

/// Dataset service client speaking the `/api/datasets` JSON API.
#[derive(Clone)]
pub struct HttpDatasetSource {
    client: Client,
    base_url: String,
    page_size: usize,
}

impl HttpDatasetSource {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        page_size: usize,
    ) -> Result<Self, DatasetError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("chatbi-ds/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DatasetError::SourceHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| DatasetError::SourceHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: page_size.max(1),
        })
    }

    pub fn from_config(config: &ResolvedConfig) -> Result<Self, DatasetError> {
        Self::new(&config.base_url, config.request_timeout, config.page_size)
    }

    pub fn list_url(&self) -> String {
        format!("{}/api/datasets", self.base_url)
    }

    pub fn status_url(&self, id: &str) -> String {
        format!("{}/api/dataset/{}/status", self.base_url, id)
    }

    async fn handle_status(response: Response, fallback: &str) -> Result<Response, DatasetError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(DatasetError::SourceStatus {
            status,
            message: error_message(&body, fallback),
        })
    }

    async fn send_with_retries<F>(&self, make_req: F) -> Result<Response, DatasetError>
    where
        F: Fn() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let delay = Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1));
            match make_req().send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        debug!(status, attempt, "retrying dataset request");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        debug!(error = %err, attempt, "retrying dataset request");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(DatasetError::SourceHttp(err.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl DatasetSource for HttpDatasetSource {
    async fn retrieve_collection(&self) -> Result<Vec<DatasetRecord>, DatasetError> {
        let url = self.list_url();
        let limit = self.page_size.to_string();
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = 0usize;
        loop {
            let skip = offset.to_string();
            let response = self
                .send_with_retries(|| {
                    self.client
                        .get(&url)
                        .query(&[("skip", skip.as_str()), ("limit", limit.as_str())])
                })
                .await?;
            let response = Self::handle_status(response, LIST_FAILED).await?;
            let page: DatasetPage = response
                .json()
                .await
                .map_err(|err| DatasetError::SourceDecode(err.to_string()))?;

            let received = page.datasets.len();
            let before = records.len();
            for record in page.datasets {
                if seen.insert(record.id.clone()) {
                    records.push(record);
                }
            }
            debug!(received, total = records.len(), "dataset page received");
            if received < self.page_size {
                return Ok(records);
            }
            if records.len() == before {
                warn!(offset, "dataset page repeated known ids, stopping pagination");
                return Ok(records);
            }
            offset += received;
        }
    }

    async fn retrieve_status(&self, id: &str) -> Result<DatasetPatch, DatasetError> {
        let url = self.status_url(id);
        let response = self.send_with_retries(|| self.client.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(DatasetError::DatasetNotFound(id.to_string()));
        }
        let response = Self::handle_status(response, "failed to fetch dataset status").await?;
        response
            .json()
            .await
            .map_err(|err| DatasetError::SourceDecode(err.to_string()))
    }
}

/// Prefers the JSON body's `message`, then a string `detail`, then the raw
/// body, then `fallback`.
pub fn error_message(body: &str, fallback: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        ["message", "detail"].iter().find_map(|key| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        })
    });
    match from_json {
        Some(message) => message,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => fallback.to_string(),
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_message_then_detail() {
        assert_eq!(
            error_message(r#"{"message":"db down","detail":"x"}"#, LIST_FAILED),
            "db down"
        );
        assert_eq!(error_message(r#"{"detail":"查询失败"}"#, LIST_FAILED), "查询失败");
        assert_eq!(error_message("Bad Gateway", LIST_FAILED), "Bad Gateway");
        assert_eq!(error_message("  ", LIST_FAILED), LIST_FAILED);
    }

    #[test]
    fn urls_ignore_trailing_slash() {
        let source =
            HttpDatasetSource::new("http://localhost:8000/", Duration::from_secs(5), 20).unwrap();
        assert_eq!(source.list_url(), "http://localhost:8000/api/datasets");
        assert_eq!(
            source.status_url("d1"),
            "http://localhost:8000/api/dataset/d1/status"
        );
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! REST transport over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::traits::{
    bulk_body, BulkOperation, BulkResponse, ClusterHealth, CreateIndexOutcome, HealthStatus,
    SearchRequest, SearchResponse, SearchTransport, TransportError,
};

/// Talks to the engine's REST API. Every request carries the configured timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, format!("{}/{}", self.base_url, path))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        request.send().await.map_err(|e| self.map_error(e))
    }

    fn map_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Connection(e.to_string())
        }
    }

    async fn json_body(&self, response: Response) -> Result<Value, TransportError> {
        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// Non-2xx responses become [`TransportError::Status`].
    async fn expect_success(&self, response: Response) -> Result<Value, TransportError> {
        let status = response.status();
        if status.is_success() {
            return self.json_body(response).await;
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SearchTransport for HttpTransport {
    async fn bulk(&self, ops: &[BulkOperation]) -> Result<BulkResponse, TransportError> {
        let body = bulk_body(ops);
        debug!(operations = ops.len(), bytes = body.len(), "POST _bulk");
        let response = self
            .send(
                self.request(Method::POST, "_bulk")
                    .header("Content-Type", "application/x-ndjson")
                    .body(body),
            )
            .await?;
        let body = self.expect_success(response).await?;
        BulkResponse::from_json(&body)
    }

    async fn refresh(&self, indices: &[String]) -> Result<(), TransportError> {
        let path = format!("{}/_refresh", indices.join(","));
        let response = self.send(self.request(Method::POST, &path)).await?;
        self.expect_success(response).await.map(|_| ())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, TransportError> {
        let response = self.send(self.request(Method::HEAD, index)).await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(TransportError::Status {
                status: s.as_u16(),
                body: String::new(),
            }),
        }
    }

    async fn create_index(
        &self,
        index: &str,
        mapping: &Value,
    ) -> Result<CreateIndexOutcome, TransportError> {
        let response = self
            .send(self.request(Method::PUT, index).json(&json!({ "mappings": mapping })))
            .await?;

        match self.expect_success(response).await {
            Ok(body) => Ok(CreateIndexOutcome::Created {
                acknowledged: body.get("acknowledged").and_then(Value::as_bool).unwrap_or(false),
            }),
            Err(TransportError::Status { status: 400, body })
                if body.contains("resource_already_exists_exception") =>
            {
                debug!(index, "Index created concurrently");
                Ok(CreateIndexOutcome::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_index(&self, index: &str) -> Result<(), TransportError> {
        let response = self.send(self.request(Method::DELETE, index)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound(index.to_string()));
        }
        self.expect_success(response).await.map(|_| ())
    }

    async fn cluster_health(
        &self,
        index: &str,
        wait_for: HealthStatus,
        timeout: Duration,
    ) -> Result<ClusterHealth, TransportError> {
        let path = format!(
            "_cluster/health/{}?wait_for_status={}&timeout={}ms",
            index,
            wait_for.as_str(),
            timeout.as_millis()
        );
        // The engine's own wait must end before the client gives up.
        let response = self
            .send(self.request(Method::GET, &path).timeout(timeout + self.timeout))
            .await?;

        // 408 still carries a health body with `timed_out: true`.
        let body = if response.status() == StatusCode::REQUEST_TIMEOUT {
            self.json_body(response).await?
        } else {
            self.expect_success(response).await?
        };

        let status = body
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::Decode("health response without status".into()))?;
        let health = ClusterHealth {
            status: HealthStatus::parse(status)?,
            timed_out: body.get("timed_out").and_then(Value::as_bool).unwrap_or(false),
        };
        if health.timed_out {
            warn!(index, status, "Cluster health wait timed out");
        }
        Ok(health)
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, TransportError> {
        let path = format!("{}/_search", request.index);
        let response = self
            .send(self.request(Method::POST, &path).json(&request.to_body()))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound(request.index.clone()));
        }
        let body = self.expect_success(response).await?;
        SearchResponse::from_json(&body)
    }
}

//! HTTP Retriever
//!
//! Posts `{domain, query, threshold, topk}` to the retrieval service and
//! reads the passages from the `result` field of the reply.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use super::{RetrievalReference, Retriever, SearchParams};
use crate::error::{env_parse, env_var, Result, ToolkitError};

/// Retrieval service configuration
#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    /// Service root, e.g. `http://127.0.0.1:8002`
    pub endpoint: String,

    /// Search path appended to `endpoint`
    pub api: String,

    pub params: SearchParams,

    /// Requests in flight at once
    pub max_concurrency: usize,

    pub timeout_secs: u64,
}

impl RetrievalConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api: "/v1/retrieve".into(),
            params: SearchParams::default(),
            max_concurrency: 8,
            timeout_secs: 300,
        }
    }

    /// Load from `RETRIEVAL_*` variables. `RETRIEVAL_ENDPOINT` is required.
    pub fn from_env() -> Result<Self> {
        let endpoint = env_var("RETRIEVAL_ENDPOINT")
            .ok_or_else(|| ToolkitError::Config("RETRIEVAL_ENDPOINT is not set".into()))?;
        let defaults = Self::new(endpoint);
        Ok(Self {
            api: env_var("RETRIEVAL_API").unwrap_or(defaults.api),
            params: SearchParams {
                threshold: env_parse("RETRIEVAL_THRESHOLD", defaults.params.threshold),
                topk: env_parse("RETRIEVAL_TOPK", defaults.params.topk),
            },
            max_concurrency: env_parse("RETRIEVAL_MAX_CONCURRENCY", defaults.max_concurrency)
                .max(1),
            timeout_secs: env_parse("RETRIEVAL_TIMEOUT_SECS", defaults.timeout_secs),
            endpoint: defaults.endpoint,
        })
    }

    /// Full search URL
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.api.trim_start_matches('/')
        )
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    domain: &'a str,
    query: &'a str,
    threshold: f32,
    topk: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<RetrievalReference>,
}

/// Retriever backed by the retrieval HTTP service
pub struct HttpRetriever {
    client: reqwest::Client,
    config: RetrievalConfig,
    permits: Arc<Semaphore>,
}

impl HttpRetriever {
    pub fn new(config: RetrievalConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            config,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(RetrievalConfig::from_env()?)
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn search(
        &self,
        query: &str,
        domain: &str,
        params: &SearchParams,
    ) -> Result<Vec<RetrievalReference>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ToolkitError::Retrieval(e.to_string()))?;

        let response = self
            .client
            .post(self.config.url())
            .json(&SearchRequest {
                domain,
                query,
                threshold: params.threshold,
                topk: params.topk,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %domain, "retrieval request rejected");
            return Err(ToolkitError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: SearchResponse = response.json().await?;
        Ok(body.result)
    }

    fn name(&self) -> &str {
        "HttpRetriever"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    async fn serve_once(status: &str, body: &str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().to_string())
                        })
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
            }
            let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        (format!("http://{addr}"), rx)
    }

    fn retriever(endpoint: String) -> HttpRetriever {
        HttpRetriever::new(RetrievalConfig {
            timeout_secs: 5,
            ..RetrievalConfig::new(endpoint)
        })
        .unwrap()
    }

    #[test]
    fn test_url_joins_endpoint_and_api() {
        let mut config = RetrievalConfig::new("http://host:8002/");
        assert_eq!(config.url(), "http://host:8002/v1/retrieve");
        config.api = "api/v1/query/search".into();
        assert_eq!(config.url(), "http://host:8002/api/v1/query/search");
    }

    #[tokio::test]
    async fn test_search_posts_query() {
        let body = r#"{"result":[{"text":"t","file_name":"a.pdf","sort_index":2}]}"#;
        let (endpoint, request) = serve_once("200 OK", body).await;

        let hits = retriever(endpoint)
            .search("brain age", "papers", &SearchParams::default())
            .await
            .unwrap();
        assert_eq!(hits, [RetrievalReference::new("a.pdf", "t", 2)]);

        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /v1/retrieve"));
        assert!(raw.contains(r#""domain":"papers""#));
        assert!(raw.contains(r#""query":"brain age""#));
        assert!(raw.contains(r#""topk":10"#));
    }

    #[tokio::test]
    async fn test_bad_status_is_an_error() {
        let (endpoint, _request) = serve_once("503 Service Unavailable", "{}").await;
        let err = retriever(endpoint)
            .search("q", "papers", &SearchParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolkitError::Status { status: 503, .. }));
    }
}

//! Web Search Tool
//!
//! `Search Engine` queries Google through SerpApi and returns the organic
//! results as a numbered list, one `"{n}. {title} - {snippet}"` per line.

use std::time::Duration;

use agent_core::{ParameterSchema, Result as CoreResult, Tool, ToolArgs, ToolSchema};
use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{env_parse, env_var, Result, ToolkitError};

/// Name the model uses in `Action:` lines
pub const SEARCH_TOOL_NAME: &str = "Search Engine";

const SEARCH_DESCRIPTION: &str =
    "The Google search engine, you can use it to search information on the Internet if needed.";

const QUERY_DESCRIPTION: &str = "keywords in original question for google search, you may need optimize them for Google search to satisfy your demand. Search for general information and no add \"site\" parameter";

/// SerpApi configuration
#[derive(Clone, Debug)]
pub struct SerpApiConfig {
    pub endpoint: String,
    pub token: String,
    pub location: String,
    pub gl: String,
    pub hl: String,
    pub timeout_secs: u64,
}

impl SerpApiConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            endpoint: "https://serpapi.com/search.json".into(),
            token: token.into(),
            location: "United States".into(),
            gl: "us".into(),
            hl: "en".into(),
            timeout_secs: 30,
        }
    }

    /// Load from `SERPAPI_*` variables. `SERPAPI_TOKEN` is required.
    pub fn from_env() -> Result<Self> {
        let token = env_var("SERPAPI_TOKEN")
            .ok_or_else(|| ToolkitError::Config("SERPAPI_TOKEN is not set".into()))?;
        let defaults = Self::new(token);
        Ok(Self {
            endpoint: env_var("SERPAPI_ENDPOINT").unwrap_or(defaults.endpoint),
            location: env_var("SERPAPI_LOCATION").unwrap_or(defaults.location),
            gl: env_var("SERPAPI_GL").unwrap_or(defaults.gl),
            hl: env_var("SERPAPI_HL").unwrap_or(defaults.hl),
            timeout_secs: env_parse("SERPAPI_TIMEOUT_SECS", defaults.timeout_secs),
            token: defaults.token,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

/// Google search through SerpApi
pub struct SerpApiSearch {
    client: reqwest::Client,
    config: SerpApiConfig,
}

impl SerpApiSearch {
    pub fn new(config: SerpApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(SerpApiConfig::from_env()?)
    }

    /// Run one query and format the organic results
    pub async fn search(&self, query: &str) -> Result<String> {
        tracing::debug!(%query, "serpapi search");
        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("api_key", self.config.token.as_str()),
                ("location", self.config.location.as_str()),
                ("gl", self.config.gl.as_str()),
                ("hl", self.config.hl.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolkitError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: SearchResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(ToolkitError::Search(error));
        }
        Ok(format_results(&body.organic_results))
    }
}

fn format_results(results: &[OrganicResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {} - {}\n", i + 1, r.title, r.snippet))
        .collect()
}

#[async_trait]
impl Tool for SerpApiSearch {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: SEARCH_TOOL_NAME.into(),
            description: SEARCH_DESCRIPTION.into(),
            parameters: vec![ParameterSchema::new("query", "string", QUERY_DESCRIPTION)],
        }
    }

    async fn call(&self, args: &ToolArgs) -> CoreResult<String> {
        // argument problems go back to the model as the observation
        let Some(query) = args
            .get("query")
            .and_then(|v| v.as_str())
            .filter(|q| !q.trim().is_empty())
        else {
            return Ok(format!(
                "Invalid Action Input for {SEARCH_TOOL_NAME}: `query` must be a non-empty string"
            ));
        };
        Ok(self.search(query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve one canned JSON response and hand back the request head
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
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        (format!("http://{addr}/search.json"), rx)
    }

    fn search(endpoint: String) -> SerpApiSearch {
        SerpApiSearch::new(SerpApiConfig {
            endpoint,
            timeout_secs: 5,
            ..SerpApiConfig::new("secret")
        })
        .unwrap()
    }

    #[test]
    fn test_schema() {
        let tool = search("http://unused".into());
        let schema = tool.schema();
        assert_eq!(schema.name, "Search Engine");
        assert_eq!(schema.parameters.len(), 1);
        assert_eq!(schema.parameters[0].name, "query");
    }

    #[test]
    fn test_format_results() {
        let results = [
            OrganicResult {
                title: "Sushi".into(),
                snippet: "Rice and fish".into(),
            },
            OrganicResult {
                title: "Nigiri".into(),
                snippet: "Hand-pressed".into(),
            },
        ];
        assert_eq!(
            format_results(&results),
            "1. Sushi - Rice and fish\n2. Nigiri - Hand-pressed\n"
        );
        assert_eq!(format_results(&[]), "");
    }

    #[tokio::test]
    async fn test_search_sends_query_and_formats() {
        let body = r#"{"organic_results":[{"title":"Rust","snippet":"A language"}]}"#;
        let (endpoint, request) = serve_once("200 OK", body).await;
        let tool = search(endpoint);

        let mut args = ToolArgs::new();
        args.insert("query".into(), json!("rust lang"));
        let result = tool.call(&args).await.unwrap();
        assert_eq!(result, "1. Rust - A language\n");

        let head = request.await.unwrap();
        assert!(head.starts_with("GET /search.json?"));
        assert!(head.contains("engine=google"));
        assert!(head.contains("q=rust+lang"));
        assert!(head.contains("api_key=secret"));
        assert!(head.contains("gl=us"));
    }

    #[tokio::test]
    async fn test_error_field_is_reported() {
        let (endpoint, _request) = serve_once("200 OK", r#"{"error":"Invalid API key"}"#).await;
        let err = search(endpoint).search("x").await.unwrap_err();
        assert!(matches!(err, ToolkitError::Search(msg) if msg == "Invalid API key"));
    }

    #[tokio::test]
    async fn test_http_status_is_reported() {
        let (endpoint, _request) = serve_once("500 Internal Server Error", "{}").await;
        let err = search(endpoint).search("x").await.unwrap_err();
        assert!(matches!(err, ToolkitError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_missing_query_is_reported_to_model() {
        let tool = search("http://unused".into());
        let reply = tool.call(&ToolArgs::new()).await.unwrap();
        assert!(reply.starts_with("Invalid Action Input for Search Engine"));
    }
}

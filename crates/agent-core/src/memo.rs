//! Tool Result Memoization
//!
//! A [`ContentMemoizer`] lives for one question-answer exchange. The
//! caller creates it, hands it to the loop and drops it afterwards; there
//! is no expiry and no eviction.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::tool::ToolArgs;

/// Per-tool, per-query cache of tool results
#[derive(Debug, Default)]
pub struct ContentMemoizer {
    entries: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl ContentMemoizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache key for a call: the canonical JSON of `query`, or of `queries`
    /// when `query` is absent or empty. Calls with neither are not cached.
    pub fn key_for(args: &ToolArgs) -> Option<String> {
        ["query", "queries"]
            .iter()
            .filter_map(|name| args.get(*name))
            .find(|value| !is_empty(value))
            .map(Value::to_string)
    }

    /// Cached result for `tool` and `args`, or the result of `compute`.
    /// Only non-empty results are stored.
    pub async fn get_or_compute<F, Fut>(
        &self,
        tool: &str,
        args: &ToolArgs,
        compute: F,
    ) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let Some(key) = Self::key_for(args) else {
            return compute().await;
        };

        if let Some(hit) = self.lookup(tool, &key)? {
            tracing::debug!(%tool, %key, "tool result served from memo");
            return Ok(hit);
        }

        let result = compute().await?;
        if !result.is_empty() {
            self.lock()?
                .entry(tool.to_string())
                .or_default()
                .insert(key, result.clone());
        }
        Ok(result)
    }

    /// Number of cached results across all tools
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map(|m| m.values().map(HashMap::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, tool: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .lock()?
            .get(tool)
            .and_then(|per_tool| per_tool.get(key))
            .cloned())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, HashMap<String, String>>>> {
        self.entries
            .lock()
            .map_err(|_| AgentError::Other("memo lock poisoned".into()))
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn args(value: Value) -> ToolArgs {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_key_prefers_query_then_queries() {
        assert_eq!(ContentMemoizer::key_for(&args(json!({"query": "x"}))), Some("\"x\"".into()));
        assert_eq!(
            ContentMemoizer::key_for(&args(json!({"query": "", "queries": ["a", "b"]}))),
            Some("[\"a\",\"b\"]".into())
        );
        assert_eq!(ContentMemoizer::key_for(&args(json!({"expression": "1+1"}))), None);
    }

    #[tokio::test]
    async fn test_compute_runs_once_per_key() {
        let memo = ContentMemoizer::new();
        let calls = AtomicU32::new(0);
        let a = args(json!({"query": "x"}));

        for _ in 0..3 {
            let out = memo
                .get_or_compute("search", &a, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("result".to_string())
                })
                .await
                .unwrap();
            assert_eq!(out, "result");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_is_per_tool() {
        let memo = ContentMemoizer::new();
        let a = args(json!({"query": "x"}));
        memo.get_or_compute("one", &a, || async { Ok("1".to_string()) }).await.unwrap();
        let out = memo.get_or_compute("two", &a, || async { Ok("2".to_string()) }).await.unwrap();
        assert_eq!(out, "2");
    }

    #[tokio::test]
    async fn test_empty_results_and_keyless_calls_bypass() {
        let memo = ContentMemoizer::new();
        let calls = AtomicU32::new(0);
        let keyed = args(json!({"query": "x"}));
        let keyless = args(json!({"n": 1}));

        for a in [&keyed, &keyed, &keyless, &keyless] {
            memo.get_or_compute("t", a, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(String::new())
            })
            .await
            .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(memo.is_empty());
    }
}

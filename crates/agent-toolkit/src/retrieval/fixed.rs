//! Static Retriever
//!
//! Serves a fixed set of passages. For tests and offline demos.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{RetrievalReference, Retriever, SearchParams};
use crate::error::Result;

/// Retriever that returns the same passages for every query
#[derive(Default)]
pub struct StaticRetriever {
    hits: Vec<RetrievalReference>,
    queries: Mutex<Vec<String>>,
}

impl StaticRetriever {
    pub fn new(hits: Vec<RetrievalReference>) -> Self {
        Self {
            hits,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queries received so far
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(
        &self,
        query: &str,
        _domain: &str,
        params: &SearchParams,
    ) -> Result<Vec<RetrievalReference>> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        Ok(self.hits.iter().take(params.topk).cloned().collect())
    }

    fn name(&self) -> &str {
        "StaticRetriever"
    }
}

//! Document Retrieval
//!
//! A [`Retriever`] finds reference passages for a question in a named
//! knowledge base. Passages come back as [`RetrievalReference`] hits and
//! are grouped per source file with [`group_references`] before they are
//! handed to the answering branches.

mod fixed;
mod http;

pub use fixed::StaticRetriever;
pub use http::{HttpRetriever, RetrievalConfig};

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One retrieved passage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalReference {
    /// Document the passage was cut from
    #[serde(rename = "file_name")]
    pub source_file_name: String,

    /// Passage text
    #[serde(rename = "text")]
    pub reference_text: String,

    /// Position of the passage inside its document
    #[serde(default, alias = "agg_index", alias = "index")]
    pub sort_index: i64,
}

impl RetrievalReference {
    pub fn new(file: impl Into<String>, text: impl Into<String>, sort_index: i64) -> Self {
        Self {
            source_file_name: file.into(),
            reference_text: text.into(),
            sort_index,
        }
    }
}

/// All passages of one document, formatted for a prompt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceDocument {
    pub file_name: String,
    pub text: String,
}

/// Search parameters sent with every query
#[derive(Clone, Debug)]
pub struct SearchParams {
    /// Similarity threshold, 0 to 1
    pub threshold: f32,

    /// Hits per retrieval method
    pub topk: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            topk: 10,
        }
    }
}

/// Retrieval backend trait
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Passages in `domain` that match `query`
    async fn search(
        &self,
        query: &str,
        domain: &str,
        params: &SearchParams,
    ) -> Result<Vec<RetrievalReference>>;

    /// Search and group the hits into at most `keep` documents
    async fn references(
        &self,
        query: &str,
        domain: &str,
        params: &SearchParams,
        keep: usize,
    ) -> Result<Vec<ReferenceDocument>> {
        let hits = self.search(query, domain, params).await?;
        tracing::debug!(retriever = self.name(), hits = hits.len(), "retrieval finished");
        Ok(group_references(hits, keep))
    }

    /// Backend name
    fn name(&self) -> &str;
}

/// Group hits per source file, in order of each file's first hit.
///
/// Passages of one file are ordered by `sort_index` and joined with blank
/// lines. Only the first `keep` files are returned.
pub fn group_references(hits: Vec<RetrievalReference>, keep: usize) -> Vec<ReferenceDocument> {
    let mut order: Vec<String> = Vec::new();
    let mut passages: HashMap<String, Vec<(i64, String)>> = HashMap::new();
    for hit in hits {
        let entry = passages
            .entry(hit.source_file_name.clone())
            .or_insert_with(|| {
                order.push(hit.source_file_name.clone());
                Vec::new()
            });
        entry.push((hit.sort_index, hit.reference_text));
    }

    order
        .into_iter()
        .take(keep)
        .filter_map(|file_name| {
            let mut parts = passages.remove(&file_name)?;
            parts.sort_by_key(|(index, _)| *index);
            let body = parts
                .into_iter()
                .map(|(_, text)| text)
                .collect::<Vec<_>>()
                .join("\n\n");
            Some(ReferenceDocument {
                text: format!("---\n**File Name**: {file_name}\n**Reference**:\n{body}\n---\n\n"),
                file_name,
            })
        })
        .collect()
}

//! Prompt Templates
//!
//! A [`PromptTemplate`] is immutable text with `{name}` placeholders
//! (`{{` and `}}` escape literal braces), an ordered stop-sequence list
//! and an [`Extraction`] rule for pulling structured data back out of
//! the model's reply.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::parse;

/// Bound values for a render
pub type Fields = BTreeMap<String, String>;

/// Build [`Fields`] from `(name, value)` pairs
pub fn fields<I, K, V>(pairs: I) -> Fields
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// How a template's reply is post-processed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extraction {
    /// Reply unchanged
    Identity,
    /// Text after the `Final Answer:` line marker, or the whole reply
    FinalAnswer,
    /// `on_match` if the lowercased reply contains `needle`, else `fallback`
    Keyword {
        needle: String,
        on_match: String,
        fallback: String,
    },
    /// `Yes` if the reply says yes, otherwise `No`
    YesNo,
    /// Object from the last fenced JSON block (or the whole reply).
    /// `strict` turns unparseable content into an error instead of `null`.
    Json { strict: bool },
}

/// Result of [`PromptTemplate::extract`]
#[derive(Clone, Debug, PartialEq)]
pub enum Extracted {
    Text(String),
    Json(Value),
}

impl Extracted {
    /// Text form; JSON values are serialized
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Json(value) => value.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// Parameterized prompt text
#[derive(Clone, Debug)]
pub struct PromptTemplate {
    name: String,
    segments: Vec<Segment>,
    stop: Vec<String>,
    extraction: Extraction,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, source: &str) -> Self {
        Self {
            name: name.into(),
            segments: compile(source),
            stop: Vec::new(),
            extraction: Extraction::Identity,
        }
    }

    #[must_use]
    pub fn with_stop<I, S>(mut self, stop: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop = stop.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_extraction(mut self, extraction: Extraction) -> Self {
        self.extraction = extraction;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered literal stop sequences
    pub fn stop_sequences(&self) -> &[String] {
        &self.stop
    }

    /// Placeholder names in order of first appearance
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Field(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Substitute every placeholder. Extra bindings are ignored.
    pub fn render(&self, values: &Fields) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = values
                        .get(name)
                        .ok_or_else(|| AgentError::MissingField(format!("{}.{name}", self.name)))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    /// Post-process a reply according to this template's [`Extraction`]
    pub fn extract(&self, raw: &str) -> Result<Extracted> {
        match &self.extraction {
            Extraction::Identity => Ok(Extracted::Text(raw.to_string())),
            Extraction::FinalAnswer => Ok(Extracted::Text(parse::final_answer_or_all(raw))),
            Extraction::Keyword {
                needle,
                on_match,
                fallback,
            } => {
                let label = if raw.to_lowercase().contains(&needle.to_lowercase()) {
                    on_match
                } else {
                    fallback
                };
                Ok(Extracted::Text(label.clone()))
            }
            Extraction::YesNo => {
                let lower = raw.to_lowercase();
                let label = if lower.contains("yes") { "Yes" } else { "No" };
                Ok(Extracted::Text(label.into()))
            }
            Extraction::Json { strict } => {
                let body = parse::last_fenced_block(raw).unwrap_or(raw).trim();
                match serde_json::from_str::<Value>(body) {
                    Ok(value) => Ok(Extracted::Json(value)),
                    Err(err) if *strict => Err(AgentError::Parse(format!(
                        "{}: reply is not valid JSON: {err}",
                        self.name
                    ))),
                    Err(err) => {
                        tracing::debug!(template = %self.name, error = %err, "lenient JSON extraction fell back to null");
                        Ok(Extracted::Json(Value::Null))
                    }
                }
            }
        }
    }
}

/// Split source text into literals and `{field}` placeholders. A brace
/// pair whose contents are not an identifier is kept as literal text.
fn compile(source: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = source;

    while let Some(pos) = rest.find(['{', '}']) {
        literal.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            literal.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            literal.push('}');
            rest = &tail[1..];
            continue;
        }

        let name_len = tail[1..].find('}');
        match name_len {
            Some(len) if is_identifier(&tail[1..=len]) => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(tail[1..=len].to_string()));
                rest = &tail[len + 2..];
            }
            _ => {
                literal.push('{');
                rest = &tail[1..];
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// Built-in Templates
// ============================================================================

const REACT: &str = r#"Answer the following question as best you can, think step by step.

Question: {question}

You have access to the following tools:

{tools}

Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of {tool_names} if it needed. You can skip this and give Final Answer directly.
Action Input: the input to the action, must align with tool's input rule description, kwargs in JSON format:
```json
{{
    "key": "value"
}}
```
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question

Begin!

{agent_scratchpad}"#;

const TOOL_ENTRY: &str = "{tool_name}\n    description: {description}\n    arguments: {arguments}";

const QUERY_ROUTER: &str = r#"According to the user submitted question, determine whether the query requires specialized, evidence-based insights from the knowledge base or if it can be answered directly using general knowledge.

## Question:
{question}

## Instructions:
- If the query involves detailed methodologies, specific study results, advanced terminology, or references to recent findings, mark it as "RETRIEVAL NEEDED".
- If the question is broad, conceptual, or based on common knowledge, mark it as "GENERAL ANSWER".

Return in the format:
"RETRIEVAL NEEDED" or "GENERAL ANSWER""#;

const REFERENCE_QUESTION: &str = r"{question}

Answer using the following reference first. Only use tools when the reference is not enough.

{reference}";

const YES_NO: &str = r"{question}

Answer with Yes or No.";

const CATEGORY_JSON: &str = r"Classify the following content into categories.

{content}

Return the result as a JSON object in a fenced block:
```json
{{ ... }}
```";

/// ReAct prompt. Fields: `question`, `tools`, `tool_names`, `agent_scratchpad`.
pub fn react() -> PromptTemplate {
    PromptTemplate::new("react", REACT)
        .with_stop(["Observation:"])
        .with_extraction(Extraction::FinalAnswer)
}

/// One tool documentation entry. Fields: `tool_name`, `description`, `arguments`.
pub fn tool_entry() -> PromptTemplate {
    PromptTemplate::new("tool_entry", TOOL_ENTRY)
}

/// Routes a question to `RETRIEVAL` or `GENERAL`. Field: `question`.
pub fn query_router() -> PromptTemplate {
    PromptTemplate::new("query_router", QUERY_ROUTER).with_extraction(Extraction::Keyword {
        needle: "retriev".into(),
        on_match: "RETRIEVAL".into(),
        fallback: "GENERAL".into(),
    })
}

/// Question carrying one reference document. Fields: `question`, `reference`.
pub fn reference_question() -> PromptTemplate {
    PromptTemplate::new("reference_question", REFERENCE_QUESTION)
}

/// Lenient yes/no classifier. Field: `question`.
pub fn yes_no() -> PromptTemplate {
    PromptTemplate::new("yes_no", YES_NO).with_extraction(Extraction::YesNo)
}

/// Strict JSON category classifier. Field: `content`.
pub fn category_json() -> PromptTemplate {
    PromptTemplate::new("category_json", CATEGORY_JSON)
        .with_extraction(Extraction::Json { strict: true })
}

//! Tool System
//!
//! Tools are registered once per agent and invoked by the tool-call loop
//! with the JSON keyword arguments the model wrote after `Action Input:`.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::Result;
use crate::template::{self, fields};

/// Keyword arguments passed to a tool
pub type ToolArgs = Map<String, Value>;

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,
}

impl ParameterSchema {
    pub fn new(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
        }
    }

    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Tool definition shown to the model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSchema {
    /// Argument schema as a JSON object keyed by parameter name
    pub fn arguments_json(&self) -> String {
        let mut props = Map::new();
        for param in &self.parameters {
            let mut entry = Map::new();
            entry.insert("type".into(), Value::String(param.param_type.clone()));
            entry.insert("description".into(), Value::String(param.description.clone()));
            if !param.required {
                entry.insert("required".into(), Value::Bool(false));
            }
            props.insert(param.name.clone(), Value::Object(entry));
        }
        Value::Object(props).to_string()
    }
}

/// Tool trait - implement to add new capabilities
///
/// Handlers may be retried, so they must tolerate being called again with
/// the same arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema
    fn schema(&self) -> ToolSchema;

    /// Run the tool and return its textual result
    async fn call(&self, args: &ToolArgs) -> Result<String>;
}

type Handler = dyn Fn(ToolArgs) -> BoxFuture<'static, Result<String>> + Send + Sync;

/// Tool backed by a closure
pub struct FnTool {
    schema: ToolSchema,
    handler: Box<Handler>,
}

impl FnTool {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ParameterSchema>,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolArgs) -> BoxFuture<'static, Result<String>> + Send + Sync + 'static,
    {
        Self {
            schema: ToolSchema {
                name: name.into(),
                description: description.into(),
                parameters,
            },
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn call(&self, args: &ToolArgs) -> Result<String> {
        (self.handler)(args.clone()).await
    }
}

struct Entry {
    name: String,
    key: String,
    tool: Arc<dyn Tool>,
}

/// Registry for available tools, in registration order
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A second registration under the same name replaces
    /// the first and keeps its documentation position.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.schema().name;
        let key = name.to_lowercase();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.name == name) {
            tracing::warn!(tool = %name, "tool re-registered, replacing previous handler");
            existing.tool = tool;
            return;
        }
        self.entries.push(Entry { name, key, tool });
    }

    /// Exact name lookup
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.tool.clone())
    }

    /// Find the tool the model meant. Tries a case-insensitive exact match
    /// first, then the longest registered name contained in `action`.
    pub fn resolve(&self, action: &str) -> Option<(String, Arc<dyn Tool>)> {
        let wanted = action.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|e| e.key == wanted)
            .or_else(|| {
                self.entries
                    .iter()
                    .filter(|e| wanted.contains(&e.key))
                    .max_by_key(|e| e.key.len())
            })
            .map(|e| (e.name.clone(), e.tool.clone()))
    }

    /// Documentation block for the named tools, or all tools when `None`.
    /// Unknown names are skipped.
    pub fn document(&self, names: Option<&[String]>) -> String {
        let entry_template = template::tool_entry();
        let selected: Vec<&str> = names.map_or_else(
            || self.entries.iter().map(|e| e.name.as_str()).collect(),
            |names| names.iter().map(String::as_str).collect(),
        );

        let mut doc = String::new();
        for name in selected {
            let Some(tool) = self.get(name) else {
                tracing::info!(tool = %name, "tool is not registered for agent, skipping");
                continue;
            };
            let schema = tool.schema();
            let rendered = entry_template.render(&fields([
                ("tool_name", schema.name.clone()),
                ("description", schema.description.clone()),
                ("arguments", schema.arguments_json()),
            ]));
            match rendered {
                Ok(text) => {
                    doc.push_str(&text);
                    doc.push('\n');
                }
                Err(err) => tracing::error!(tool = %name, error = %err, "tool entry failed to render"),
            }
        }
        doc
    }

    /// Get tool names in registration order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

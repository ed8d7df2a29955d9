//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world: drive a
//! browser, call cloud APIs, search the web. This core only defines the
//! seam; concrete implementations are external collaborators. A tool takes
//! keyword parameters as a JSON object and returns a string, or raises a
//! `ToolError` whose message the dispatcher inspects for retryability.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

use crate::error::ToolError;

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "web_search", "browse_website").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the oracle).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    /// Execute the tool with the given keyword parameters.
    async fn execute(&self, params: serde_json::Value) -> std::result::Result<String, ToolError>;
}

/// A registry of available tools, built once at startup.
///
/// The agent loop uses this to render the tool catalog for the oracle; the
/// dispatcher uses it to look up and invoke tools by name. Lookup of an
/// unknown name yields `ToolError::NotFound`, which is reported to the
/// oracle as a failed step rather than raised.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> std::result::Result<&dyn Tool, ToolError> {
        self.tools
            .get(name)
            .map(|t| t.as_ref())
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// Name → description map, rendered into the oracle prompt.
    /// BTreeMap so the catalog text is stable across runs.
    pub fn catalog(&self) -> BTreeMap<String, String> {
        self.tools
            .values()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Tools exposed to the model
//!
//! Each tool turns JSON arguments from a tool call into a text result the
//! model reads back. Failures never escape a tool: they come back as an
//! `{"error": ...}` payload so the model can react to them.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::cbioportal::CbioportalClient;
use crate::config::ToolsConfig;
use crate::llm::Tool;
use crate::metrics::{TOOL_CALLS, TOOL_DURATION};

pub mod biorxiv;
pub mod cbioportal;
pub mod protein_expression;

pub use biorxiv::BiorxivSearchTool;
pub use cbioportal::CbioportalSearchTool;
pub use protein_expression::ProteinExpressionTool;

/// Text handed back to the model for one tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// `{"error": message}`
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: json!({ "error": message.into() }).to_string(),
            is_error: true,
        }
    }

    /// Failure reported as plain text rather than JSON
    pub fn error_text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

#[async_trait]
pub trait BioTool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Function definition sent with every chat request
    fn definition(&self) -> Tool;

    async fn call(&self, args: &Value) -> ToolOutput;
}

/// Ordered set of tools available to the agent
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn BioTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the tool set enabled in `config`
    pub fn from_config(config: &ToolsConfig, cbioportal: Arc<CbioportalClient>) -> Self {
        let mut registry = Self::new();

        if config.enable_biorxiv {
            registry.register(Arc::new(BiorxivSearchTool::new(
                config.search_url.clone(),
                config.biorxiv_max_results,
            )));
        }
        if config.enable_cbioportal {
            registry.register(Arc::new(CbioportalSearchTool::new(cbioportal.clone())));
        }
        if config.enable_protein_expression {
            registry.register(Arc::new(ProteinExpressionTool::new(cbioportal)));
        }

        debug!(tools = ?registry.names(), "tool registry ready");
        registry
    }

    /// Add a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn BioTool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn BioTool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn definitions(&self) -> Vec<Tool> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run the named tool. An unknown name yields an error output listing
    /// the tools that do exist.
    pub async fn dispatch(&self, name: &str, args: &Value) -> ToolOutput {
        let Some(tool) = self.get(name) else {
            warn!(tool = name, "model requested an unknown tool");
            TOOL_CALLS.with_label_values(&["unknown", "error"]).inc();
            return ToolOutput::error(format!(
                "Unknown tool '{}'. Available tools: {}",
                name,
                self.names().join(", ")
            ));
        };

        let start = Instant::now();
        let output = tool.call(args).await;
        let elapsed = start.elapsed().as_secs_f64();

        let status = if output.is_error { "error" } else { "ok" };
        TOOL_CALLS.with_label_values(&[tool.name(), status]).inc();
        TOOL_DURATION.with_label_values(&[tool.name()]).observe(elapsed);
        output
    }
}

/// Comma-separated symbols: trimmed, upper-cased, empties dropped.
///
/// Also accepts a JSON array of strings, which models sometimes send
/// instead of a single string.
pub fn parse_symbol_list(raw: &Value) -> Vec<String> {
    let joined = match raw {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(","),
        _ => String::new(),
    };
    joined
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// String argument, trimmed; empty when missing or not a string
pub(crate) fn string_arg<'a>(args: &'a Value, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).map(str::trim).unwrap_or("")
}

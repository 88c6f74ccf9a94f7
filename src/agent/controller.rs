//! Agent Controller - tool-calling loop over the chat completions endpoint
//!
//! The AgentController sends the question with the tool definitions, runs
//! whatever tools the model asks for, feeds the results back, and stops when
//! the model answers without requesting a tool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ModelConfig;
use crate::llm::{parse_tool_calls_from_text, ChatBackend, ChatError, ChatMessage, SamplingParams, ToolCall};
use crate::metrics::{AGENT_RUNS, AGENT_TURNS, LLM_CALL_DURATION};
use crate::tools::{ToolOutput, ToolRegistry};

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"Expert biological reasoning agent. Answer questions efficiently.

CRITICAL WORKFLOW:
1. If question involves genes/proteins/cancer data → IMMEDIATELY use tools (cBioPortal/protein expression)
2. Use tool results to answer → keep reasoning minimal
3. Format final answer as: <answer>[letter]</answer>

DO NOT:
- Overthink before calling tools
- Provide lengthy explanations before tool calls
- Repeat information already in tool results

DO:
- Call tools immediately for data-dependent questions
- Be concise and direct
- Trust tool data over general knowledge"#;

/// Configuration for the agent controller
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Served model name
    pub model: String,
    /// Custom system prompt (uses default if None)
    pub system_prompt: Option<String>,
    pub sampling: SamplingParams,
    /// Maximum number of model calls before giving up
    pub max_turns: usize,
    /// Deadline for a whole run, applied by `run_with_timeout`
    pub timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_model_config(&ModelConfig::default(), "Qwen/Qwen3-8B")
    }
}

impl AgentConfig {
    pub fn from_model_config(config: &ModelConfig, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: config.system_prompt.clone(),
            sampling: config.sampling(),
            max_turns: config.max_turns,
            timeout: config.request_timeout(),
        }
    }

    fn system_prompt(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}

/// Result of an agent run
#[derive(Debug, Clone)]
pub struct AgentResult {
    /// Text of the final assistant message
    pub final_response: String,
    /// Number of model calls made
    pub turns: usize,
    /// Number of tool calls executed
    pub tool_calls_made: usize,
    pub tool_records: Vec<ToolCallRecord>,
    /// Unique trace ID for this agent run
    pub trace_id: String,
}

/// Record of a single tool call
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub tool: String,
    /// Raw JSON argument string as sent by the model
    pub arguments: String,
    pub duration_ms: f64,
    pub ok: bool,
}

/// Error type for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Maximum turns ({0}) reached without a final answer")]
    MaxTurnsReached(usize),

    #[error("Agent run timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model server error: {0}")]
    Chat(#[from] ChatError),
}

/// Agent Controller orchestrating the model and the tools
pub struct AgentController {
    backend: Arc<dyn ChatBackend>,
    tools: ToolRegistry,
    config: AgentConfig,
}

impl AgentController {
    /// Create a new agent controller
    ///
    /// # Arguments
    /// * `backend` - Chat completions backend (normally a `ChatClient`)
    /// * `tools` - Tools the model may call
    /// * `config` - Agent configuration
    pub fn new(backend: Arc<dyn ChatBackend>, tools: ToolRegistry, config: AgentConfig) -> Self {
        Self {
            backend,
            tools,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run `run` under the configured deadline
    pub async fn run_with_timeout(&self, input: &str) -> Result<AgentResult, AgentError> {
        match tokio::time::timeout(self.config.timeout, self.run(input)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.config.timeout, "agent run timed out");
                AGENT_RUNS.with_label_values(&["timeout"]).inc();
                Err(AgentError::Timeout(self.config.timeout))
            }
        }
    }

    /// Run the agent loop for one input
    ///
    /// # Returns
    /// AgentResult containing the final response and the tool call history
    pub async fn run(&self, input: &str) -> Result<AgentResult, AgentError> {
        let trace_id = Uuid::now_v7().to_string();

        let root_span = info_span!(
            "agent_run",
            trace_id = %trace_id,
            model = %self.config.model,
            otel.name = "agent_run"
        );

        async {
            debug!(input_len = input.len(), "starting agent run");

            let definitions = self.tools.definitions();
            let tools = (!definitions.is_empty()).then_some(definitions.as_slice());

            let mut messages = vec![
                ChatMessage::system(self.config.system_prompt()),
                ChatMessage::user(input),
            ];

            let mut turns = 0;
            let mut tool_records = Vec::new();

            loop {
                if turns >= self.config.max_turns {
                    warn!(turns, "max turns reached");
                    AGENT_RUNS.with_label_values(&["max_turns"]).inc();
                    AGENT_TURNS.observe(turns as f64);
                    return Err(AgentError::MaxTurnsReached(self.config.max_turns));
                }
                turns += 1;

                let llm_span = info_span!("llm_call", turn = turns, otel.name = "llm_call");
                let call_start = Instant::now();
                let response = match self
                    .backend
                    .chat(&messages, &self.config.model, tools, &self.config.sampling)
                    .instrument(llm_span)
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        AGENT_RUNS.with_label_values(&["error"]).inc();
                        return Err(e.into());
                    }
                };
                let call_secs = call_start.elapsed().as_secs_f64();
                LLM_CALL_DURATION
                    .with_label_values(&[&self.config.model])
                    .observe(call_secs);
                debug!(turn = turns, duration_ms = call_secs * 1000.0, finish_reason = ?response.finish_reason, "model call completed");

                let mut assistant = response.message;
                let tool_calls = self.requested_tool_calls(&assistant);

                if tool_calls.is_empty() {
                    info!(turns, tool_calls = tool_records.len(), "agent run completed");
                    AGENT_RUNS.with_label_values(&["success"]).inc();
                    AGENT_TURNS.observe(turns as f64);

                    return Ok(AgentResult {
                        final_response: assistant.text().to_string(),
                        turns,
                        tool_calls_made: tool_records.len(),
                        tool_records,
                        trace_id,
                    });
                }

                // Calls recovered from text are attached so that the tool
                // messages below reference ids the transcript knows about.
                if assistant.native_tool_calls().is_empty() {
                    assistant.tool_calls = Some(tool_calls.clone());
                }
                messages.push(assistant);

                let results = join_all(tool_calls.iter().map(|call| self.execute_tool(call))).await;
                for (call, (output, record)) in tool_calls.iter().zip(results) {
                    tool_records.push(record);
                    messages.push(ChatMessage::tool(call.id.clone(), output.content));
                }
            }
        }
        .instrument(root_span)
        .await
    }

    /// Native tool calls first; otherwise calls to registered tools found in
    /// the message text
    fn requested_tool_calls(&self, message: &ChatMessage) -> Vec<ToolCall> {
        let native = message.native_tool_calls();
        if !native.is_empty() {
            return native.to_vec();
        }

        let recovered: Vec<ToolCall> = parse_tool_calls_from_text(message.text())
            .into_iter()
            .filter(|call| self.tools.contains(&call.function.name))
            .collect();
        if !recovered.is_empty() {
            debug!(count = recovered.len(), "recovered tool calls from message text");
        }
        recovered
    }

    async fn execute_tool(&self, call: &ToolCall) -> (ToolOutput, ToolCallRecord) {
        let name = call.function.name.as_str();
        let span = info_span!("tool_call", tool = %name, otel.name = "tool_call");

        async {
            let start = Instant::now();
            let output = match call.function.parsed_arguments() {
                Ok(args @ Value::Object(_)) => self.tools.dispatch(name, &args).await,
                Ok(_) => ToolOutput::error(format!("Arguments for '{}' must be a JSON object", name)),
                Err(e) => ToolOutput::error(format!("Invalid JSON arguments for '{}': {}", name, e)),
            };
            let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

            if output.is_error {
                warn!(duration_ms, "tool call returned an error");
            } else {
                info!(duration_ms, output_len = output.content.len(), "tool call succeeded");
            }

            let record = ToolCallRecord {
                tool: name.to_string(),
                arguments: call.function.arguments.clone(),
                duration_ms,
                ok: !output.is_error,
            };
            (output, record)
        }
        .instrument(span)
        .await
    }
}

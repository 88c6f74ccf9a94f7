//! Integration tests for the agent and batch driver
//!
//! The model server is replaced by a scripted backend so the full
//! question → agent → tools → answer file path runs offline. Tests that need
//! a live vLLM server are marked #[ignore].

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use bioagent::agent::{AgentConfig, AgentController, AgentError};
use bioagent::batch::{
    direct_prompt, load_questions, AgentAnswerer, BatchDriver, DirectAnswerer, QuestionRecord,
};
use bioagent::config::ModelConfig;
use bioagent::llm::{ChatBackend, ChatError, ChatMessage, ChatResponse, SamplingParams, Tool, ToolCall};
use bioagent::tools::{BioTool, ToolOutput, ToolRegistry};

/// Answers from the conversation alone, so concurrent runs don't interfere:
/// - question mentions "lookup" → call the lookup tool first
/// - question mentions "broken" → server error
/// - question mentions "forever" → keep calling tools
/// - after a tool result → answer from the tool output
struct RuleBackend;

#[async_trait]
impl ChatBackend for RuleBackend {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        _model: &str,
        tools: Option<&[Tool]>,
        _sampling: &SamplingParams,
    ) -> Result<ChatResponse, ChatError> {
        let question = messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.text().to_string())
            .unwrap_or_default();
        let last = messages.last().ok_or(ChatError::EmptyResponse)?;

        let message = if question.contains("broken") {
            return Err(ChatError::EmptyResponse);
        } else if question.contains("forever") {
            tool_call_message("TP53")
        } else if last.role == "tool" {
            let letter = if last.text().contains("BRAF") { "A" } else { "B" };
            ChatMessage::assistant(format!("<answer>{}</answer>", letter))
        } else if question.contains("lookup") {
            assert!(tools.map_or(false, |t| !t.is_empty()), "tools not offered");
            tool_call_message("BRAF")
        } else {
            ChatMessage::assistant("The answer is C")
        };

        Ok(ChatResponse {
            message,
            finish_reason: Some("stop".to_string()),
            usage: None,
        })
    }

    async fn complete(
        &self,
        _prompts: &[String],
        _model: &str,
        _sampling: &SamplingParams,
    ) -> Result<Vec<String>, ChatError> {
        Err(ChatError::EmptyResponse)
    }
}

/// Records each `/completions` call and replies with one canned text per prompt
struct CompletionBackend {
    replies: Vec<&'static str>,
    calls: Mutex<Vec<(Vec<String>, String, SamplingParams)>>,
}

impl CompletionBackend {
    fn new(replies: Vec<&'static str>) -> Self {
        Self {
            replies,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatBackend for CompletionBackend {
    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _model: &str,
        _tools: Option<&[Tool]>,
        _sampling: &SamplingParams,
    ) -> Result<ChatResponse, ChatError> {
        panic!("direct mode must not use /chat/completions");
    }

    async fn complete(
        &self,
        prompts: &[String],
        model: &str,
        sampling: &SamplingParams,
    ) -> Result<Vec<String>, ChatError> {
        let offset: usize = self.calls.lock().unwrap().iter().map(|c| c.0.len()).sum();
        self.calls
            .lock()
            .unwrap()
            .push((prompts.to_vec(), model.to_string(), sampling.clone()));
        Ok(self.replies[offset..offset + prompts.len()]
            .iter()
            .map(|r| r.to_string())
            .collect())
    }
}

fn tool_call_message(gene: &str) -> ChatMessage {
    ChatMessage {
        role: "assistant".to_string(),
        content: None,
        tool_calls: Some(vec![ToolCall::new(
            "lookup",
            json!({ "gene": gene }).to_string(),
        )]),
        tool_call_id: None,
    }
}

struct LookupTool;

#[async_trait]
impl BioTool for LookupTool {
    fn name(&self) -> &'static str {
        "lookup"
    }

    fn definition(&self) -> Tool {
        Tool::function(
            "lookup",
            "Look up a gene",
            json!({
                "type": "object",
                "properties": {"gene": {"type": "string"}},
                "required": ["gene"]
            }),
        )
    }

    async fn call(&self, args: &Value) -> ToolOutput {
        ToolOutput::ok(json!({ "gene": args["gene"], "mutation_frequency": "freq:0.52" }).to_string())
    }
}

fn controller(max_turns: usize) -> Arc<AgentController> {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(LookupTool));
    let config = AgentConfig {
        model: "test-model".to_string(),
        max_turns,
        ..AgentConfig::default()
    };
    Arc::new(AgentController::new(Arc::new(RuleBackend), tools, config))
}

fn question(id: u64, text: &str) -> QuestionRecord {
    QuestionRecord::new(text, json!({"A": "BRAF", "B": "EGFR", "C": "KRAS"})).with_id(json!(id))
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// Test that the agent config follows the model settings
#[test]
fn test_agent_config_defaults() {
    let config = AgentConfig::default();

    assert_eq!(config.model, "Qwen/Qwen3-8B");
    assert_eq!(config.max_turns, 10);
    assert!(config.system_prompt.is_none());
    assert!(config.timeout.as_secs() > 0);
}

/// Test a full tool round trip through the agent
#[tokio::test]
async fn test_agent_uses_tool_then_answers() {
    let result = controller(5)
        .run("Which gene? Please lookup the melanoma driver.")
        .await
        .unwrap();

    assert_eq!(result.final_response, "<answer>A</answer>");
    assert_eq!(result.turns, 2);
    assert_eq!(result.tool_calls_made, 1);
    assert_eq!(result.tool_records[0].tool, "lookup");
    assert!(!result.trace_id.is_empty());
}

/// Test that the agent gives up after max_turns
#[tokio::test]
async fn test_agent_max_turns() {
    let err = controller(3).run("loop forever").await.unwrap_err();
    assert!(matches!(err, AgentError::MaxTurnsReached(3)));
}

/// Test that server errors surface as chat errors
#[tokio::test]
async fn test_agent_server_error() {
    let err = controller(3).run("a broken question").await.unwrap_err();
    assert!(matches!(err, AgentError::Chat(ChatError::EmptyResponse)));
}

/// Test tool definition serialization sent to the server
#[test]
fn test_tool_serialization() {
    let json = serde_json::to_value(LookupTool.definition()).unwrap();
    assert_eq!(json["type"], "function");
    assert_eq!(json["function"]["name"], "lookup");
    assert_eq!(json["function"]["parameters"]["required"][0], "gene");
}

/// Test ChatMessage serialization skips unset fields
#[test]
fn test_chat_message_serialization() {
    let json = serde_json::to_string(&ChatMessage::user("test message")).unwrap();

    assert!(json.contains("\"role\":\"user\""));
    assert!(json.contains("\"content\":\"test message\""));
    assert!(!json.contains("tool_calls"));
    assert!(!json.contains("tool_call_id"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Batch driver
// ─────────────────────────────────────────────────────────────────────────────

/// Test the whole batch path: load → agent → extract → JSONL
#[tokio::test]
async fn test_batch_run_writes_one_record_per_question() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("questions.jsonl");
    let output = dir.path().join("result").join("answers.jsonl");

    let lines: Vec<String> = [
        question(1, "Please lookup the melanoma driver gene."),
        question(2, "Which option is right?"),
        question(3, "This one is broken."),
        question(4, "And lookup another one."),
        question(5, "Last question."),
    ]
    .iter()
    .map(|q| serde_json::to_string(q).unwrap())
    .collect();
    std::fs::write(&input, lines.join("\n")).unwrap();

    let questions = load_questions(&input).unwrap();
    let answerer = AgentAnswerer::new(controller(5), 2);
    let driver = BatchDriver::new(Arc::new(answerer), 2);
    let (records, summary) = driver.run(&questions, &output).await.unwrap();

    assert_eq!(summary.total, 5);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.answered, 4);

    let letters: Vec<&str> = records.iter().map(|r| r.answer_letter.as_str()).collect();
    assert_eq!(letters, vec!["A", "C", "X", "A", "C"]);
    assert!(records[2].raw_response.starts_with("Error: "));

    // Output preserves input order and input fields
    let written: Vec<Value> = std::fs::read_to_string(&output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(written.len(), 5);
    assert_eq!(written[0]["id"], 1);
    assert_eq!(written[4]["id"], 5);
    assert_eq!(written[1]["options"]["B"], "EGFR");
    assert_eq!(written[1]["raw_response"], "The answer is C");
}

/// Test direct mode: ChatML prompts batched into `/completions`, sampling
/// from the direct settings, one extracted letter per item
#[tokio::test]
async fn test_direct_run_batches_completions() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("direct.jsonl");

    let mut questions = vec![
        question(1, "Which gene is mutated in melanoma?"),
        question(2, "Which gene is amplified?"),
        question(3, "Which gene is in pancreatic cancer?"),
    ];
    questions[1].fields.insert("metadata".to_string(), Value::Null);

    let backend = Arc::new(CompletionBackend::new(vec![
        "<think>maybe B</think> <answer>A</answer>",
        "Answer: B",
        "I am not sure.",
    ]));
    let model_config = ModelConfig {
        temperature: 0.0,
        ..ModelConfig::default()
    };
    let answerer = DirectAnswerer::new(backend.clone(), "test-model", model_config.direct_sampling());
    let driver = BatchDriver::new(Arc::new(answerer), 2);
    let (records, summary) = driver.run(&questions, &output).await.unwrap();

    let calls = backend.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0.len(), 2);
    assert_eq!(calls[1].0.len(), 1);

    let (prompts, model, sampling) = &calls[0];
    assert_eq!(model, "test-model");
    assert_eq!(prompts[0], direct_prompt(&questions[0]));
    assert!(prompts[0].starts_with("<|im_start|>system\n"));
    assert!(prompts[0].ends_with("<|im_start|>assistant\n"));
    assert!(prompts[0].contains("Question: Which gene is mutated in melanoma?"));
    assert_eq!(sampling.max_tokens, 2048);
    assert!((sampling.temperature - 0.3).abs() < f32::EPSILON);

    let letters: Vec<&str> = records.iter().map(|r| r.answer_letter.as_str()).collect();
    assert_eq!(letters, vec!["A", "B", "X"]);
    assert_eq!(summary.answered, 2);
    assert_eq!(summary.errors, 0);

    let written: Vec<Value> = std::fs::read_to_string(&output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(written[1]["metadata"], Value::Null);
    assert!(written[1].as_object().unwrap().contains_key("metadata"));
    assert_eq!(written[2]["raw_response"], "I am not sure.");
}

/// Test that a failed `/completions` call marks the whole batch
#[tokio::test]
async fn test_direct_run_request_failure_fails_batch() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("direct.jsonl");
    let questions = vec![question(1, "q1"), question(2, "q2")];

    let answerer = DirectAnswerer::new(Arc::new(RuleBackend), "test-model", SamplingParams::default());
    let driver = BatchDriver::new(Arc::new(answerer), 4);
    let (records, summary) = driver.run(&questions, &output).await.unwrap();

    assert_eq!(summary.errors, 2);
    assert!(records.iter().all(|r| r.answer_letter == "X"));
    assert!(records[0].raw_response.starts_with("Error: "));
}

// Integration tests that require external services

/// Test a real agent run against a live server
#[tokio::test]
#[ignore = "Requires a vLLM server on localhost:8000"]
async fn test_live_model_answers() {
    use bioagent::llm::ChatClient;

    let client = ChatClient::new("http://localhost:8000/v1", "EMPTY");
    let model = client.resolve_model(None).await.unwrap();
    let config = AgentConfig {
        model,
        ..AgentConfig::default()
    };
    let controller = AgentController::new(Arc::new(client), ToolRegistry::new(), config);
    let result = controller
        .run("Question: 2+2?\n\nOptions:\nA: 3\nB: 4\n\nAnswer with <answer>[letter]</answer>")
        .await
        .unwrap();
    assert!(!result.final_response.is_empty());
}

//! bioagent - batch multiple-choice answering with a tool-calling LLM agent
//!
//! This library wires a locally served, OpenAI-compatible model (vLLM in a
//! container) to a handful of biological lookup tools and runs a question
//! file through the resulting agent, one answer record per question.
//!
//! # Modules
//!
//! - `config` - Layered configuration (defaults, file, `BIOAGENT__*` env)
//! - `llm` - OpenAI-compatible chat/completions client with tool calling
//! - `agent` - Tool-calling loop over the chat client
//! - `tools` - Tool definitions exposed to the model
//! - `cbioportal` - cBioPortal REST client and feature extraction
//! - `batch` - Question loading, prompting, answer extraction, batch driver
//! - `launch` - `docker run` launcher for the vLLM server
//! - `metrics` - Prometheus metrics for observability
//! - `telemetry` - tracing subscriber + optional OTLP export
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use bioagent::batch::{load_questions, DirectAnswerer};
//! use bioagent::llm::ChatClient;
//! use bioagent::{AppConfig, BatchDriver};
//!
//! let config = AppConfig::load(None)?;
//! let client = ChatClient::from_config(&config.model)?;
//! let model = client.resolve_model(config.model.model.as_deref()).await?;
//! let answerer = DirectAnswerer::new(Arc::new(client), model, config.model.direct_sampling());
//! let driver = BatchDriver::new(Arc::new(answerer), config.batch.batch_size);
//! let questions = load_questions(&config.batch.input)?;
//! driver.run(&questions, &config.batch.output).await?;
//! ```

pub mod agent;
pub mod batch;
pub mod cbioportal;
pub mod config;
pub mod launch;
pub mod llm;
pub mod metrics;
pub mod telemetry;
pub mod tools;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentConfig, AgentController};
pub use batch::BatchDriver;
pub use config::AppConfig;
pub use tools::ToolRegistry;

//! Batch question answering
//!
//! # Architecture
//!
//! ```text
//! questions.jsonl → load_questions() → make_batches()
//!                                          ↓
//!                   Answerer (agent loop, or one /completions call)
//!                                          ↓
//!                   extract_answer() → AnswerWriter (flushed per record)
//! ```

pub mod answer;
pub mod driver;
pub mod loader;
pub mod prompt;
pub mod question;

pub use answer::{answer_region, extract_answer};
pub use driver::{AgentAnswerer, AnswerError, Answerer, BatchDriver, DirectAnswerer, RunSummary};
pub use loader::{load_questions, make_batches, parse_questions, AnswerWriter, BatchError};
pub use prompt::{agent_prompt, direct_messages, direct_prompt, render_chatml};
pub use question::{AnswerRecord, QuestionRecord, NO_ANSWER};

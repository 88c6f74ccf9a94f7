//! Batch driver: questions in, one answer record per question out

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn, Instrument};

use super::answer::extract_answer;
use super::loader::{make_batches, AnswerWriter, BatchError};
use super::prompt::{agent_prompt, direct_prompt};
use super::question::{AnswerRecord, QuestionRecord};
use crate::agent::{AgentController, AgentError};
use crate::llm::{ChatBackend, ChatError, SamplingParams};
use crate::metrics::{AGENT_RUNS_IN_FLIGHT, BATCH_DURATION, QUESTIONS_TOTAL};

/// Why a single question (or a whole batch) could not be answered
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("{0}")]
    Other(String),
}

/// Produces raw responses for a batch of questions.
///
/// The outer error fails the whole batch; inner errors fail one question.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer_batch(
        &self,
        batch: &[QuestionRecord],
    ) -> Result<Vec<Result<String, AnswerError>>, AnswerError>;
}

/// Runs every question of a batch through the agent concurrently, bounded
/// by a semaphore and a per-question deadline
pub struct AgentAnswerer {
    controller: Arc<AgentController>,
    permits: Arc<Semaphore>,
}

impl AgentAnswerer {
    pub fn new(controller: Arc<AgentController>, max_concurrency: usize) -> Self {
        Self {
            controller,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    async fn answer_one(&self, prompt: String) -> Result<String, AnswerError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AnswerError::Other("concurrency limiter closed".to_string()))?;

        AGENT_RUNS_IN_FLIGHT.inc();
        let result = self.controller.run_with_timeout(&prompt).await;
        AGENT_RUNS_IN_FLIGHT.dec();

        Ok(result?.final_response)
    }
}

#[async_trait]
impl Answerer for AgentAnswerer {
    async fn answer_batch(
        &self,
        batch: &[QuestionRecord],
    ) -> Result<Vec<Result<String, AnswerError>>, AnswerError> {
        let prompts: Vec<String> = batch.iter().map(agent_prompt).collect();
        Ok(join_all(prompts.into_iter().map(|p| self.answer_one(p))).await)
    }
}

/// One `/completions` request per batch, no tools
pub struct DirectAnswerer {
    backend: Arc<dyn ChatBackend>,
    model: String,
    sampling: SamplingParams,
}

impl DirectAnswerer {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        model: impl Into<String>,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            sampling,
        }
    }
}

#[async_trait]
impl Answerer for DirectAnswerer {
    async fn answer_batch(
        &self,
        batch: &[QuestionRecord],
    ) -> Result<Vec<Result<String, AnswerError>>, AnswerError> {
        let prompts: Vec<String> = batch.iter().map(direct_prompt).collect();
        let texts = self
            .backend
            .complete(&prompts, &self.model, &self.sampling)
            .await?;
        Ok(texts.into_iter().map(Ok).collect())
    }
}

/// Totals for a finished run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    /// Records with an extracted letter
    pub answered: usize,
    /// Records written as `Error: ...`
    pub errors: usize,
    pub elapsed: Duration,
}

pub struct BatchDriver {
    answerer: Arc<dyn Answerer>,
    batch_size: usize,
}

impl BatchDriver {
    pub fn new(answerer: Arc<dyn Answerer>, batch_size: usize) -> Self {
        Self {
            answerer,
            batch_size: batch_size.max(1),
        }
    }

    /// Answer all questions, writing each batch to `output` as it completes
    pub async fn run(
        &self,
        questions: &[QuestionRecord],
        output: &Path,
    ) -> Result<(Vec<AnswerRecord>, RunSummary), BatchError> {
        let started = Instant::now();
        let batches = make_batches(questions, self.batch_size);
        info!(
            questions = questions.len(),
            batches = batches.len(),
            batch_size = self.batch_size,
            output = %output.display(),
            "starting run"
        );

        let mut writer = AnswerWriter::create(output).await?;
        let mut records = Vec::with_capacity(questions.len());
        let mut summary = RunSummary::default();

        for (index, batch) in batches.iter().enumerate() {
            let span = info_span!("batch", batch = index + 1, of = batches.len());
            let batch_records = self.answer_batch(batch).instrument(span).await;

            for record in batch_records {
                writer.write(&record).await?;
                summary.total += 1;
                if record.raw_response.starts_with("Error: ") {
                    summary.errors += 1;
                } else if record.has_answer() {
                    summary.answered += 1;
                }
                records.push(record);
            }
        }

        summary.elapsed = started.elapsed();
        info!(
            total = summary.total,
            answered = summary.answered,
            errors = summary.errors,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            output = %writer.path().display(),
            "run complete"
        );
        Ok((records, summary))
    }

    async fn answer_batch(&self, batch: &[QuestionRecord]) -> Vec<AnswerRecord> {
        let timer = BATCH_DURATION.start_timer();
        let started = Instant::now();
        info!(questions = batch.len(), "processing batch");

        let responses = match self.answerer.answer_batch(batch).await {
            Ok(responses) if responses.len() == batch.len() => responses,
            Ok(responses) => {
                let e = AnswerError::Other(format!(
                    "expected {} responses, got {}",
                    batch.len(),
                    responses.len()
                ));
                return self.fail_batch(batch, &e);
            }
            Err(e) => return self.fail_batch(batch, &e),
        };

        let mut records = Vec::with_capacity(batch.len());
        let (mut ok, mut failed) = (0usize, 0usize);
        for (question, response) in batch.iter().zip(responses) {
            let record = match response {
                Ok(text) => {
                    ok += 1;
                    let letter = extract_answer(&text, &question.options());
                    let status = if letter == super::question::NO_ANSWER {
                        "unanswered"
                    } else {
                        "answered"
                    };
                    QUESTIONS_TOTAL.with_label_values(&[status]).inc();
                    AnswerRecord::answered(question.clone(), text, letter)
                }
                Err(e) => {
                    failed += 1;
                    warn!(id = %question.display_id(), error = %e, "question failed");
                    QUESTIONS_TOTAL.with_label_values(&["error"]).inc();
                    AnswerRecord::failed(question.clone(), &e)
                }
            };
            records.push(record);
        }

        let elapsed = started.elapsed().as_secs_f64();
        timer.observe_duration();
        info!(
            success = ok,
            errors = failed,
            elapsed_secs = elapsed,
            avg_secs = elapsed / batch.len().max(1) as f64,
            "batch complete"
        );
        records
    }

    fn fail_batch(&self, batch: &[QuestionRecord], e: &AnswerError) -> Vec<AnswerRecord> {
        error!(error = %e, questions = batch.len(), "batch failed");
        QUESTIONS_TOTAL
            .with_label_values(&["error"])
            .inc_by(batch.len() as f64);
        batch
            .iter()
            .map(|q| AnswerRecord::failed(q.clone(), e))
            .collect()
    }
}

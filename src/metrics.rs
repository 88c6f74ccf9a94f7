//! Prometheus metrics for batch runs
//!
//! Metrics are registered in the default registry on first use. There is no
//! scrape endpoint: `bioagent classify` dumps `encode_metrics()` to a file at
//! the end of a run when `telemetry.metrics_path` is set.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec,
    CounterVec, Encoder, Gauge, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Batch Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Questions written to the output file, by outcome.
    ///
    /// Labels:
    /// - status: "answered" (letter extracted), "unanswered" (letter X), "error"
    pub static ref QUESTIONS_TOTAL: CounterVec = register_counter_vec!(
        "bioagent_questions_total",
        "Questions processed by outcome",
        &["status"]
    ).expect("failed to register QUESTIONS_TOTAL metric");

    /// Wall time per batch.
    pub static ref BATCH_DURATION: Histogram = register_histogram!(
        "bioagent_batch_duration_seconds",
        "Wall time to answer one batch",
        vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]
    ).expect("failed to register BATCH_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Agent Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Agent runs currently in flight (bounded by model.max_concurrency).
    pub static ref AGENT_RUNS_IN_FLIGHT: Gauge = register_gauge!(
        "bioagent_agent_runs_in_flight",
        "Agent runs currently holding a concurrency permit"
    ).expect("failed to register AGENT_RUNS_IN_FLIGHT metric");

    /// Agent runs by outcome.
    ///
    /// Labels:
    /// - status: "success", "max_turns", "timeout", "error"
    pub static ref AGENT_RUNS: CounterVec = register_counter_vec!(
        "bioagent_agent_runs_total",
        "Agent runs by outcome",
        &["status"]
    ).expect("failed to register AGENT_RUNS metric");

    /// Model turns per agent run.
    pub static ref AGENT_TURNS: Histogram = register_histogram!(
        "bioagent_agent_turns",
        "Model calls per agent run",
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 7.0, 10.0, 15.0]
    ).expect("failed to register AGENT_TURNS metric");

    /// Duration of a single model call.
    ///
    /// Labels:
    /// - model: Served model name
    pub static ref LLM_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "bioagent_llm_call_duration_seconds",
        "Duration of one chat completion call",
        &["model"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).expect("failed to register LLM_CALL_DURATION metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Tool Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Tool invocations requested by the model.
    ///
    /// Labels:
    /// - tool: Tool name (e.g., "search_cbioportal"), or "unknown"
    /// - status: "ok" or "error"
    pub static ref TOOL_CALLS: CounterVec = register_counter_vec!(
        "bioagent_tool_calls_total",
        "Tool calls by tool and status",
        &["tool", "status"]
    ).expect("failed to register TOOL_CALLS metric");

    /// Tool execution time.
    pub static ref TOOL_DURATION: HistogramVec = register_histogram_vec!(
        "bioagent_tool_duration_seconds",
        "Duration of one tool call",
        &["tool"],
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).expect("failed to register TOOL_DURATION metric");

    /// cBioPortal HTTP requests.
    ///
    /// Labels:
    /// - endpoint: Logical endpoint name (e.g., "studies", "mutations")
    /// - status: "ok", "retry", "error"
    pub static ref CBIOPORTAL_REQUESTS: CounterVec = register_counter_vec!(
        "bioagent_cbioportal_requests_total",
        "cBioPortal API requests by endpoint and status",
        &["endpoint", "status"]
    ).expect("failed to register CBIOPORTAL_REQUESTS metric");
}

/// Render all registered metrics in the Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

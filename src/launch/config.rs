//! vLLM container launch settings
//!
//! Every field maps onto a `docker run` flag or a `vllm serve` argument.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VllmServerConfig {
    /// Container image
    pub image: String,
    /// Container name, also used by `stop`
    pub container_name: String,
    /// Hugging Face model id to serve
    pub model: String,
    /// Host port mapped to the server's port 8000
    pub port: u16,
    pub tensor_parallel_size: u32,
    pub gpu_memory_utilization: f32,
    pub max_model_len: Option<u32>,
    pub max_num_seqs: Option<u32>,
    pub max_num_batched_tokens: Option<u32>,
    pub enable_prefix_caching: bool,
    pub enable_chunked_prefill: bool,
    /// Required for `tool_choice: "auto"`
    pub enable_auto_tool_choice: bool,
    pub tool_call_parser: String,
    /// Host directory mounted as the container's Hugging Face cache
    pub hf_cache_dir: Option<PathBuf>,
    /// Forward `HF_TOKEN` from the environment into the container
    pub pass_hf_token: bool,
    /// Appended verbatim after the generated server arguments
    pub extra_args: Vec<String>,
}

impl Default for VllmServerConfig {
    fn default() -> Self {
        Self {
            image: "vllm/vllm-openai:latest".to_string(),
            container_name: "bioagent-vllm".to_string(),
            model: "Qwen/Qwen3-8B".to_string(),
            port: 8000,
            tensor_parallel_size: 1,
            gpu_memory_utilization: 0.90,
            max_model_len: None,
            max_num_seqs: None,
            max_num_batched_tokens: None,
            enable_prefix_caching: true,
            enable_chunked_prefill: true,
            enable_auto_tool_choice: true,
            tool_call_parser: "hermes".to_string(),
            hf_cache_dir: None,
            pass_hf_token: true,
            extra_args: Vec::new(),
        }
    }
}

impl VllmServerConfig {
    /// OpenAI-compatible base URL of the launched server on this host
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}/v1", self.port)
    }
}

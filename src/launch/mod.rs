//! vLLM server launcher
//!
//! Runs the OpenAI-compatible vLLM image under docker with the flags the
//! agent depends on (auto tool choice with the hermes parser), then polls
//! `/v1/models` until the model is loaded.

pub mod config;
pub mod lifecycle;

pub use config::VllmServerConfig;
pub use lifecycle::{docker_args, spawn_server, stop_server, wait_until_ready, LaunchError};

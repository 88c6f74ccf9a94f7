//! Starting, probing and stopping the vLLM container

use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::config::VllmServerConfig;
use crate::config::ModelConfig;
use crate::llm::{ChatClient, ChatError};

/// Port vLLM listens on inside the container
const CONTAINER_PORT: u16 = 8000;

/// Delay between readiness checks
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on a single `/models` request while waiting
const CHECK_TIMEOUT_SECS: u64 = 10;
const CHECK_CONNECT_TIMEOUT_SECS: u64 = 3;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Failed to run docker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("docker {action} exited with {status}")]
    Docker {
        action: &'static str,
        status: std::process::ExitStatus,
    },

    #[error("Failed to build readiness client: {0}")]
    Client(#[from] ChatError),

    #[error("Server at {base_url} not ready after {timeout:?}")]
    NotReady { base_url: String, timeout: Duration },
}

/// Full `docker` argument vector for `docker run`.
///
/// `detach` selects `-d` (background) over `--rm` (foreground, removed on
/// exit).
pub fn docker_args(config: &VllmServerConfig, detach: bool) -> Vec<String> {
    let mut args: Vec<String> = vec!["run".into()];
    args.push(if detach { "-d" } else { "--rm" }.into());
    args.extend([
        "--name".into(),
        config.container_name.clone(),
        "--gpus".into(),
        "all".into(),
        "--ipc=host".into(),
        "-p".into(),
        format!("{}:{}", config.port, CONTAINER_PORT),
    ]);

    if let Some(cache) = &config.hf_cache_dir {
        args.push("-v".into());
        args.push(format!("{}:/root/.cache/huggingface", cache.display()));
    }
    if config.pass_hf_token {
        // Value is taken from the caller's environment by docker
        args.push("-e".into());
        args.push("HF_TOKEN".into());
    }

    args.push(config.image.clone());
    args.extend([
        "--model".into(),
        config.model.clone(),
        "--tensor-parallel-size".into(),
        config.tensor_parallel_size.to_string(),
        "--gpu-memory-utilization".into(),
        format!("{:.2}", config.gpu_memory_utilization),
    ]);

    let optional = [
        ("--max-model-len", config.max_model_len),
        ("--max-num-seqs", config.max_num_seqs),
        ("--max-num-batched-tokens", config.max_num_batched_tokens),
    ];
    for (flag, value) in optional {
        if let Some(value) = value {
            args.push(flag.into());
            args.push(value.to_string());
        }
    }

    if config.enable_prefix_caching {
        args.push("--enable-prefix-caching".into());
    }
    if config.enable_chunked_prefill {
        args.push("--enable-chunked-prefill".into());
    }
    if config.enable_auto_tool_choice {
        args.push("--enable-auto-tool-choice".into());
        args.push("--tool-call-parser".into());
        args.push(config.tool_call_parser.clone());
    }

    args.extend(config.extra_args.iter().cloned());
    args
}

/// Start the server container.
///
/// Detached: waits for `docker run -d` to return and yields `None`.
/// Foreground: returns the running `docker` child with inherited output.
pub async fn spawn_server(
    config: &VllmServerConfig,
    foreground: bool,
) -> Result<Option<Child>, LaunchError> {
    let args = docker_args(config, !foreground);
    info!(
        container = %config.container_name,
        model = %config.model,
        tensor_parallel_size = config.tensor_parallel_size,
        port = config.port,
        "starting vLLM server"
    );
    debug!(args = ?args, "docker command");

    let mut command = Command::new("docker");
    command
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    if foreground {
        return Ok(Some(command.spawn()?));
    }

    let status = command.status().await?;
    if !status.success() {
        return Err(LaunchError::Docker {
            action: "run",
            status,
        });
    }
    Ok(None)
}

/// Poll `GET {base_url}/models` until the server answers or `timeout` passes.
///
/// Each check is cut off at the remaining time, so a server that accepts
/// connections but never replies cannot hold the caller past `timeout`.
pub async fn wait_until_ready(base_url: &str, timeout: Duration) -> Result<Vec<String>, LaunchError> {
    let client = ChatClient::from_config(&ModelConfig {
        base_url: base_url.to_string(),
        connect_timeout_secs: CHECK_CONNECT_TIMEOUT_SECS,
        request_timeout_secs: CHECK_TIMEOUT_SECS,
        ..ModelConfig::default()
    })?;
    let started = Instant::now();

    loop {
        let remaining = timeout.saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, client.list_models()).await {
            Ok(Ok(models)) if !models.is_empty() => {
                info!(
                    models = ?models,
                    elapsed_secs = started.elapsed().as_secs(),
                    "vLLM server ready"
                );
                return Ok(models);
            }
            Ok(Ok(_)) => debug!("server up but no models loaded yet"),
            Ok(Err(e)) => debug!(error = %e, "server not ready"),
            Err(_) => debug!("readiness check timed out"),
        }

        if started.elapsed() >= timeout {
            return Err(LaunchError::NotReady {
                base_url: base_url.to_string(),
                timeout,
            });
        }
        tokio::time::sleep(POLL_INTERVAL.min(timeout.saturating_sub(started.elapsed()))).await;
    }
}

/// Remove the server container (`docker rm -f`)
pub async fn stop_server(config: &VllmServerConfig) -> Result<(), LaunchError> {
    let status = Command::new("docker")
        .args(["rm", "-f", config.container_name.as_str()])
        .stdout(Stdio::null())
        .status()
        .await?;

    if !status.success() {
        warn!(container = %config.container_name, "docker rm failed");
        return Err(LaunchError::Docker {
            action: "rm",
            status,
        });
    }
    info!(container = %config.container_name, "vLLM server stopped");
    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use bioagent::batch::{load_questions, AgentAnswerer, Answerer, BatchDriver, DirectAnswerer};
use bioagent::cbioportal::CbioportalClient;
use bioagent::launch::{spawn_server, stop_server, wait_until_ready};
use bioagent::llm::ChatClient;
use bioagent::tools::protein_expression;
use bioagent::{metrics, telemetry, AgentConfig, AgentController, AppConfig, ToolRegistry};

#[derive(Parser)]
#[command(name = "bioagent", version, about = "Tool-assisted multiple-choice answering over a vLLM server")]
struct Cli {
    /// Config file (TOML/YAML/JSON); defaults to ./bioagent.* when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer every question in a file
    Classify(ClassifyArgs),
    /// Start the vLLM server container
    Serve(ServeArgs),
    /// Remove the vLLM server container
    Stop,
    /// Run one cBioPortal lookup and print the report
    Lookup(LookupArgs),
    /// List models served by the configured endpoint
    Models,
}

#[derive(Args)]
struct ClassifyArgs {
    #[arg(short, long)]
    input: Option<PathBuf>,
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long)]
    batch_size: Option<usize>,
    /// One completion per question, no tools
    #[arg(long)]
    direct: bool,
    #[arg(long)]
    max_concurrency: Option<usize>,
    #[arg(long)]
    enable_biorxiv: bool,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    tensor_parallel_size: Option<u32>,
    /// Keep docker attached instead of detaching
    #[arg(long)]
    foreground: bool,
    /// Wait this long for the server to load the model (0 = don't wait)
    #[arg(long, default_value_t = 900)]
    wait_secs: u64,
}

#[derive(Args)]
struct LookupArgs {
    /// Comma-separated HUGO symbols
    #[arg(long, value_delimiter = ',', required = true)]
    genes: Vec<String>,
    #[arg(long)]
    cancer: String,
    /// Print only the protein expression view
    #[arg(long)]
    proteins_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    telemetry::init_tracing(
        "bioagent",
        &config.telemetry.log_filter,
        config.telemetry.otlp_endpoint.as_deref(),
    )
    .map_err(|e| anyhow::anyhow!(e))
    .context("Failed to initialize tracing")?;

    let result = match cli.command {
        Command::Classify(args) => classify(&mut config, args).await,
        Command::Serve(args) => serve(&mut config, args).await,
        Command::Stop => stop_server(&config.server).await.context("Failed to stop server"),
        Command::Lookup(args) => lookup(&config, args).await,
        Command::Models => models(&config).await,
    };

    telemetry::shutdown_tracing();
    result
}

async fn classify(config: &mut AppConfig, args: ClassifyArgs) -> Result<()> {
    if let Some(input) = args.input {
        config.batch.input = input;
    }
    if let Some(output) = args.output {
        config.batch.output = output;
    }
    if let Some(size) = args.batch_size {
        config.batch.batch_size = size;
    }
    if let Some(limit) = args.max_concurrency {
        config.model.max_concurrency = limit;
    }
    if args.direct {
        config.batch.use_agent = false;
    }
    if args.enable_biorxiv {
        config.tools.enable_biorxiv = true;
    }
    config.validate()?;

    if !config.batch.input.exists() {
        warn!(input = %config.batch.input.display(), "input file not found, nothing to answer");
        return Ok(());
    }
    let questions = load_questions(&config.batch.input)?;

    let client = ChatClient::from_config(&config.model).context("Failed to build model client")?;
    let model = client
        .resolve_model(config.model.model.as_deref())
        .await
        .with_context(|| format!("No model available at {}", client.base_url()))?;
    info!(%model, agent = config.batch.use_agent, questions = questions.len(), "model resolved");

    let answerer: Arc<dyn Answerer> = if config.batch.use_agent {
        let cbioportal = Arc::new(
            CbioportalClient::from_config(&config.cbioportal)
                .context("Failed to build cBioPortal client")?,
        );
        let tools = ToolRegistry::from_config(&config.tools, cbioportal);
        info!(tools = ?tools.names(), "agent tools enabled");
        let controller = AgentController::new(
            Arc::new(client),
            tools,
            AgentConfig::from_model_config(&config.model, model),
        );
        Arc::new(AgentAnswerer::new(Arc::new(controller), config.model.max_concurrency))
    } else {
        Arc::new(DirectAnswerer::new(Arc::new(client), model, config.model.direct_sampling()))
    };

    let driver = BatchDriver::new(answerer, config.batch.batch_size);
    let (_, summary) = driver.run(&questions, &config.batch.output).await?;
    println!(
        "Answered {}/{} questions ({} errors) in {:.1}s -> {}",
        summary.answered,
        summary.total,
        summary.errors,
        summary.elapsed.as_secs_f64(),
        config.batch.output.display()
    );

    if let Some(path) = &config.telemetry.metrics_path {
        tokio::fs::write(path, metrics::encode_metrics())
            .await
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }
    Ok(())
}

async fn serve(config: &mut AppConfig, args: ServeArgs) -> Result<()> {
    if let Some(model) = args.model {
        config.server.model = model;
    }
    if let Some(tp) = args.tensor_parallel_size {
        config.server.tensor_parallel_size = tp;
    }

    let child = spawn_server(&config.server, args.foreground)
        .await
        .context("Failed to start vLLM server")?;

    if args.wait_secs > 0 {
        let base_url = config.server.base_url();
        let models = wait_until_ready(&base_url, Duration::from_secs(args.wait_secs)).await?;
        println!("Serving {} at {}", models.join(", "), base_url);
    }

    if let Some(mut child) = child {
        let status = child.wait().await.context("vLLM server process failed")?;
        info!(%status, "vLLM server exited");
    }
    Ok(())
}

async fn lookup(config: &AppConfig, args: LookupArgs) -> Result<()> {
    let client = CbioportalClient::from_config(&config.cbioportal)
        .context("Failed to build cBioPortal client")?;
    let report = client.search(&args.genes, &args.cancer).await?;

    let json = if args.proteins_only {
        serde_json::to_string_pretty(&protein_expression::project(&report))?
    } else {
        report.to_json_pretty()?
    };
    println!("{}", json);
    Ok(())
}

async fn models(config: &AppConfig) -> Result<()> {
    let client = ChatClient::from_config(&config.model)?;
    let models = client
        .list_models()
        .await
        .with_context(|| format!("Failed to list models at {}", client.base_url()))?;
    for model in models {
        println!("{}", model);
    }
    Ok(())
}

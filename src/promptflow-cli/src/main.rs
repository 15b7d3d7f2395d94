//! promptflow - run a demo dialogue in the terminal.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use promptflow_cli::terminal::{self, LatestMenu};
use promptflow_cli::{Demo, DemoGraph};
use promptflow_core::{
    ChannelRegistry, DialogueError, EngineConfig, MemoryChannel, PageSymbols, PromptRunner,
    Record,
};

/// How long to wait for the last messages to be printed.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Run a promptflow demo dialogue over stdin/stdout
#[derive(Parser)]
#[command(name = "promptflow")]
#[command(about = "Run a promptflow demo dialogue in the terminal")]
#[command(version)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Responder id typed lines are sent as
    #[arg(short, long, default_value = "user")]
    user: String,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Dialogue to run
    #[arg(value_enum)]
    demo: Demo,
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("Invalid environment override")
}

async fn run(args: Args) -> anyhow::Result<Result<Record, DialogueError>> {
    let config = load_config(args.config.as_ref())?;
    let DemoGraph { graph, root } = args.demo.build(&config)?;
    let symbols = PageSymbols {
        previous: config.menu.previous_symbol.clone(),
        next: config.menu.next_symbol.clone(),
    };

    let channel = MemoryChannel::new("terminal");
    let outbox = channel.outbox().context("Terminal outbox already taken")?;
    let latest_menu = LatestMenu::default();

    let printer = tokio::spawn(terminal::forward_outbox(
        outbox,
        tokio::io::stdout(),
        symbols.clone(),
        latest_menu.clone(),
    ));
    let input = tokio::spawn(terminal::feed_input(
        terminal::spawn_stdin_reader(),
        channel.clone(),
        args.user.clone(),
        symbols,
        latest_menu,
    ));

    let runner = PromptRunner::new(Arc::new(graph))
        .with_config(&config)
        .with_registry(ChannelRegistry::new());
    info!("Running {:?} demo as {}", args.demo, args.user);
    let result = runner
        .run(root, Arc::new(channel.clone()), Record::new(args.user))
        .await;

    input.abort();
    drop(channel);
    match tokio::time::timeout(FLUSH_TIMEOUT, printer).await {
        Ok(Ok(Err(e))) => error!("Failed to write output: {}", e),
        Ok(Err(e)) => error!("Output task failed: {}", e),
        Ok(Ok(Ok(()))) | Err(_) => {}
    }

    Ok(result)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    setup_logging(&args.log_level, args.json_logs);

    match run(args).await {
        Ok(Ok(data)) => {
            info!(
                "Dialogue complete: {}",
                serde_json::to_string(data.fields()).unwrap_or_default()
            );
            ExitCode::SUCCESS
        }
        Ok(Err(e)) if e.is_expected() => {
            info!("{}", e);
            ExitCode::from(1)
        }
        Ok(Err(e)) => {
            error!("Dialogue failed: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use stepbridge::{build_broker, init_logging, shutdown_signal, BrokerConfig, LogOptions};

/// StepBridge - serial command broker for six-axis stepper controllers
#[derive(Parser, Debug)]
#[command(name = "stepbridge")]
#[command(version)]
#[command(about = "Forwards host commands to a motion controller over serial")]
struct Args {
    /// Broker configuration (.toml or .json)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Append logs to this file instead of stdout
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&LogOptions {
        verbose: args.verbose,
        json: args.json,
        log_file: args.log_file.clone(),
    })?;

    let config = BrokerConfig::load_from_file(&args.config)
        .with_context(|| format!("loading configuration {}", args.config.display()))
        .inspect_err(|e| tracing::error!("{:#}", e))?;

    tracing::info!(
        version = stepbridge::VERSION,
        host = %config.host.port,
        device = %config.device.port,
        "Starting broker"
    );

    let broker = build_broker(&config)?;
    broker.run(shutdown_signal()).await?;
    Ok(())
}

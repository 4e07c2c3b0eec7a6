//! # StepBridge
//!
//! A serial command broker between a host controller and a six-axis stepper
//! motion controller. The host speaks a one-line ASCII protocol; the broker
//! validates each command, acknowledges it immediately, converts degree moves
//! into steps, and forwards it to the device. Device responses are relayed
//! back to the host untouched. Both serial links are reopened together after
//! any transport fault.
//!
//! ## Architecture
//!
//! 1. **stepbridge-core** - Axis registry, unit conversion, command grammar, errors
//! 2. **stepbridge-communication** - Serial links, link manager, forwarding engine
//! 3. **stepbridge-settings** - Startup configuration
//! 4. **stepbridge** - Binary wiring, logging and signal handling

use anyhow::Context;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

pub use stepbridge_communication::{Broker, LinkParams, LinkRole, SerialOpener};
pub use stepbridge_core::{AxisRegistry, Command, Error, Result};
pub use stepbridge_settings::BrokerConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logging options from the command line
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Log at DEBUG instead of INFO
    pub verbose: bool,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
    /// Append to this file instead of stdout
    pub log_file: Option<PathBuf>,
}

/// Initialize logging
///
/// Sets up structured logging with:
/// - RUST_LOG environment variable support (INFO by default)
/// - Console output, or an append-only log file
/// - Optional JSON formatting
pub fn init_logging(options: &LogOptions) -> anyhow::Result<()> {
    use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let level = if options.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let writer = match &options.log_file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating log directory {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    if options.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(options.log_file.is_none())
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_line_number(true),
            )
            .try_init()?;
    }

    Ok(())
}

/// Serial parameters for one side of the broker
pub fn link_params(config: &BrokerConfig, role: LinkRole) -> LinkParams {
    let port = match role {
        LinkRole::Host => &config.host,
        LinkRole::Device => &config.device,
    };
    LinkParams::new(role, &port.port)
        .with_baud_rate(port.baud_rate)
        .with_timeout(config.timeout())
}

/// Build a broker over the configured serial ports
pub fn build_broker(config: &BrokerConfig) -> anyhow::Result<Broker> {
    let axes = config.axis_registry().context("building axis registry")?;
    let opener = SerialOpener::new(
        link_params(config, LinkRole::Host),
        link_params(config, LinkRole::Device),
    );
    Ok(Broker::new(opener, axes, config.reconnect_backoff()))
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

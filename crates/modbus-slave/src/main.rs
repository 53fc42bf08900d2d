//! Modbus TCP slave, entry point.
//!
//! Serves Modbus TCP connections with the loopback protocol stack (every
//! request is echoed), which makes it a link checker for masters and a
//! harness for the connection lifecycle: accept, supervision, I/O tracing
//! and ordered shutdown on Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! modbus-slave [OPTIONS]
//!
//! Options:
//!   --config   <FILE>   TOML configuration file [default: modbus-slave.toml]
//!   --bind     <ADDR>   Override tcp.bind_address
//!   --port     <PORT>   Override tcp.port
//!   --framing  <MODE>   Override tcp.framing (mbap | encapsulated)
//!   --log-path <PATH>   Override tcp.log_path (file or directory)
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable               | Description                                  |
//! |------------------------|----------------------------------------------|
//! | `MODBUS_SLAVE_CONFIG`  | Configuration file path                      |
//! | `MODBUS_SLAVE_PORT`    | Listening port                               |
//! | `RUST_LOG`             | `tracing` filter, wins over `logging.level`  |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use modbus_slave::application::loopback::LoopbackStack;
use modbus_slave::infrastructure::storage::config::{load_config, AppConfig, TcpFraming};
use modbus_slave::{ListenerService, SlaveService};

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FramingArg {
    Mbap,
    Encapsulated,
}

impl From<FramingArg> for TcpFraming {
    fn from(arg: FramingArg) -> Self {
        match arg {
            FramingArg::Mbap => TcpFraming::Mbap,
            FramingArg::Encapsulated => TcpFraming::Encapsulated,
        }
    }
}

/// Modbus TCP slave.
#[derive(Debug, Parser)]
#[command(
    name = "modbus-slave",
    about = "Multi-connection Modbus TCP slave with I/O tracing",
    version
)]
struct Cli {
    /// TOML configuration file.  A missing file means built-in defaults.
    #[arg(long, default_value = "modbus-slave.toml", env = "MODBUS_SLAVE_CONFIG")]
    config: PathBuf,

    /// IP address to listen on.
    #[arg(long)]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "MODBUS_SLAVE_PORT")]
    port: Option<u16>,

    /// Framing of the TCP stream.
    #[arg(long, value_enum)]
    framing: Option<FramingArg>,

    /// I/O log file or directory.
    #[arg(long)]
    log_path: Option<PathBuf>,
}

impl Cli {
    /// Command-line values win over the file.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(bind) = &self.bind {
            config.tcp.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            config.tcp.port = port;
        }
        if let Some(framing) = self.framing {
            config.tcp.framing = framing.into();
        }
        if let Some(path) = &self.log_path {
            config.tcp.log_path = Some(path.clone());
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    cli.apply(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    let slave_config = config
        .tcp
        .to_slave_config()
        .context("invalid [tcp] configuration")?;
    let service = Arc::new(ListenerService::new(slave_config, Arc::new(LoopbackStack)));

    // Ctrl+C is awaited on a small runtime of its own; the slave itself is
    // thread based and blocks this thread in `start()`.
    let stopper = Arc::clone(&service);
    std::thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("failed to build signal runtime: {e}");
                    return;
                }
            };
            match runtime.block_on(tokio::signal::ctrl_c()) {
                Ok(()) => {
                    info!("received Ctrl+C, shutting down");
                    stopper.stop();
                }
                Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
            }
        })
        .context("failed to spawn signal thread")?;

    service.start().context("Modbus TCP slave failed to start")?;

    info!("Modbus TCP slave stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

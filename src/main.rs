//! notebook-mcp - Entry Point
//!
//! This is the main entry point for the MCP server binary.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use notebook_mcp::engine::{ExecutionConfig, NbconvertEngine};
use notebook_mcp::server::{self, ServerConfig};
use notebook_mcp::system;

/// notebook-mcp - Jupyter notebook tools for AI agents over MCP.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Per-cell execution timeout in seconds
    #[arg(long, default_value_t = 600)]
    timeout: u64,

    /// Seconds to wait for the kernel to start
    #[arg(long, default_value_t = 60)]
    startup_timeout: u64,

    /// Jupyter launcher used to run nbconvert
    #[arg(long, default_value = "jupyter")]
    jupyter: String,

    /// Kernel to execute with (defaults to the notebook's kernelspec)
    #[arg(long)]
    kernel: Option<String>,

    /// Downscale image outputs so neither edge exceeds this many pixels
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    image_max_size: Option<u32>,

    /// Do not take an advisory lock on notebooks while they are modified
    #[arg(long, default_value = "false")]
    no_lock: bool,

    /// Skip execution engine checks
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let mut execution = ExecutionConfig::new()
            .with_jupyter_command(&self.jupyter)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_startup_timeout(Duration::from_secs(self.startup_timeout));
        if let Some(kernel) = &self.kernel {
            execution = execution.with_kernel_name(kernel);
        }

        let mut config = ServerConfig::new()
            .with_execution(execution)
            .with_locking(!self.no_lock);
        if let Some(max_size) = self.image_max_size {
            config = config.with_image_max_size(max_size);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // MCP requires that logs go to stderr (stdout is for JSON-RPC)
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    info!("notebook-mcp v{}", env!("CARGO_PKG_VERSION"));

    let config = args.server_config();

    if args.skip_checks {
        warn!("Skipping execution engine checks (--skip-checks)");
    } else {
        info!("Checking execution engine...");

        match system::check_all(&config.execution) {
            Ok(reqs) => {
                info!(
                    "Execution engine ready: nbconvert {}, kernels: {}",
                    reqs.nbconvert_version,
                    if reqs.kernels.is_empty() {
                        "unknown".to_string()
                    } else {
                        reqs.kernels.join(", ")
                    }
                );
            }
            Err(e) => {
                error!("Execution engine check failed");
                return Err(e.into());
            }
        }
    }

    let engine = Arc::new(NbconvertEngine::new(config.execution.clone()));
    server::run(config, engine).await.into_diagnostic()
}

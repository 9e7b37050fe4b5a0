//! Link shaping CLI
//!
//! Installs a delay/bandwidth shaping rule for one source port and replays an
//! optional bandwidth trace, inline or in a child process.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use trace_shaper::{
    ChildProcess, CommandExecutor, DryRunExecutor, ExecutionMode, LinkConfig, LinkOverrides,
    SessionController, ShellExecutor,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Delay of the link in milliseconds, 0 disables shaping [default: 10]
    #[arg(short, long)]
    delay: Option<u64>,

    /// Static bandwidth of the link in mbit/s
    #[arg(short, long)]
    bandwidth: Option<f64>,

    /// Token bucket burst in bytes [default: 20000]
    #[arg(long)]
    burst: Option<u32>,

    /// Bandwidth trace, one "<offset-seconds> <mbit>" pair per line
    #[arg(short, long)]
    trace: Option<PathBuf>,

    /// Source port to limit traffic on [default: 6212]
    #[arg(short, long)]
    port: Option<u16>,

    /// Skip setup and only replay the trace
    #[arg(short, long)]
    skip: bool,

    /// Interface to shape [default: lo]
    #[arg(long)]
    iface: Option<String>,

    /// Path to the tc binary [default: /sbin/tc]
    #[arg(long)]
    tc: Option<PathBuf>,

    /// JSON file with link settings; flags take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Replay the trace in a child process
    #[arg(long)]
    isolated: bool,

    /// Log tc commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> LinkOverrides {
        LinkOverrides {
            delay_ms: self.delay,
            bandwidth_mbit: self.bandwidth,
            burst_bytes: self.burst,
            port: self.port,
            trace_path: self.trace.clone(),
            interface: self.iface.clone(),
            tc_path: self.tc.clone(),
        }
    }

    /// Flags a schedule child inherits besides the link settings.
    fn forwarded_flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.dry_run {
            flags.push("--dry-run");
        }
        if self.verbose {
            flags.push("--verbose");
        }
        flags
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let base = match &cli.config {
        Some(path) => LinkConfig::from_file(path)?,
        None => LinkConfig::default(),
    };
    let config = base.with_overrides(cli.overrides());

    let executor: Arc<dyn CommandExecutor> = if cli.dry_run {
        Arc::new(DryRunExecutor)
    } else {
        Arc::new(ShellExecutor)
    };

    let mut session = SessionController::new(config, executor, cli.skip)?;

    let mode = if cli.isolated {
        ExecutionMode::Isolated(ChildProcess::current_exe()?.with_args(cli.forwarded_flags()))
    } else {
        ExecutionMode::Inline
    };
    session.run(&mode).await?;

    Ok(())
}

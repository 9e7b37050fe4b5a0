//! Qdisc management for traffic control
//!
//! Shaping uses a fixed hierarchy on the interface root:
//!
//! ```text
//! 1: prio
//! └── 1:3 → 30: tbf (rate, latency, burst)
//!     ↑ u32 filter on the configured source port
//! ```
//!
//! The first application installs the whole chain; later applications only
//! change the tbf rate. Commands are fire-and-forget: a failing `tc` is
//! logged and otherwise ignored.

use crate::config::LinkConfig;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A single `tc` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl TcCommand {
    fn new<I, S>(program: &Path, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_path_buf(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for TcCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Best-effort effector for `tc` commands.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command: &TcCommand);
}

/// Runs commands on the host and waits for them to exit.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExecutor;

impl CommandExecutor for ShellExecutor {
    fn execute(&self, command: &TcCommand) {
        info!("> {}", command);
        match Command::new(&command.program).args(&command.args).status() {
            Ok(status) if !status.success() => {
                warn!("`{}` exited with {}", command, status);
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to run `{}`: {}", command, e),
        }
    }
}

/// Logs commands without running them.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunExecutor;

impl CommandExecutor for DryRunExecutor {
    fn execute(&self, command: &TcCommand) {
        info!("> {} (dry run)", command);
    }
}

/// Builds the `tc` commands for one interface and port.
#[derive(Debug, Clone)]
pub struct QdiscManager {
    tc_path: PathBuf,
    interface: String,
    delay: Duration,
    burst_bytes: u32,
    port: u16,
}

impl QdiscManager {
    pub fn new(config: &LinkConfig, delay: Duration) -> Self {
        Self {
            tc_path: config.tc_path.clone(),
            interface: config.interface.clone(),
            delay,
            burst_bytes: config.burst_bytes,
            port: config.port,
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// `qdisc del dev <iface> root`
    pub fn delete_root(&self) -> TcCommand {
        self.tc(["qdisc", "del", "dev", self.interface.as_str(), "root"])
    }

    /// `qdisc add dev <iface> root handle 1: prio`
    pub fn add_root_prio(&self) -> TcCommand {
        self.tc([
            "qdisc", "add", "dev", self.interface.as_str(), "root", "handle", "1:", "prio",
        ])
    }

    /// Token bucket on band 3 of the prio root; `change` keeps the qdisc and
    /// only updates its parameters.
    pub fn tbf(&self, change: bool, bandwidth_mbit: f64) -> TcCommand {
        let action = if change { "change" } else { "add" };
        let rate = format!("{:.3}mbit", bandwidth_mbit);
        let latency = format!("{}ms", self.delay.as_millis());
        let burst = self.burst_bytes.to_string();
        self.tc([
            "qdisc", action, "dev", self.interface.as_str(), "parent", "1:3", "handle", "30:", "tbf",
            "rate", rate.as_str(), "latency", latency.as_str(), "burst", burst.as_str(),
        ])
    }

    /// Steer outbound traffic from the shaped source port into band 3.
    pub fn add_port_filter(&self) -> TcCommand {
        let port = self.port.to_string();
        self.tc([
            "filter", "add", "dev", self.interface.as_str(), "protocol", "ip", "parent", "1:0", "prio",
            "3", "u32", "match", "ip", "sport", port.as_str(), "0xffff", "flowid", "1:3",
        ])
    }

    fn tc<const N: usize>(&self, args: [&str; N]) -> TcCommand {
        TcCommand::new(&self.tc_path, args)
    }
}

/// Issues shaping commands, installing the qdisc chain on first use and
/// changing the rate afterwards.
pub struct ConditionApplier {
    qdisc: QdiscManager,
    executor: Arc<dyn CommandExecutor>,
    first_application: bool,
}

impl fmt::Debug for ConditionApplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionApplier")
            .field("qdisc", &self.qdisc)
            .field("first_application", &self.first_application)
            .finish_non_exhaustive()
    }
}

impl ConditionApplier {
    pub fn new(qdisc: QdiscManager, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            qdisc,
            executor,
            first_application: true,
        }
    }

    /// Treat the qdisc chain as already installed by someone else, so every
    /// application is a rate change.
    pub fn assume_installed(mut self) -> Self {
        self.first_application = false;
        self
    }

    pub fn is_first_application(&self) -> bool {
        self.first_application
    }

    /// Remove whatever is installed on the interface root.
    pub fn reset(&self) {
        self.executor.execute(&self.qdisc.delete_root());
    }

    pub fn apply(&mut self, bandwidth_mbit: f64) {
        if !self.first_application {
            self.executor.execute(&self.qdisc.tbf(true, bandwidth_mbit));
            return;
        }

        info!(
            "Installing shaping on {}: {:.3} mbit/s",
            self.qdisc.interface(),
            bandwidth_mbit
        );
        self.executor.execute(&self.qdisc.add_root_prio());
        self.executor.execute(&self.qdisc.tbf(false, bandwidth_mbit));
        self.executor.execute(&self.qdisc.add_port_filter());
        self.first_application = false;
    }
}

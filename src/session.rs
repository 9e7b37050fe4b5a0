//! Shaping session lifecycle
//!
//! A session installs a baseline shaping rule when it is created and then
//! replays the bandwidth trace when it is run, either in this process or in
//! a child process started from the same executable.

use crate::config::LinkConfig;
use crate::errors::{Error, Result};
use crate::qdisc::{CommandExecutor, ConditionApplier, QdiscManager};
use crate::schedule::ScheduleRunner;
use crate::trace::{self, TraceEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing applied; a session that never shapes stays here.
    Uninitialized,
    BaselineApplied,
    ScheduleRunning,
    Completed,
}

/// Trace and applier of a session that shapes its link.
#[derive(Debug)]
pub struct ShapingPlan {
    pub trace: Vec<TraceEvent>,
    pub applier: Mutex<ConditionApplier>,
}

/// Strategy for where the trace is replayed.
#[async_trait]
pub trait ScheduleDriver: Send + Sync {
    async fn drive(&self, config: &LinkConfig, plan: &ShapingPlan) -> Result<()>;
}

/// Replays the trace on the current task.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcess;

#[async_trait]
impl ScheduleDriver for InProcess {
    async fn drive(&self, _config: &LinkConfig, plan: &ShapingPlan) -> Result<()> {
        ScheduleRunner::run(&plan.trace, &plan.applier).await;
        Ok(())
    }
}

/// Re-runs the program with `--skip` and waits for it to exit.
#[derive(Debug, Clone)]
pub struct ChildProcess {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl ChildProcess {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Launcher for the running executable.
    pub fn current_exe() -> Result<Self> {
        Ok(Self::new(std::env::current_exe().map_err(Error::Spawn)?))
    }

    /// Flags appended after the reconstructed configuration.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl ScheduleDriver for ChildProcess {
    async fn drive(&self, config: &LinkConfig, _plan: &ShapingPlan) -> Result<()> {
        let args = config.to_args(true);
        info!(
            "Running schedule in child: {} {} {}",
            self.program.display(),
            args.join(" "),
            self.extra_args.join(" ")
        );

        let status = Command::new(&self.program)
            .args(&args)
            .args(&self.extra_args)
            .status()
            .await
            .map_err(Error::Spawn)?;

        if !status.success() {
            return Err(Error::ChildFailed(status));
        }
        debug!("Schedule child exited with {}", status);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum ExecutionMode {
    Inline,
    Isolated(ChildProcess),
}

impl ExecutionMode {
    pub fn driver(&self) -> &dyn ScheduleDriver {
        match self {
            ExecutionMode::Inline => &InProcess,
            ExecutionMode::Isolated(child) => child,
        }
    }
}

#[derive(Debug)]
pub struct SessionController {
    config: LinkConfig,
    plan: Option<ShapingPlan>,
    state: SessionState,
}

impl SessionController {
    /// Prepare a session and, unless `skip_setup` is set, install the
    /// baseline rule right away.
    ///
    /// The trace is loaded before anything is sent to `tc`, so a malformed
    /// trace leaves the interface untouched. With `skip_setup` the rules are
    /// assumed to be installed already and every trace event is a rate
    /// change.
    pub fn new(
        config: LinkConfig,
        executor: Arc<dyn CommandExecutor>,
        skip_setup: bool,
    ) -> Result<Self> {
        let delay = match config.delay {
            Some(delay) if config.shapes_link() => delay,
            _ => {
                info!(
                    "No delay with bandwidth or trace configured, leaving {} untouched",
                    config.interface
                );
                return Ok(Self {
                    config,
                    plan: None,
                    state: SessionState::Uninitialized,
                });
            }
        };

        let trace = trace::load_optional(config.trace_path.as_deref())?;
        let mut applier = ConditionApplier::new(QdiscManager::new(&config, delay), executor);

        if skip_setup {
            debug!("Skipping setup, {} trace events to replay", trace.len());
            return Ok(Self {
                config,
                plan: Some(ShapingPlan {
                    trace,
                    applier: Mutex::new(applier.assume_installed()),
                }),
                state: SessionState::BaselineApplied,
            });
        }

        let baseline = match trace.first() {
            Some(event) => event.bandwidth_mbit,
            None => config
                .bandwidth_mbit
                .filter(|bw| *bw > 0.0)
                .ok_or_else(|| {
                    Error::InvalidConfig("trace is empty and no bandwidth is set".to_string())
                })?,
        };

        applier.reset();
        applier.apply(baseline);
        info!(
            "Baseline applied on {}: {:.3} mbit/s, {}ms delay",
            config.interface,
            baseline,
            config.delay_ms()
        );

        Ok(Self {
            config,
            plan: Some(ShapingPlan {
                trace,
                applier: Mutex::new(applier),
            }),
            state: SessionState::BaselineApplied,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Events that `run` will replay; empty for an inert session.
    pub fn trace(&self) -> &[TraceEvent] {
        match &self.plan {
            Some(plan) => &plan.trace,
            None => &[],
        }
    }

    /// Replay the trace in the given execution mode and wait for it to end.
    pub async fn run(&mut self, mode: &ExecutionMode) -> Result<()> {
        self.run_with(mode.driver()).await
    }

    pub async fn run_with(&mut self, driver: &dyn ScheduleDriver) -> Result<()> {
        let Some(plan) = &self.plan else {
            debug!("Session does not shape the link, nothing to run");
            return Ok(());
        };

        self.state = SessionState::ScheduleRunning;
        driver.drive(&self.config, plan).await?;
        self.state = SessionState::Completed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingExecutor;
    use std::time::Duration;

    fn config(delay_ms: Option<u64>, bandwidth_mbit: Option<f64>) -> LinkConfig {
        LinkConfig {
            delay: delay_ms.map(Duration::from_millis),
            bandwidth_mbit,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_static_bandwidth_baseline_only() {
        let recorder = Arc::new(RecordingExecutor::default());
        let mut session =
            SessionController::new(config(Some(10), Some(5.0)), recorder.clone(), false).unwrap();

        assert_eq!(session.state(), SessionState::BaselineApplied);
        let commands = recorder.rendered();
        assert_eq!(commands.len(), 4);
        assert_eq!(commands[0], "/sbin/tc qdisc del dev lo root");
        assert!(commands[2].contains("tbf rate 5.000mbit latency 10ms burst 20000"));

        session.run(&ExecutionMode::Inline).await.unwrap();
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(recorder.len(), 4);
    }

    #[tokio::test]
    async fn test_no_delay_means_no_commands() {
        let recorder = Arc::new(RecordingExecutor::default());
        let mut session =
            SessionController::new(config(None, Some(5.0)), recorder.clone(), false).unwrap();

        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(session.trace().is_empty());
        session.run(&ExecutionMode::Inline).await.unwrap();
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_delay_without_rate_is_inert() {
        let recorder = Arc::new(RecordingExecutor::default());
        let session = SessionController::new(config(Some(10), None), recorder.clone(), false).unwrap();
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(recorder.is_empty());
    }

    #[tokio::test]
    async fn test_skip_setup_issues_nothing_up_front() {
        let recorder = Arc::new(RecordingExecutor::default());
        let mut session =
            SessionController::new(config(Some(10), Some(5.0)), recorder.clone(), true).unwrap();

        assert_eq!(session.state(), SessionState::BaselineApplied);
        assert!(recorder.is_empty());
        session.run(&ExecutionMode::Inline).await.unwrap();
        assert!(recorder.is_empty());
    }

    struct CountingDriver(Mutex<usize>);

    #[async_trait]
    impl ScheduleDriver for CountingDriver {
        async fn drive(&self, config: &LinkConfig, plan: &ShapingPlan) -> Result<()> {
            assert_eq!(config.bandwidth_mbit, Some(5.0));
            assert!(!plan.applier.lock().is_first_application());
            *self.0.lock() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_custom_driver_receives_plan() {
        let recorder = Arc::new(RecordingExecutor::default());
        let mut session =
            SessionController::new(config(Some(10), Some(5.0)), recorder, false).unwrap();
        let driver = CountingDriver(Mutex::new(0));

        session.run_with(&driver).await.unwrap();
        assert_eq!(*driver.0.lock(), 1);
        assert_eq!(session.state(), SessionState::Completed);
    }

    #[test]
    fn test_execution_mode_drivers() {
        let child = ChildProcess::new("/usr/bin/trace-shaper").with_args(["--dry-run"]);
        assert_eq!(child.extra_args, ["--dry-run"]);
        let mode = ExecutionMode::Isolated(child);
        let _driver: &dyn ScheduleDriver = mode.driver();
        let inline = ExecutionMode::Inline;
        let _driver: &dyn ScheduleDriver = inline.driver();
    }
}

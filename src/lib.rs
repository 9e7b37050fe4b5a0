//! Trace-driven link shaping
//!
//! This crate drives `tc` to emulate a link with a fixed delay and a
//! bandwidth that is either static or replayed from a trace file:
//! - `prio` root with a `tbf` child and a `u32` source-port filter
//! - one install per session, rate changes afterwards
//! - trace events timed against a single start instant
//! - optional replay in a child process of the same executable

pub mod config;
pub mod errors;
pub mod qdisc;
pub mod schedule;
pub mod session;
pub mod testing;
pub mod trace;

pub use config::{LinkConfig, LinkOverrides};
pub use errors::{Error, Result, TraceError};
pub use qdisc::{
    CommandExecutor, ConditionApplier, DryRunExecutor, QdiscManager, ShellExecutor, TcCommand,
};
pub use schedule::ScheduleRunner;
pub use session::{
    ChildProcess, ExecutionMode, InProcess, ScheduleDriver, SessionController, SessionState,
    ShapingPlan,
};
pub use trace::TraceEvent;

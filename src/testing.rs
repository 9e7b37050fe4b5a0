//! Test doubles for driving sessions without touching the host's qdiscs

use crate::qdisc::{CommandExecutor, TcCommand};
use parking_lot::Mutex;
use tokio::time::Instant;

/// Records every command together with the (tokio) time it was issued.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    issued: Mutex<Vec<(Instant, TcCommand)>>,
}

impl RecordingExecutor {
    pub fn commands(&self) -> Vec<TcCommand> {
        self.issued.lock().iter().map(|(_, cmd)| cmd.clone()).collect()
    }

    /// Commands rendered as shell text
    pub fn rendered(&self) -> Vec<String> {
        self.issued
            .lock()
            .iter()
            .map(|(_, cmd)| cmd.to_string())
            .collect()
    }

    pub fn timeline(&self) -> Vec<(Instant, TcCommand)> {
        self.issued.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.issued.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.lock().is_empty()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn execute(&self, command: &TcCommand) {
        self.issued.lock().push((Instant::now(), command.clone()));
    }
}

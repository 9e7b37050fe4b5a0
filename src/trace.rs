//! Bandwidth trace loading
//!
//! A trace file holds one event per line: an offset in seconds from the
//! start of the session and a bandwidth in mbit/s, separated by spaces or
//! tabs. Blank lines are ignored. Events keep file order; offsets are not
//! required to be increasing.

use crate::errors::TraceError;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// One scheduled bandwidth change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceEvent {
    pub offset_secs: f64,
    pub bandwidth_mbit: f64,
}

impl TraceEvent {
    pub fn new(offset_secs: f64, bandwidth_mbit: f64) -> Self {
        Self {
            offset_secs,
            bandwidth_mbit,
        }
    }

    /// Offset from the schedule start. Negative offsets fire immediately;
    /// offsets too large for a `Duration` saturate to `Duration::MAX`.
    pub fn offset(&self) -> Duration {
        match Duration::try_from_secs_f64(self.offset_secs) {
            Ok(offset) => offset,
            Err(_) if self.offset_secs > 0.0 => Duration::MAX,
            Err(_) => Duration::ZERO,
        }
    }
}

/// Load a trace file.
pub fn load(path: &Path) -> Result<Vec<TraceEvent>, TraceError> {
    let content = std::fs::read_to_string(path).map_err(|source| TraceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let trace = parse(&content)?;
    debug!("Loaded {} trace events from {}", trace.len(), path.display());
    Ok(trace)
}

/// Load the configured trace, or an empty one when there is none.
pub fn load_optional(path: Option<&Path>) -> Result<Vec<TraceEvent>, TraceError> {
    match path {
        Some(path) => load(path),
        None => Ok(Vec::new()),
    }
}

/// Parse trace text. Fails on the first malformed line.
pub fn parse(content: &str) -> Result<Vec<TraceEvent>, TraceError> {
    let mut trace = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let mut fields = line.split_whitespace();
        let Some(first) = fields.next() else {
            continue;
        };
        let (Some(second), None) = (fields.next(), fields.next()) else {
            return Err(TraceError::Format {
                line: line_no,
                reason: format!("expected 2 fields, got {:?}", line.trim()),
            });
        };
        let offset_secs = parse_field(first, line_no)?;
        if offset_secs > 0.0 && Duration::try_from_secs_f64(offset_secs).is_err() {
            return Err(TraceError::Format {
                line: line_no,
                reason: format!("offset {first:?} is out of range"),
            });
        }
        trace.push(TraceEvent::new(offset_secs, parse_field(second, line_no)?));
    }
    Ok(trace)
}

fn parse_field(field: &str, line: usize) -> Result<f64, TraceError> {
    match field.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(TraceError::Format {
            line,
            reason: format!("{field:?} is not a finite number"),
        }),
    }
}

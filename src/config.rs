//! Link shaping configuration
//!
//! A [`LinkConfig`] starts from the built-in defaults, is overlaid with an
//! optional JSON config file and then with command-line flags. Each layer is
//! a [`LinkOverrides`] where every field is optional.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DELAY_MS: u64 = 10;
pub const DEFAULT_BURST_BYTES: u32 = 20_000;
pub const DEFAULT_PORT: u16 = 6212;
pub const DEFAULT_INTERFACE: &str = "lo";
pub const DEFAULT_TC_PATH: &str = "/sbin/tc";

/// Baseline shaping parameters for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// Latency budget of the token bucket. `None` disables shaping.
    pub delay: Option<Duration>,
    /// Static rate in mbit/s, used when no trace is given.
    pub bandwidth_mbit: Option<f64>,
    /// Token bucket burst in bytes
    pub burst_bytes: u32,
    /// Source port whose outbound traffic is shaped
    pub port: u16,
    /// Bandwidth trace replayed over the session
    pub trace_path: Option<PathBuf>,
    pub interface: String,
    pub tc_path: PathBuf,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            delay: Some(Duration::from_millis(DEFAULT_DELAY_MS)),
            bandwidth_mbit: None,
            burst_bytes: DEFAULT_BURST_BYTES,
            port: DEFAULT_PORT,
            trace_path: None,
            interface: DEFAULT_INTERFACE.to_string(),
            tc_path: PathBuf::from(DEFAULT_TC_PATH),
        }
    }
}

/// Partial configuration, as found in a config file or on the command line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkOverrides {
    /// Delay in milliseconds; `0` clears the delay.
    pub delay_ms: Option<u64>,
    pub bandwidth_mbit: Option<f64>,
    pub burst_bytes: Option<u32>,
    pub port: Option<u16>,
    pub trace_path: Option<PathBuf>,
    pub interface: Option<String>,
    pub tc_path: Option<PathBuf>,
}

impl LinkOverrides {
    /// Read overrides from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl LinkConfig {
    /// Defaults overlaid with the overrides read from `path`.
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::default().with_overrides(LinkOverrides::from_file(path)?))
    }

    /// Apply every field that is set in `overrides`.
    pub fn with_overrides(mut self, overrides: LinkOverrides) -> Self {
        if let Some(ms) = overrides.delay_ms {
            self.delay = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(bw) = overrides.bandwidth_mbit {
            self.bandwidth_mbit = Some(bw);
        }
        if let Some(burst) = overrides.burst_bytes {
            self.burst_bytes = burst;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(path) = overrides.trace_path {
            self.trace_path = Some(path);
        }
        if let Some(iface) = overrides.interface {
            self.interface = iface;
        }
        if let Some(tc) = overrides.tc_path {
            self.tc_path = tc;
        }
        self
    }

    /// Whether this configuration shapes the link at all: a non-zero delay
    /// plus either a positive static bandwidth or a trace.
    pub fn shapes_link(&self) -> bool {
        let has_delay = self.delay.is_some_and(|d| !d.is_zero());
        let has_rate =
            self.bandwidth_mbit.is_some_and(|bw| bw > 0.0) || self.trace_path.is_some();
        has_delay && has_rate
    }

    /// Delay in whole milliseconds, `0` when unset.
    pub fn delay_ms(&self) -> u64 {
        self.delay
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    /// Command-line flags that rebuild this configuration in another process.
    ///
    /// The delay is always emitted so the receiving side's default cannot
    /// reintroduce one.
    pub fn to_args(&self, skip_setup: bool) -> Vec<String> {
        // `--flag=value` keeps values such as negative numbers from being
        // read as flags by the receiving parser.
        let mut args = Vec::new();
        if skip_setup {
            args.push("--skip".to_string());
        }
        args.push(format!("--delay={}", self.delay_ms()));
        if let Some(bw) = self.bandwidth_mbit {
            args.push(format!("--bandwidth={}", bw));
        }
        if let Some(path) = &self.trace_path {
            args.push(format!("--trace={}", path.to_string_lossy()));
        }
        args.extend([
            format!("--burst={}", self.burst_bytes),
            format!("--port={}", self.port),
            format!("--iface={}", self.interface),
            format!("--tc={}", self.tc_path.to_string_lossy()),
        ]);
        args
    }
}

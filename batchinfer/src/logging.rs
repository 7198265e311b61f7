//! Stderr logging scoped to graph stages and nodes.
//!
//! Every line names the lifecycle stage that emitted it (`init`, `build`,
//! `forward`, ...) and, when the message concerns a single operator, the node
//! name and op type:
//!
//! ```text
//! 10:42:07 [ERROR] forward relu (nn.ReLU) -- output 0 has the wrong shape
//! ```
//!
//! Filtering is controlled by `BATCHINFER_TRACE` (`basic`/`1` or `full`).
use std::env;
use std::fmt::Arguments;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TraceLevel {
    Off,
    Basic,
    Full,
}

const TRACE_ENV: &str = "BATCHINFER_TRACE";

static TRACE_LEVEL: OnceLock<TraceLevel> = OnceLock::new();

pub(crate) fn parse_trace_level(value: &str) -> TraceLevel {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "basic" => TraceLevel::Basic,
        "2" | "full" => TraceLevel::Full,
        _ => TraceLevel::Off,
    }
}

pub(crate) fn trace_level() -> TraceLevel {
    *TRACE_LEVEL.get_or_init(|| {
        env::var(TRACE_ENV)
            .ok()
            .as_deref()
            .map(parse_trace_level)
            .unwrap_or(TraceLevel::Off)
    })
}

/// Message severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Trace,
    Warning,
    Error,
    Critical,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Severity::Trace => "34",
            Severity::Warning => "33",
            Severity::Error => "91",
            Severity::Critical => "31",
        }
    }

    /// Critical lines always print; warnings need `full`.
    fn enabled(self, level: TraceLevel) -> bool {
        match self {
            Severity::Critical => true,
            Severity::Warning => level == TraceLevel::Full,
            Severity::Trace | Severity::Error => level != TraceLevel::Off,
        }
    }
}

/// Operator a log line is about.
#[derive(Clone, Copy, Debug)]
pub struct NodeScope<'a> {
    pub name: &'a str,
    pub op_type: &'a str,
}

impl<'a> NodeScope<'a> {
    pub fn new(name: &'a str, op_type: &'a str) -> Self {
        Self { name, op_type }
    }
}

fn timestamp_hms() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        % 86_400;
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3_600,
        (secs % 3_600) / 60,
        secs % 60
    )
}

/// Render a line without the timestamp.
pub fn format_line(
    severity: Severity,
    stage: &str,
    node: Option<NodeScope<'_>>,
    args: Arguments,
) -> String {
    let scope = match node {
        Some(node) => format!("{} {} ({})", stage, node.name, node.op_type),
        None => stage.to_string(),
    };
    format!(
        "[\u{001b}[{}m{}\u{001b}[0m] {} -- {}",
        severity.color(),
        severity.label(),
        scope,
        args
    )
}

/// Write one line to stderr if `severity` passes the `BATCHINFER_TRACE` filter.
pub fn emit(severity: Severity, stage: &str, node: Option<NodeScope<'_>>, args: Arguments) {
    if severity.enabled(trace_level()) {
        eprintln!("{} {}", timestamp_hms(), format_line(severity, stage, node, args));
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __emit {
    ($severity:ident, $stage:ident, node = $node:expr, $($arg:tt)*) => {
        $crate::logging::emit(
            $crate::logging::Severity::$severity,
            stringify!($stage),
            Some($crate::logging::NodeScope::new($node.name(), $node.op_type())),
            format_args!($($arg)*),
        )
    };
    ($severity:ident, $stage:ident, $($arg:tt)*) => {
        $crate::logging::emit(
            $crate::logging::Severity::$severity,
            stringify!($stage),
            None,
            format_args!($($arg)*),
        )
    };
}

/// `warning!(stage, [node = n,] "fmt", args..)`
#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => { $crate::__emit!(Warning, $($arg)*) };
}

/// `error!(stage, [node = n,] "fmt", args..)`
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => { $crate::__emit!(Error, $($arg)*) };
}

/// `critical!(stage, [node = n,] "fmt", args..)`; never filtered.
#[macro_export]
macro_rules! critical {
    ($($arg:tt)*) => { $crate::__emit!(Critical, $($arg)*) };
}

/// `trace!(stage, [node = n,] "fmt", args..)`
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => { $crate::__emit!(Trace, $($arg)*) };
}

/// Unfiltered stdout line, used for debug-mode trace events.
#[macro_export]
macro_rules! log {
    ($($arg:tt)*) => {
        println!($($arg)*)
    };
}

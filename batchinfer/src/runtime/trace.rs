use std::time::Duration;

use serde::Serialize;

/// Timing record for one executed node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub index: usize,
    pub node: String,
    pub op_type: String,
    pub batch: usize,
    #[serde(skip)]
    pub micros: String,
    #[serde(rename = "micros")]
    pub micros_parts: [u64; 3],
}

impl TraceEvent {
    pub(crate) fn new(
        index: usize,
        node: &str,
        op_type: &str,
        batch: usize,
        elapsed: Duration,
    ) -> Self {
        let (micros, micros_parts) = format_duration(elapsed);
        Self {
            index,
            node: node.to_string(),
            op_type: op_type.to_string(),
            batch,
            micros,
            micros_parts,
        }
    }
}

fn format_duration(duration: Duration) -> (String, [u64; 3]) {
    let total_ns = duration.as_nanos();
    let ms = (total_ns / 1_000_000) as u64;
    let us = ((total_ns / 1_000) % 1_000) as u64;
    let ns = (total_ns % 1_000) as u64;
    (format!("{ms}ms {us}us {ns}ns"), [ms, us, ns])
}

pub(crate) fn log_trace_event(event: &TraceEvent) {
    crate::log!(
        "{} [{}] -- {} -- ({})",
        event.index,
        event.op_type,
        event.node,
        event.micros
    );
}

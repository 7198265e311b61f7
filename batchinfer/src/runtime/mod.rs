mod config;
mod trace;

pub use config::GraphConfig;
pub use trace::TraceEvent;
pub(crate) use trace::log_trace_event;

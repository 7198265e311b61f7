use std::env;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::logging::{parse_trace_level, TraceLevel};

const THREADS_ENV: &str = "BATCHINFER_THREADS";
const TRACE_ENV: &str = "BATCHINFER_TRACE";

/// Runtime knobs for a [`RuntimeGraph`](crate::RuntimeGraph).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Size of a dedicated rayon pool; `None` uses the global pool.
    pub threads: Option<usize>,
    /// Record trace events on every forward, not only debug ones.
    pub trace: bool,
}

impl GraphConfig {
    pub fn from_env() -> Result<Self> {
        let threads = match env::var(THREADS_ENV) {
            Ok(raw) => Some(parse_threads(&raw)?),
            Err(_) => None,
        };
        let trace = env::var(TRACE_ENV)
            .map(|raw| parse_trace_level(&raw) != TraceLevel::Off)
            .unwrap_or(false);
        Ok(Self { threads, trace })
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).with_context(|| "parse graph config json")?;
        if config.threads == Some(0) {
            return Err(anyhow!("graph config `threads` must be at least 1"));
        }
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("read graph config {}", path.display()))?;
        Self::from_json_str(&text)
    }

    pub(crate) fn build_pool(&self) -> Result<Option<ThreadPool>> {
        match self.threads {
            Some(threads) => ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map(Some)
                .map_err(|err| anyhow!("failed to build graph threadpool: {}", err)),
            None => Ok(None),
        }
    }
}

fn parse_threads(raw: &str) -> Result<usize> {
    let threads = raw
        .trim()
        .parse::<usize>()
        .with_context(|| format!("invalid {} value {}", THREADS_ENV, raw))?;
    if threads == 0 {
        return Err(anyhow!("{} must be at least 1", THREADS_ENV));
    }
    Ok(threads)
}

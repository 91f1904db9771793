//! JSON output structures for the ferrosplice CLI

use crate::display::SendSummary;
use ferrosplice_config::Config;
use ferrosplice_types::{Result, TransferStats};
use ferrosplice_zerocopy::SpliceEngine;
use serde::{Deserialize, Serialize};

/// JSON output for `send`
#[derive(Debug, Serialize, Deserialize)]
pub struct SendResultJson {
    /// ferrosplice version
    pub version: String,
    /// File that was sent
    pub file: String,
    /// Remote address
    pub destination: String,
    /// Bytes delivered
    pub bytes: u64,
    /// Whether the splice path carried the bytes
    pub spliced: bool,
    /// Unused part of the byte limit
    pub remaining: Option<i64>,
    /// Duration in milliseconds
    pub elapsed_ms: u64,
    /// Throughput in MB/s
    pub throughput_mbps: f64,
    /// Engine counters
    pub stats: TransferStats,
}

impl SendResultJson {
    /// Build the JSON view of a finished send
    pub fn new(summary: &SendSummary, stats: TransferStats) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            file: summary.file.display().to_string(),
            destination: summary.destination.clone(),
            bytes: summary.bytes,
            spliced: summary.spliced,
            remaining: summary.remaining,
            elapsed_ms: summary.elapsed.as_millis() as u64,
            throughput_mbps: summary.throughput_mbps(),
            stats,
        }
    }
}

/// JSON output for `probe`
#[derive(Debug, Serialize, Deserialize)]
pub struct ProbeResultJson {
    /// Whether transfers can use splice with this configuration
    pub splice_available: bool,
    /// Capacity the kernel granted the probe pipe
    pub pipe_capacity: Option<usize>,
    /// Pipe size requested by the configuration
    pub requested_pipe_size: Option<usize>,
    /// Configured chunk ceiling
    pub max_chunk: usize,
    /// Why the engine could not be built
    pub error: Option<String>,
}

impl ProbeResultJson {
    /// Describe the outcome of building an engine from `config`
    pub fn new(config: &Config, engine: &Result<SpliceEngine>) -> Self {
        let pipe_capacity = engine.as_ref().ok().and_then(SpliceEngine::pipe_capacity);
        Self {
            splice_available: pipe_capacity.is_some(),
            pipe_capacity,
            requested_pipe_size: config.splice.pipe_size.map(|size| size.get()),
            max_chunk: config.splice.max_chunk.get(),
            error: engine.as_ref().err().map(ToString::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrosplice_types::Error;

    #[test]
    fn test_probe_reports_engine_error() {
        let config = Config::default();
        let probe = ProbeResultJson::new(&config, &Err(Error::config("too big")));

        assert!(!probe.splice_available);
        assert!(probe.pipe_capacity.is_none());
        assert!(probe.error.unwrap().contains("too big"));
    }

    #[test]
    fn test_send_result_serializes_stats() {
        let summary = SendSummary {
            file: "payload.bin".into(),
            destination: "127.0.0.1:9000".to_string(),
            bytes: 4096,
            spliced: true,
            remaining: Some(0),
            elapsed: std::time::Duration::from_millis(8),
        };
        let json = serde_json::to_string(&SendResultJson::new(&summary, TransferStats::new())).unwrap();

        assert!(json.contains("\"bytes\":4096"));
        assert!(json.contains("\"bytes_spliced\":0"));
    }
}

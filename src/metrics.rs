//! Operation timing
//!
//! `instrumented` wraps a unit of work, returns its result untouched and
//! records how long it took in a [`MetricsSink`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

pub trait MetricsSink: Send + Sync {
    fn record(&self, operation: &str, elapsed: Duration);
}

/// Discards every measurement.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _operation: &str, _elapsed: Duration) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationStats {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

/// Aggregates timings per operation name in memory.
#[derive(Default)]
pub struct InMemoryMetrics {
    stats: Mutex<HashMap<String, OperationStats>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, operation: &str) -> Option<OperationStats> {
        self.stats.lock().ok()?.get(operation).copied()
    }

    /// Snapshot sorted by operation name.
    pub fn snapshot(&self) -> Vec<(String, OperationStats)> {
        let mut entries: Vec<_> = match self.stats.lock() {
            Ok(stats) => stats.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            Err(_) => Vec::new(),
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record(&self, operation: &str, elapsed: Duration) {
        if let Ok(mut stats) = self.stats.lock() {
            let entry = stats.entry(operation.to_string()).or_default();
            entry.count += 1;
            entry.total += elapsed;
            entry.max = entry.max.max(elapsed);
        }
    }
}

pub async fn instrumented<F, T>(sink: &dyn MetricsSink, operation: &str, work: F) -> T
where
    F: Future<Output = T>,
{
    let started = Instant::now();
    let output = work.await;
    let elapsed = started.elapsed();
    debug!("⏱️  {} took {:?}", operation, elapsed);
    sink.record(operation, elapsed);
    output
}

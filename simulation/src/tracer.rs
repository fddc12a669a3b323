use std::time::Duration;

use common::storage::types::conversation::LatencySummary;
use tracing::debug;

/// Collects per-turn response latencies for one simulated conversation.
#[derive(Debug, Default, Clone)]
pub struct SimulationTracer {
    samples_ms: Vec<u64>,
}

impl SimulationTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_turn(&mut self, turn_index: u32, latency: Duration) {
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        debug!(turn_index, latency_ms, "Recorded turn latency");
        self.samples_ms.push(latency_ms);
    }

    pub fn turn_count(&self) -> usize {
        self.samples_ms.len()
    }

    pub fn summary(&self) -> LatencySummary {
        let mut sorted = self.samples_ms.clone();
        sorted.sort_unstable();

        let (Some(&min_ms), Some(&max_ms)) = (sorted.first(), sorted.last()) else {
            return LatencySummary::default();
        };

        #[allow(clippy::cast_precision_loss)]
        let mean_ms = sorted.iter().map(|&ms| ms as f64).sum::<f64>() / sorted.len() as f64;

        LatencySummary {
            turn_count: sorted.len(),
            mean_ms: (mean_ms * 10.0).round() / 10.0,
            min_ms,
            max_ms,
            p50_ms: percentile(&sorted, 50),
            p95_ms: percentile(&sorted, 95),
        }
    }
}

/// Nearest-rank percentile over an ascending, non-empty slice.
fn percentile(sorted: &[u64], pct: usize) -> u64 {
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted
        .get(rank.saturating_sub(1))
        .or_else(|| sorted.last())
        .copied()
        .unwrap_or_default()
}

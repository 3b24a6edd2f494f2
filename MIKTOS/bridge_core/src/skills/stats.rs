use std::{collections::VecDeque, time::Duration};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
struct Sample {
    success: bool,
    millis: f64,
}

#[derive(Debug, Clone, Default)]
struct SkillStats {
    executions: u64,
    samples: VecDeque<Sample>,
}

/// Point-in-time statistics for one skill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SkillStatsSnapshot {
    /// Executions since startup.
    pub executions: u64,
    /// Samples in the rolling window.
    pub window_len: usize,
    /// Successful share of the window; `1.0` before the first sample.
    pub success_rate: f64,
    /// Mean execution time over the window.
    pub mean_execution_ms: f64,
}

impl Default for SkillStatsSnapshot {
    fn default() -> Self {
        Self {
            executions: 0,
            window_len: 0,
            success_rate: 1.0,
            mean_execution_ms: 0.0,
        }
    }
}

/// Rolling success rate and mean latency per skill.
#[derive(Debug)]
pub struct StatsBook {
    window: usize,
    entries: Mutex<IndexMap<String, SkillStats>>,
}

impl StatsBook {
    /// Keeps the last `window` samples per skill.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// Samples kept per skill.
    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }

    /// Records one execution.
    pub fn record(&self, skill: &str, success: bool, elapsed: Duration) {
        let mut entries = self.entries.lock();
        let stats = entries.entry(skill.to_string()).or_default();
        stats.executions += 1;
        if stats.samples.len() == self.window {
            stats.samples.pop_front();
        }
        stats.samples.push_back(Sample {
            success,
            millis: elapsed.as_secs_f64() * 1000.0,
        });
    }

    /// Statistics for `skill`; defaults when it never ran.
    #[must_use]
    pub fn snapshot(&self, skill: &str) -> SkillStatsSnapshot {
        self.entries
            .lock()
            .get(skill)
            .map(summarize)
            .unwrap_or_default()
    }

    /// Statistics for every skill that ran.
    #[must_use]
    pub fn snapshot_all(&self) -> IndexMap<String, SkillStatsSnapshot> {
        self.entries
            .lock()
            .iter()
            .map(|(name, stats)| (name.clone(), summarize(stats)))
            .collect()
    }
}

impl Default for StatsBook {
    fn default() -> Self {
        Self::new(50)
    }
}

#[allow(clippy::cast_precision_loss)]
fn summarize(stats: &SkillStats) -> SkillStatsSnapshot {
    let len = stats.samples.len();
    if len == 0 {
        return SkillStatsSnapshot {
            executions: stats.executions,
            ..SkillStatsSnapshot::default()
        };
    }
    let successes = stats.samples.iter().filter(|sample| sample.success).count();
    let total_ms: f64 = stats.samples.iter().map(|sample| sample.millis).sum();
    SkillStatsSnapshot {
        executions: stats.executions,
        window_len: len,
        success_rate: successes as f64 / len as f64,
        mean_execution_ms: total_ms / len as f64,
    }
}

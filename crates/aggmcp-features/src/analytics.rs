//! Analytics (spec §4.8): per-tool call counts, moving-average latency,
//! first/last-used timestamps and error counts; per-workspace roll-up;
//! "unused tool" identification for an optional, off-by-default
//! auto-disable policy.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Default "unused" threshold (spec §4.8: "no call within a configurable
/// threshold, default 30 days").
pub const DEFAULT_UNUSED_THRESHOLD_DAYS: i64 = 30;

/// Smoothing factor for the exponential moving average of latency.
/// Chosen so recent calls dominate without one outlier call swinging the
/// average to match it exactly.
const EMA_ALPHA: f64 = 0.2;

#[derive(Debug, Clone, Serialize)]
pub struct ToolAnalytics {
    pub count: u64,
    pub error_count: u64,
    pub first_used: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub moving_avg_latency_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkspaceRollup {
    pub call_count: u64,
    pub error_count: u64,
}

/// In-memory analytics accumulator. Policy (auto-disable) is a knob
/// consulted by the caller; this component only computes the facts.
pub struct Analytics {
    per_tool: Mutex<HashMap<String, ToolAnalytics>>,
    per_workspace: Mutex<HashMap<String, WorkspaceRollup>>,
}

impl Default for Analytics {
    fn default() -> Self {
        Self::new()
    }
}

impl Analytics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            per_tool: Mutex::new(HashMap::new()),
            per_workspace: Mutex::new(HashMap::new()),
        }
    }

    /// Record one call: `tool_key` is the namespaced tool name,
    /// `latency_ms` is `None` when the caller has no timing to report
    /// (spec §4.8: "updates moving-average latency (when supplied)").
    pub fn record_call(&self, tool_key: &str, workspace_id: &str, latency_ms: Option<f64>, is_error: bool) {
        let now = Utc::now();
        {
            let mut per_tool = self.per_tool.lock();
            let entry = per_tool.entry(tool_key.to_owned()).or_insert_with(|| ToolAnalytics {
                count: 0,
                error_count: 0,
                first_used: now,
                last_used: now,
                moving_avg_latency_ms: 0.0,
            });
            entry.count += 1;
            entry.last_used = now;
            if is_error {
                entry.error_count += 1;
            }
            if let Some(latency) = latency_ms {
                entry.moving_avg_latency_ms = if entry.count == 1 {
                    latency
                } else {
                    EMA_ALPHA * latency + (1.0 - EMA_ALPHA) * entry.moving_avg_latency_ms
                };
            }
        }
        {
            let mut per_workspace = self.per_workspace.lock();
            let rollup = per_workspace.entry(workspace_id.to_owned()).or_default();
            rollup.call_count += 1;
            if is_error {
                rollup.error_count += 1;
            }
        }
    }

    #[must_use]
    pub fn tool_analytics(&self, tool_key: &str) -> Option<ToolAnalytics> {
        self.per_tool.lock().get(tool_key).cloned()
    }

    #[must_use]
    pub fn workspace_rollup(&self, workspace_id: &str) -> WorkspaceRollup {
        self.per_workspace.lock().get(workspace_id).cloned().unwrap_or_default()
    }

    /// Every namespaced tool, as a snapshot, for the `/analytics`
    /// diagnostic endpoint.
    #[must_use]
    pub fn all_tools(&self) -> HashMap<String, ToolAnalytics> {
        self.per_tool.lock().clone()
    }

    /// Tools with no call in the last `threshold_days` days, among the
    /// currently-advertised set `advertised_tool_keys` (so a tool that was
    /// never called at all — no analytics entry to begin with — also
    /// counts as unused).
    #[must_use]
    pub fn unused_tools(&self, advertised_tool_keys: &[String], threshold_days: i64) -> Vec<String> {
        let per_tool = self.per_tool.lock();
        let cutoff = Utc::now() - chrono::Duration::days(threshold_days);
        advertised_tool_keys
            .iter()
            .filter(|key| match per_tool.get(*key) {
                Some(analytics) => analytics.last_used < cutoff,
                None => true,
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_seeds_moving_average_to_its_own_latency() {
        let analytics = Analytics::new();
        analytics.record_call("server-git::git_status", "ws-1", Some(100.0), false);
        let entry = analytics.tool_analytics("server-git::git_status").unwrap();
        assert_eq!(entry.moving_avg_latency_ms, 100.0);
        assert_eq!(entry.count, 1);
    }

    #[test]
    fn subsequent_calls_blend_into_the_average() {
        let analytics = Analytics::new();
        analytics.record_call("t", "ws", Some(100.0), false);
        analytics.record_call("t", "ws", Some(200.0), false);
        let entry = analytics.tool_analytics("t").unwrap();
        assert!(entry.moving_avg_latency_ms > 100.0 && entry.moving_avg_latency_ms < 200.0);
    }

    #[test]
    fn missing_latency_does_not_perturb_the_average() {
        let analytics = Analytics::new();
        analytics.record_call("t", "ws", Some(100.0), false);
        analytics.record_call("t", "ws", None, false);
        let entry = analytics.tool_analytics("t").unwrap();
        assert_eq!(entry.moving_avg_latency_ms, 100.0);
        assert_eq!(entry.count, 2);
    }

    #[test]
    fn error_calls_increment_both_tool_and_workspace_error_counts() {
        let analytics = Analytics::new();
        analytics.record_call("t", "ws", Some(1.0), true);
        assert_eq!(analytics.tool_analytics("t").unwrap().error_count, 1);
        assert_eq!(analytics.workspace_rollup("ws").error_count, 1);
    }

    #[test]
    fn never_called_tool_is_unused() {
        let analytics = Analytics::new();
        let unused = analytics.unused_tools(&["server-git::git_status".to_owned()], DEFAULT_UNUSED_THRESHOLD_DAYS);
        assert_eq!(unused, vec!["server-git::git_status".to_owned()]);
    }

    #[test]
    fn recently_called_tool_is_not_unused() {
        let analytics = Analytics::new();
        analytics.record_call("server-git::git_status", "ws", Some(1.0), false);
        let unused = analytics.unused_tools(&["server-git::git_status".to_owned()], DEFAULT_UNUSED_THRESHOLD_DAYS);
        assert!(unused.is_empty());
    }
}

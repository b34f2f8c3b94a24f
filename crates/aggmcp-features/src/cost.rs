//! Cost Tracker (spec §4.8): per-backend-tool and per-workspace token/cost
//! accumulators, a today's-usage accumulator that rolls into a bounded
//! history at day boundaries, and periodic dirty-flagged persistence.

use std::collections::HashMap;

use chrono::Utc;
#[cfg(test)]
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Characters-per-token used for the size-based fallback estimate when a
/// tool has no entry in [`STATIC_TOKEN_TABLE`] (spec §4.8: "≈4 characters
/// per token").
const CHARS_PER_TOKEN: f64 = 4.0;

/// Baseline per-call token estimate for a handful of well-known tool
/// shapes; anything else falls back to the size-based estimate.
const STATIC_TOKEN_TABLE: &[(&str, u64)] = &[
    ("read_file", 500),
    ("list_projects", 200),
    ("search_code", 800),
    ("git_status", 150),
    ("git_commit", 100),
];

/// Rough cost per 1000 tokens in USD, used only for the estimated-cost
/// figure surfaced on diagnostics endpoints — not billed anywhere.
const ESTIMATED_COST_PER_1K_TOKENS: f64 = 0.003;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct UsageAccumulator {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub estimated_cost: f64,
}

impl UsageAccumulator {
    fn add(&mut self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
        let total = input_tokens + output_tokens;
        self.total_tokens += total;
        self.estimated_cost += total as f64 / 1000.0 * ESTIMATED_COST_PER_1K_TOKENS;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HistoryDay {
    date: String,
    usage: UsageAccumulator,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistedState {
    per_tool: HashMap<String, UsageAccumulator>,
    per_workspace: HashMap<String, UsageAccumulator>,
    today: UsageAccumulator,
    today_date: Option<String>,
    history: Vec<HistoryDay>,
}

/// Estimate input/output token counts for one call. Splits the static
/// baseline 60/40 between input and output when a table entry exists;
/// otherwise estimates purely from argument/result text length.
#[must_use]
pub fn estimate_tokens(tool_name: &str, argument_chars: usize, result_chars: usize) -> (u64, u64) {
    if let Some((_, baseline)) = STATIC_TOKEN_TABLE.iter().find(|(name, _)| *name == tool_name) {
        let input = (*baseline as f64 * 0.6) as u64;
        let output = baseline - input;
        return (input, output);
    }
    let input = (argument_chars as f64 / CHARS_PER_TOKEN).ceil() as u64;
    let output = (result_chars as f64 / CHARS_PER_TOKEN).ceil() as u64;
    (input.max(1), output.max(1))
}

/// Bounded history length (spec §3: "bounded (≤30 entries) history").
pub const MAX_HISTORY_DAYS: usize = 30;

pub struct CostTracker {
    state: Mutex<PersistedState>,
    dirty: std::sync::atomic::AtomicBool,
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CostTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PersistedState::default()),
            dirty: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Record one tool call's usage against the per-tool, per-workspace
    /// and today accumulators, rolling yesterday into bounded history if
    /// the day has turned over since the last record.
    pub fn record(&self, backend_tool_key: &str, workspace_id: &str, input_tokens: u64, output_tokens: u64) {
        let today = Utc::now().date_naive().to_string();
        let mut state = self.state.lock();
        roll_day_if_needed(&mut state, &today);

        state.per_tool.entry(backend_tool_key.to_owned()).or_default().add(input_tokens, output_tokens);
        state.per_workspace.entry(workspace_id.to_owned()).or_default().add(input_tokens, output_tokens);
        state.today.add(input_tokens, output_tokens);
        self.dirty.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    #[must_use]
    pub fn usage_for_tool(&self, backend_tool_key: &str) -> UsageAccumulator {
        self.state.lock().per_tool.get(backend_tool_key).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn usage_for_workspace(&self, workspace_id: &str) -> UsageAccumulator {
        self.state.lock().per_workspace.get(workspace_id).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn today_usage(&self) -> UsageAccumulator {
        self.state.lock().today
    }

    #[must_use]
    pub fn total_usage(&self) -> UsageAccumulator {
        let state = self.state.lock();
        let mut total = UsageAccumulator::default();
        for usage in state.per_workspace.values() {
            total.add(usage.input_tokens, usage.output_tokens);
        }
        total
    }

    /// Serialize the whole tracked state for persistence, clearing the
    /// dirty flag. Returns `None` if nothing changed since the last
    /// flush, so the caller can skip an unnecessary disk write (spec
    /// §4.8: "persists to disk every 30 s if dirty").
    pub fn flush_if_dirty(&self) -> Option<String> {
        if !self.dirty.swap(false, std::sync::atomic::Ordering::Relaxed) {
            return None;
        }
        let state = self.state.lock();
        serde_json::to_string_pretty(&*state).ok()
    }

    /// Restore tracked state from a previously persisted snapshot (used
    /// at startup to resume today's/history accumulators).
    ///
    /// # Errors
    ///
    /// Returns an error if `content` does not parse as persisted state.
    pub fn restore(&self, content: &str) -> Result<(), serde_json::Error> {
        let restored: PersistedState = serde_json::from_str(content)?;
        *self.state.lock() = restored;
        Ok(())
    }
}

fn roll_day_if_needed(state: &mut PersistedState, today: &str) {
    let Some(last_date) = state.today_date.clone() else {
        state.today_date = Some(today.to_owned());
        return;
    };
    if last_date == today {
        return;
    }
    state.history.push(HistoryDay {
        date: last_date,
        usage: state.today,
    });
    if state.history.len() > MAX_HISTORY_DAYS {
        let overflow = state.history.len() - MAX_HISTORY_DAYS;
        state.history.drain(0..overflow);
    }
    state.today = UsageAccumulator::default();
    state.today_date = Some(today.to_owned());
}

/// Parse a `YYYY-MM-DD` day string, used only by tests to construct
/// deterministic rollover scenarios.
#[cfg(test)]
fn naive_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_table_splits_roughly_sixty_forty() {
        let (input, output) = estimate_tokens("read_file", 10, 10);
        assert_eq!(input + output, 500);
        assert_eq!(input, 300);
    }

    #[test]
    fn unknown_tool_estimates_from_character_counts() {
        let (input, output) = estimate_tokens("custom_tool", 400, 40);
        assert_eq!(input, 100);
        assert_eq!(output, 10);
    }

    #[test]
    fn record_accumulates_per_tool_and_per_workspace() {
        let tracker = CostTracker::new();
        tracker.record("server-git::git_status", "ws-1", 100, 50);
        tracker.record("server-git::git_status", "ws-1", 100, 50);
        assert_eq!(tracker.usage_for_tool("server-git::git_status").total_tokens, 300);
        assert_eq!(tracker.usage_for_workspace("ws-1").total_tokens, 300);
    }

    #[test]
    fn flush_is_none_when_not_dirty() {
        let tracker = CostTracker::new();
        assert!(tracker.flush_if_dirty().is_none());
        tracker.record("t", "ws", 10, 10);
        assert!(tracker.flush_if_dirty().is_some());
        assert!(tracker.flush_if_dirty().is_none());
    }

    #[test]
    fn day_rollover_moves_today_into_bounded_history() {
        let mut state = PersistedState {
            today_date: Some("2026-07-27".to_owned()),
            today: UsageAccumulator { input_tokens: 10, output_tokens: 5, total_tokens: 15, estimated_cost: 0.1 },
            ..Default::default()
        };
        roll_day_if_needed(&mut state, "2026-07-28");
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].date, "2026-07-27");
        assert_eq!(state.today, UsageAccumulator::default());
        assert_eq!(state.today_date.as_deref(), Some("2026-07-28"));
    }

    #[test]
    fn history_is_bounded_to_max_days() {
        let mut state = PersistedState::default();
        for day in 0..(MAX_HISTORY_DAYS + 5) {
            let date = naive_date("2026-01-01") + chrono::Duration::days(day as i64);
            roll_day_if_needed(&mut state, &date.to_string());
        }
        assert!(state.history.len() <= MAX_HISTORY_DAYS);
    }
}

//! Durable recovery record written while a session is in flight, and the
//! decision of what to do with it after a reload.

use serde::{Deserialize, Serialize};

use super::state::{TimerMode, TimerState, TimerStatus};

/// Anchors more than this far in the future are treated as corrupt.
const FUTURE_TOLERANCE_MS: i64 = 5_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRecord {
    pub is_running: bool,
    pub mode: TimerMode,
    /// Epoch millis of the session anchor.
    pub start_time: i64,
    pub elapsed: u64,
    pub remaining: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
}

impl RecoveryRecord {
    /// Record for a session that is actively counting; `None` otherwise.
    pub fn from_state(state: &TimerState) -> Option<Self> {
        if state.status != TimerStatus::Running {
            return None;
        }
        Some(Self {
            is_running: true,
            mode: state.mode,
            start_time: state.start_time?,
            elapsed: state.elapsed,
            remaining: state.remaining,
            session_id: state.session_id.clone(),
            task_name: state.task_name.clone(),
        })
    }

    pub fn total_duration(&self) -> u64 {
        self.elapsed.saturating_add(self.remaining)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryPlan {
    /// Still in flight: continue with these recomputed mirrors.
    Resume {
        record: RecoveryRecord,
        elapsed: u64,
        remaining: u64,
    },
    /// Finished while nobody was watching; complete it once with the full
    /// duration as the final elapsed value.
    CompleteWhileAway {
        record: RecoveryRecord,
        elapsed: u64,
    },
    Discard { reason: String },
}

/// Decode a stored record and decide how to continue. Never fails: anything
/// unusable becomes [`RecoveryPlan::Discard`].
pub fn plan_recovery(raw: &str, now_ms: i64) -> RecoveryPlan {
    let record: RecoveryRecord = match serde_json::from_str(raw) {
        Ok(record) => record,
        Err(err) => {
            return RecoveryPlan::Discard {
                reason: format!("malformed recovery record: {err}"),
            }
        }
    };
    plan_for_record(record, now_ms)
}

pub fn plan_for_record(record: RecoveryRecord, now_ms: i64) -> RecoveryPlan {
    if !record.is_running {
        return RecoveryPlan::Discard {
            reason: "recorded session was not running".into(),
        };
    }
    let total = record.total_duration();
    if total == 0 {
        return RecoveryPlan::Discard {
            reason: "recorded session has no duration".into(),
        };
    }
    if record.start_time > now_ms + FUTURE_TOLERANCE_MS {
        return RecoveryPlan::Discard {
            reason: format!(
                "recorded anchor {} is in the future (now {now_ms})",
                record.start_time
            ),
        };
    }

    let since_start = (now_ms - record.start_time).max(0) as u64 / 1000;
    if since_start < total {
        RecoveryPlan::Resume {
            elapsed: since_start,
            remaining: total - since_start,
            record,
        }
    } else {
        RecoveryPlan::CompleteWhileAway {
            elapsed: total,
            record,
        }
    }
}

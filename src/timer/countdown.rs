//! Wall-clock anchored countdown arithmetic.
//!
//! Progress is always recomputed from the anchor; nothing here counts
//! ticks, so late or dropped callbacks never skew the result.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub remaining: u64,
    pub elapsed: u64,
}

impl Progress {
    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    duration_secs: u64,
    anchor_ms: i64,
}

impl Countdown {
    pub fn start(duration_secs: u64, now_ms: i64) -> Self {
        Self {
            duration_secs,
            anchor_ms: now_ms,
        }
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    /// Whole seconds since the anchor, capped at the duration. A clock that
    /// moved backwards reads as zero elapsed.
    pub fn elapsed_secs(&self, now_ms: i64) -> u64 {
        let delta_ms = now_ms.saturating_sub(self.anchor_ms).max(0) as u64;
        (delta_ms / 1000).min(self.duration_secs)
    }

    pub fn progress(&self, now_ms: i64) -> Progress {
        let elapsed = self.elapsed_secs(now_ms);
        Progress {
            remaining: self.duration_secs - elapsed,
            elapsed,
        }
    }
}

/// Format seconds as "MM:SS".
pub fn format_clock(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

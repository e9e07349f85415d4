use serde::{Deserialize, Serialize};

use super::countdown::Countdown;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerMode {
    #[default]
    Focus,
    Short,
    Long,
}

impl TimerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerMode::Focus => "focus",
            TimerMode::Short => "short",
            TimerMode::Long => "long",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "focus" => Some(TimerMode::Focus),
            "short" => Some(TimerMode::Short),
            "long" => Some(TimerMode::Long),
            _ => None,
        }
    }

    pub fn is_break(&self) -> bool {
        !matches!(self, TimerMode::Focus)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
    /// Finished and waiting for the user (or the playlist) to pick what's next.
    Completed,
}

/// Foreground view of the current session.
#[derive(Debug, Clone, Default)]
pub struct TimerState {
    pub status: TimerStatus,
    pub mode: TimerMode,
    pub session_id: Option<String>,
    pub task_name: Option<String>,
    /// Duration the session was started with, in seconds.
    pub duration: u64,
    pub remaining: u64,
    pub elapsed: u64,
    /// Epoch millis such that `now - start_time` is the session's elapsed
    /// time while running. Shifted forward on resume.
    pub start_time: Option<i64>,
    /// Generation of the engine START currently driving this session.
    pub generation: Option<u64>,
    pub show_session_complete: bool,
    pub session_just_completed: bool,
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, TimerStatus::Running | TimerStatus::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.status == TimerStatus::Paused
    }

    pub fn begin_session(
        &mut self,
        session_id: String,
        mode: TimerMode,
        task_name: Option<String>,
        duration: u64,
        now_ms: i64,
        generation: u64,
    ) {
        *self = Self {
            status: TimerStatus::Running,
            mode,
            session_id: Some(session_id),
            task_name,
            duration,
            remaining: duration,
            elapsed: 0,
            start_time: Some(now_ms),
            generation: Some(generation),
            show_session_complete: false,
            session_just_completed: false,
        };
    }

    /// Recompute the mirrors from the session anchor.
    pub fn sync_from_anchor(&mut self, now_ms: i64) {
        if self.status != TimerStatus::Running {
            return;
        }
        if let Some(start_time) = self.start_time {
            let progress = Countdown::start(self.duration, start_time).progress(now_ms);
            self.remaining = progress.remaining;
            self.elapsed = progress.elapsed;
        }
    }

    /// Apply engine-relative progress. After a resume the engine counts
    /// against the shorter remaining duration, so only `remaining` is taken
    /// as-is and `elapsed` is derived from the session total.
    pub fn apply_progress(&mut self, remaining: u64) {
        self.remaining = remaining.min(self.duration);
        self.elapsed = self.duration - self.remaining;
    }

    pub fn pause(&mut self, now_ms: i64) {
        self.sync_from_anchor(now_ms);
        self.status = TimerStatus::Paused;
        self.generation = None;
    }

    pub fn resume(&mut self, now_ms: i64, generation: u64) {
        self.status = TimerStatus::Running;
        self.start_time = Some(now_ms - (self.elapsed as i64) * 1000);
        self.generation = Some(generation);
    }

    pub fn complete(&mut self) {
        self.status = TimerStatus::Completed;
        self.remaining = 0;
        self.elapsed = self.duration;
        self.generation = None;
        self.show_session_complete = true;
        self.session_just_completed = true;
    }

    /// Back to idle, keeping the selected mode.
    pub fn reset(&mut self) {
        let mode = self.mode;
        *self = Self {
            mode,
            ..Self::default()
        };
    }

    /// Idle in `mode`, showing `duration` as the time left.
    pub fn reset_to(&mut self, mode: TimerMode, duration: u64) {
        self.reset();
        self.mode = mode;
        self.duration = duration;
        self.remaining = duration;
    }

    pub fn snapshot(&self, degraded: bool) -> TimerSnapshot {
        TimerSnapshot {
            status: self.status,
            mode: self.mode,
            is_running: self.is_running(),
            is_paused: self.is_paused(),
            remaining: self.remaining,
            elapsed: self.elapsed,
            duration: self.duration,
            start_time: self.start_time,
            session_id: self.session_id.clone(),
            task_name: self.task_name.clone(),
            show_session_complete: self.show_session_complete,
            session_just_completed: self.session_just_completed,
            degraded,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub status: TimerStatus,
    pub mode: TimerMode,
    pub is_running: bool,
    pub is_paused: bool,
    pub remaining: u64,
    pub elapsed: u64,
    pub duration: u64,
    pub start_time: Option<i64>,
    pub session_id: Option<String>,
    pub task_name: Option<String>,
    pub show_session_complete: bool,
    pub session_just_completed: bool,
    /// True when counting falls back to the foreground-only countdown.
    pub degraded: bool,
}

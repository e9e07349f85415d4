//! Experience, level, streak, daily statistics and quest bookkeeping.
//!
//! Everything here is plain data plus deterministic mutations; persistence
//! and serialisation of concurrent callers live in [`super::store`].

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{Clock, TimerMode};

pub const DAILY_STATS_WINDOW: usize = 14;
const LEVEL_XP_SCALE: f64 = 500.0;
const LEVEL_EXPONENT: f64 = 0.6;
const BONUS_THRESHOLD_MINUTES: u64 = 15;
const DEFAULT_WEEKLY_XP_GOAL: u64 = 500;

/// XP for a session of `minutes`: 2 per minute plus 0.1 per minute beyond
/// the first 15, floored. Worked in tenths to stay exact.
pub fn xp_for_session(minutes: u64) -> u64 {
    let tenths = minutes * 20 + minutes.saturating_sub(BONUS_THRESHOLD_MINUTES);
    tenths / 10
}

/// `floor((xp / 500) ^ 0.6 * 10)`
pub fn level_for_xp(total_xp: u64) -> u32 {
    ((total_xp as f64 / LEVEL_XP_SCALE).powf(LEVEL_EXPONENT) * 10.0).floor() as u32
}

/// Total XP at which `level` is reached.
pub fn xp_for_level(level: u32) -> u64 {
    if level == 0 {
        return 0;
    }
    let mut xp = ((level as f64 / 10.0).powf(1.0 / LEVEL_EXPONENT) * LEVEL_XP_SCALE).floor() as u64;
    // float error can land either side of the boundary
    while xp > 0 && level_for_xp(xp - 1) >= level {
        xp -= 1;
    }
    while level_for_xp(xp) < level {
        xp += 1;
    }
    xp
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum QuestStatus {
    Active,
    Completed,
    Claimed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum QuestCadence {
    Daily,
    Weekly,
}

/// What a quest counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum QuestKind {
    /// Completed focus sessions.
    Sessions,
    /// Focus minutes.
    Minutes,
    /// Current day streak.
    Streak,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub description: String,
    pub xp: u64,
    #[serde(rename = "type")]
    pub cadence: QuestCadence,
    pub kind: QuestKind,
    pub status: QuestStatus,
    pub progress: u64,
    pub target: u64,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Quest {
    fn new(
        id: &str,
        title: &str,
        description: &str,
        xp: u64,
        cadence: QuestCadence,
        kind: QuestKind,
        target: u64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            xp,
            cadence,
            kind,
            status: QuestStatus::Active,
            progress: 0,
            target,
            completed_at: None,
        }
    }

    /// Set progress, clamped to the target. Returns true when this call
    /// moved the quest from active to completed. Non-active quests are left
    /// untouched.
    pub fn set_progress(&mut self, progress: u64, at: DateTime<Utc>) -> bool {
        if self.status != QuestStatus::Active {
            return false;
        }
        self.progress = progress.min(self.target);
        if self.progress >= self.target {
            self.status = QuestStatus::Completed;
            self.completed_at = Some(at);
            return true;
        }
        false
    }
}

pub fn default_quests() -> Vec<Quest> {
    vec![
        Quest::new(
            "daily-1",
            "Complete 3 Focus Sessions",
            "Finish 3 focus sessions today",
            50,
            QuestCadence::Daily,
            QuestKind::Sessions,
            3,
        ),
        Quest::new(
            "daily-2",
            "Focus for 2 Hours",
            "Accumulate 2 hours of focus time today",
            100,
            QuestCadence::Daily,
            QuestKind::Minutes,
            120,
        ),
        Quest::new(
            "weekly-1",
            "7-Day Streak",
            "Maintain focus for 7 consecutive days",
            300,
            QuestCadence::Weekly,
            QuestKind::Streak,
            7,
        ),
        Quest::new(
            "weekly-2",
            "Complete 20 Sessions",
            "Finish 20 focus sessions this week",
            250,
            QuestCadence::Weekly,
            QuestKind::Sessions,
            20,
        ),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub minutes: u64,
    pub sessions: u64,
}

fn empty_window(today: NaiveDate) -> Vec<DailyStat> {
    (0..DAILY_STATS_WINDOW as i64)
        .rev()
        .map(|days_back| DailyStat {
            date: today - Duration::days(days_back),
            minutes: 0,
            sessions: 0,
        })
        .collect()
}

/// Outcome of one completed session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionReward {
    pub minutes: u64,
    pub xp: u64,
    pub current_streak: u32,
    pub completed_quests: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressLedger {
    pub total_xp: u64,
    pub pending_xp: u64,
    pub level: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub sessions_completed: u64,
    pub total_minutes: u64,
    pub daily_stats: Vec<DailyStat>,
    pub quests: Vec<Quest>,
    pub weekly_xp_goal: u64,
    pub weekly_xp_earned: u64,
}

impl ProgressLedger {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            total_xp: 0,
            pending_xp: 0,
            level: 0,
            current_streak: 0,
            longest_streak: 0,
            sessions_completed: 0,
            total_minutes: 0,
            daily_stats: empty_window(today),
            quests: default_quests(),
            weekly_xp_goal: DEFAULT_WEEKLY_XP_GOAL,
            weekly_xp_earned: 0,
        }
    }

    /// Repair a ledger loaded from storage: level from XP, window ending
    /// today, quest progress within bounds.
    pub fn normalize(&mut self, today: NaiveDate) {
        self.roll_window(today);
        for quest in &mut self.quests {
            quest.progress = quest.progress.min(quest.target);
        }
        self.longest_streak = self.longest_streak.max(self.current_streak);
        self.recompute_level();
    }

    pub fn recompute_level(&mut self) {
        self.level = level_for_xp(self.total_xp);
    }

    /// Keep the last 14 days ending at `today`, carrying over any entries
    /// still inside the window.
    pub fn roll_window(&mut self, today: NaiveDate) {
        if self.daily_stats.len() == DAILY_STATS_WINDOW
            && self.daily_stats.last().map(|s| s.date) == Some(today)
        {
            return;
        }
        let mut window = empty_window(today);
        for slot in &mut window {
            if let Some(existing) = self.daily_stats.iter().find(|s| s.date == slot.date) {
                slot.minutes = existing.minutes;
                slot.sessions = existing.sessions;
            }
        }
        self.daily_stats = window;
    }

    pub fn stat_for(&self, date: NaiveDate) -> Option<&DailyStat> {
        self.daily_stats.iter().find(|s| s.date == date)
    }

    fn minutes_on(&self, date: Option<NaiveDate>) -> u64 {
        date.and_then(|d| self.stat_for(d))
            .map(|s| s.minutes)
            .unwrap_or(0)
    }

    pub fn add_pending_xp(&mut self, amount: u64) {
        self.pending_xp = self.pending_xp.saturating_add(amount);
    }

    /// Counters and streak. Must run before today's bucket is updated.
    pub fn record_session_completion(&mut self, minutes: u64, today: NaiveDate) -> u32 {
        self.sessions_completed += 1;
        self.total_minutes += minutes;

        if minutes > 0 {
            let today_before = self.minutes_on(Some(today));
            let yesterday = self.minutes_on(today.pred_opt());
            if today_before == 0 {
                self.current_streak = if yesterday > 0 {
                    self.current_streak + 1
                } else {
                    1
                };
            } else if self.current_streak == 0 {
                self.current_streak = 1;
            }
        }
        self.longest_streak = self.longest_streak.max(self.current_streak);
        self.current_streak
    }

    pub fn update_daily_stats(&mut self, minutes: u64, today: NaiveDate) {
        self.roll_window(today);
        if let Some(stat) = self.daily_stats.iter_mut().find(|s| s.date == today) {
            stat.minutes += minutes;
            stat.sessions += 1;
        }
    }

    /// Advance every active quest. Returns ids of quests completed by this
    /// call.
    pub fn update_quests_on_session_complete(
        &mut self,
        minutes: u64,
        mode: TimerMode,
        at: DateTime<Utc>,
    ) -> Vec<String> {
        let streak = self.current_streak as u64;
        let mut completed = Vec::new();
        for quest in &mut self.quests {
            if quest.status != QuestStatus::Active {
                continue;
            }
            let next = match (quest.kind, mode) {
                (QuestKind::Sessions, TimerMode::Focus) => quest.progress + 1,
                (QuestKind::Minutes, TimerMode::Focus) => quest.progress + minutes,
                (QuestKind::Streak, _) => streak,
                _ => continue,
            };
            if quest.set_progress(next, at) {
                completed.push(quest.id.clone());
            }
        }
        completed
    }

    /// The whole completion pipeline as one mutation.
    pub fn on_session_complete(
        &mut self,
        minutes: u64,
        mode: TimerMode,
        clock: &dyn Clock,
    ) -> SessionReward {
        let today = clock.today();
        self.roll_window(today);

        let xp = xp_for_session(minutes);
        self.add_pending_xp(xp);
        let current_streak = self.record_session_completion(minutes, today);
        self.update_daily_stats(minutes, today);
        let completed_quests =
            self.update_quests_on_session_complete(minutes, mode, clock.now_utc());
        self.recompute_level();

        SessionReward {
            minutes,
            xp,
            current_streak,
            completed_quests,
        }
    }

    /// Move all pending XP into the total. Returns the amount moved.
    pub fn claim_pending_xp(&mut self) -> u64 {
        let claimed = self.pending_xp;
        if claimed > 0 {
            self.total_xp += claimed;
            self.pending_xp = 0;
        }
        self.recompute_level();
        claimed
    }

    /// Claim a completed quest's reward into pending XP. `None` when the
    /// quest is unknown or not in the completed state.
    pub fn claim_quest(&mut self, quest_id: &str) -> Option<u64> {
        let quest = self
            .quests
            .iter_mut()
            .find(|q| q.id == quest_id && q.status == QuestStatus::Completed)?;
        quest.status = QuestStatus::Claimed;
        let xp = quest.xp;
        self.pending_xp += xp;
        self.weekly_xp_earned += xp;
        Some(xp)
    }

    pub fn complete_quest(&mut self, quest_id: &str, at: DateTime<Utc>) -> bool {
        match self.quests.iter_mut().find(|q| q.id == quest_id) {
            Some(quest) => {
                let target = quest.target;
                quest.set_progress(target, at)
            }
            None => false,
        }
    }

    pub fn update_quest_progress(
        &mut self,
        quest_id: &str,
        progress: u64,
        at: DateTime<Utc>,
    ) -> bool {
        match self.quests.iter_mut().find(|q| q.id == quest_id) {
            Some(quest) => quest.set_progress(progress, at),
            None => false,
        }
    }

    pub fn quest(&self, quest_id: &str) -> Option<&Quest> {
        self.quests.iter().find(|q| q.id == quest_id)
    }

    pub fn reset(&mut self, today: NaiveDate) {
        *self = Self::new(today);
    }
}

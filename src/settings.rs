use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::celebration::SoundType;
use crate::timer::TimerMode;

pub const MIN_DURATION_SECS: u64 = 60;

/// What "take a break" does after a completed session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum BreakPolicy {
    /// Return to idle and wait for the user.
    #[default]
    Idle,
    /// Start the follow-up interval straight away.
    AutoStart,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerSettings {
    pub default_focus: u64,
    pub default_short: u64,
    pub default_long: u64,
    pub continue_in_background: bool,
    pub prevent_timer_pause: bool,
    pub break_policy: BreakPolicy,
    pub completion_sound: SoundType,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            default_focus: 25 * 60,
            default_short: 5 * 60,
            default_long: 15 * 60,
            continue_in_background: false,
            prevent_timer_pause: false,
            break_policy: BreakPolicy::Idle,
            completion_sound: SoundType::default(),
        }
    }
}

impl TimerSettings {
    pub fn duration_for(&self, mode: TimerMode) -> u64 {
        match mode {
            TimerMode::Focus => self.default_focus,
            TimerMode::Short => self.default_short,
            TimerMode::Long => self.default_long,
        }
    }

    fn duration_mut(&mut self, mode: TimerMode) -> &mut u64 {
        match mode {
            TimerMode::Focus => &mut self.default_focus,
            TimerMode::Short => &mut self.default_short,
            TimerMode::Long => &mut self.default_long,
        }
    }

    /// Whether hiding the page should leave the countdown running.
    pub fn keeps_running_when_hidden(&self) -> bool {
        self.continue_in_background || self.prevent_timer_pause
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    timer: TimerSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Settings at {} are unreadable, using defaults: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn timer(&self) -> TimerSettings {
        self.read().timer.clone()
    }

    pub fn duration_for(&self, mode: TimerMode) -> u64 {
        self.read().timer.duration_for(mode)
    }

    pub fn update_timer(&self, settings: TimerSettings) -> Result<()> {
        let mut guard = self.write();
        guard.timer = settings;
        self.persist(&guard)
    }

    /// Replace the three default durations, each clamped to the minimum.
    pub fn set_timer_defaults(&self, focus: u64, short: u64, long: u64) -> Result<()> {
        let mut guard = self.write();
        guard.timer.default_focus = focus.max(MIN_DURATION_SECS);
        guard.timer.default_short = short.max(MIN_DURATION_SECS);
        guard.timer.default_long = long.max(MIN_DURATION_SECS);
        self.persist(&guard)
    }

    /// Shift one mode's default by `delta_secs`, never below the minimum.
    /// Returns the new duration.
    pub fn adjust_duration(&self, mode: TimerMode, delta_secs: i64) -> Result<u64> {
        let mut guard = self.write();
        let slot = guard.timer.duration_mut(mode);
        let adjusted = (*slot as i64).saturating_add(delta_secs);
        *slot = adjusted.max(MIN_DURATION_SECS as i64) as u64;
        let updated = *slot;
        self.persist(&guard)?;
        Ok(updated)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> SettingsStore {
        SettingsStore::new(dir.path().join("settings.json")).unwrap()
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = store(&dir).timer();
        assert_eq!(settings.duration_for(TimerMode::Focus), 1500);
        assert_eq!(settings.duration_for(TimerMode::Short), 300);
        assert_eq!(settings.duration_for(TimerMode::Long), 900);
        assert_eq!(settings.break_policy, BreakPolicy::Idle);
        assert!(!settings.keeps_running_when_hidden());
    }

    #[test]
    fn test_adjust_duration_clamps_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let settings = store(&dir);
        assert_eq!(settings.adjust_duration(TimerMode::Short, 120).unwrap(), 420);
        assert_eq!(settings.adjust_duration(TimerMode::Short, -10_000).unwrap(), 60);

        let reopened = store(&dir);
        assert_eq!(reopened.duration_for(TimerMode::Short), 60);
    }

    #[test]
    fn test_set_timer_defaults_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let settings = store(&dir);
        settings.set_timer_defaults(10, 600, 1200).unwrap();
        let timer = settings.timer();
        assert_eq!(
            (timer.default_focus, timer.default_short, timer.default_long),
            (60, 600, 1200)
        );
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("settings.json"), "{ nope").unwrap();
        assert_eq!(store(&dir).timer(), TimerSettings::default());
    }

    #[test]
    fn test_partial_file_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("settings.json"),
            r#"{"timer":{"defaultFocus":3000,"continueInBackground":true}}"#,
        )
        .unwrap();
        let timer = store(&dir).timer();
        assert_eq!(timer.default_focus, 3000);
        assert_eq!(timer.default_short, 300);
        assert!(timer.keeps_running_when_hidden());
    }

    #[test]
    fn test_reload_picks_up_external_edit() {
        let dir = tempfile::tempdir().unwrap();
        let settings = store(&dir);
        settings.update_timer(TimerSettings::default()).unwrap();
        fs::write(
            dir.path().join("settings.json"),
            r#"{"timer":{"breakPolicy":"autoStart"}}"#,
        )
        .unwrap();
        settings.reload().unwrap();
        assert_eq!(settings.timer().break_policy, BreakPolicy::AutoStart);
    }
}

use anyhow::{bail, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timer::TimerMode;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistTask {
    pub id: String,
    pub name: String,
    /// Seconds.
    pub duration: u64,
    #[serde(rename = "type")]
    pub task_type: TimerMode,
    #[serde(default)]
    pub completed: bool,
}

impl PlaylistTask {
    pub fn new(name: impl Into<String>, duration: u64, task_type: TimerMode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            duration,
            task_type,
            completed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Next(PlaylistTask),
    /// Cursor wrapped to 0 and playlist mode was switched off.
    Exhausted,
}

/// Ordered task list with a single cursor. The cursor stays within
/// `[0, tasks.len()]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Playlist {
    tasks: Vec<PlaylistTask>,
    cursor: usize,
    #[serde(rename = "playlistMode")]
    active: bool,
}

impl Playlist {
    pub fn new(tasks: Vec<PlaylistTask>) -> Self {
        Self {
            tasks,
            cursor: 0,
            active: false,
        }
    }

    pub fn tasks(&self) -> &[PlaylistTask] {
        &self.tasks
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task under the cursor while playlist mode is on.
    pub fn current_task(&self) -> Option<&PlaylistTask> {
        if !self.active {
            return None;
        }
        self.tasks.get(self.cursor)
    }

    /// Whether a task exists after the current one.
    pub fn has_next(&self) -> bool {
        self.cursor + 1 < self.tasks.len()
    }

    pub fn set_tasks(&mut self, tasks: Vec<PlaylistTask>) {
        self.tasks = tasks;
        self.cursor = 0;
    }

    pub fn add_task(&mut self, task: PlaylistTask) {
        self.warn_if_active("add");
        self.tasks.push(task);
    }

    pub fn remove_task(&mut self, task_id: &str) -> Result<PlaylistTask> {
        let Some(index) = self.tasks.iter().position(|t| t.id == task_id) else {
            bail!("unknown playlist task {task_id}");
        };
        self.warn_if_active("remove");
        let removed = self.tasks.remove(index);
        if index < self.cursor {
            self.cursor -= 1;
        }
        self.cursor = self.cursor.min(self.tasks.len());
        Ok(removed)
    }

    pub fn move_up(&mut self, index: usize) -> Result<()> {
        if index == 0 {
            return self.check_index(index);
        }
        self.reorder(index, index - 1)
    }

    pub fn move_down(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        if index + 1 == self.tasks.len() {
            return Ok(());
        }
        self.reorder(index, index + 1)
    }

    /// Move the task at `from` so it ends up at `to`. The cursor keeps its
    /// position, not its task.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        if from == to {
            return Ok(());
        }
        self.warn_if_active("reorder");
        let task = self.tasks.remove(from);
        self.tasks.insert(to, task);
        Ok(())
    }

    pub fn mark_current_completed(&mut self) {
        if let Some(task) = self.tasks.get_mut(self.cursor) {
            task.completed = true;
        }
    }

    /// Enabling rewinds to the first task.
    pub fn set_mode(&mut self, enabled: bool) {
        self.active = enabled;
        if enabled {
            self.cursor = 0;
        }
    }

    /// Rewind, clear completion flags and switch playlist mode on.
    pub fn start(&mut self) -> Result<PlaylistTask> {
        let Some(first) = self.tasks.first() else {
            bail!("cannot start an empty playlist");
        };
        let first = first.clone();
        for task in &mut self.tasks {
            task.completed = false;
        }
        self.cursor = 0;
        self.active = true;
        info!("Playlist started with {} tasks", self.tasks.len());
        Ok(PlaylistTask {
            completed: false,
            ..first
        })
    }

    pub fn advance(&mut self) -> Advance {
        self.cursor += 1;
        match self.tasks.get(self.cursor) {
            Some(task) => Advance::Next(task.clone()),
            None => {
                self.cursor = 0;
                self.active = false;
                info!("Playlist exhausted");
                Advance::Exhausted
            }
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.tasks.len() {
            bail!(
                "playlist index {index} out of range ({} tasks)",
                self.tasks.len()
            );
        }
        Ok(())
    }

    fn warn_if_active(&self, action: &str) {
        if self.active {
            warn!("Playlist {action} while playlist mode is running");
        }
    }
}

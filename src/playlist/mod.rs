pub mod sequencer;

use std::sync::Arc;

use anyhow::Result;
use log::{error, warn};
use tokio::sync::Mutex;

use crate::db::{repositories::app_state::PLAYLIST_KEY, Database};

pub use sequencer::{Advance, Playlist, PlaylistTask};

/// Shared, persisted playlist. Each edit is written back before the lock is
/// released.
#[derive(Clone)]
pub struct PlaylistStore {
    db: Database,
    playlist: Arc<Mutex<Playlist>>,
}

impl PlaylistStore {
    pub async fn load(db: Database) -> Result<Self> {
        let playlist = match db.load_state_raw(PLAYLIST_KEY).await? {
            Some(raw) => serde_json::from_str::<Playlist>(&raw).unwrap_or_else(|err| {
                warn!("Stored playlist is unreadable, starting empty: {err}");
                Playlist::default()
            }),
            None => Playlist::default(),
        };
        Ok(Self {
            db,
            playlist: Arc::new(Mutex::new(playlist)),
        })
    }

    pub async fn snapshot(&self) -> Playlist {
        self.playlist.lock().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.playlist.lock().await.is_active()
    }

    pub async fn current_task(&self) -> Option<PlaylistTask> {
        self.playlist.lock().await.current_task().cloned()
    }

    /// Run `edit` against the playlist and persist the result.
    pub async fn update<F, T>(&self, edit: F) -> T
    where
        F: FnOnce(&mut Playlist) -> T,
    {
        let mut playlist = self.playlist.lock().await;
        let outcome = edit(&mut *playlist);
        if let Err(err) = self.db.save_state(PLAYLIST_KEY, &*playlist).await {
            error!("Failed to persist playlist: {err:?}");
        }
        outcome
    }

    pub async fn set_tasks(&self, tasks: Vec<PlaylistTask>) {
        self.update(|p| p.set_tasks(tasks)).await
    }

    pub async fn add_task(&self, task: PlaylistTask) {
        self.update(|p| p.add_task(task)).await
    }

    pub async fn remove_task(&self, task_id: &str) -> Result<PlaylistTask> {
        self.update(|p| p.remove_task(task_id)).await
    }

    pub async fn move_up(&self, index: usize) -> Result<()> {
        self.update(|p| p.move_up(index)).await
    }

    pub async fn move_down(&self, index: usize) -> Result<()> {
        self.update(|p| p.move_down(index)).await
    }

    pub async fn reorder(&self, from: usize, to: usize) -> Result<()> {
        self.update(|p| p.reorder(from, to)).await
    }

    pub async fn set_mode(&self, enabled: bool) {
        self.update(|p| p.set_mode(enabled)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::TimerMode;

    #[tokio::test]
    async fn test_playlist_persists_tasks_cursor_and_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focus.sqlite3");
        {
            let db = Database::new(path.clone()).unwrap();
            let store = PlaylistStore::load(db).await.unwrap();
            store
                .set_tasks(vec![
                    PlaylistTask::new("Write", 1500, TimerMode::Focus),
                    PlaylistTask::new("Rest", 300, TimerMode::Short),
                ])
                .await;
            store.update(|p| p.start()).await.unwrap();
            store.update(|p| p.advance()).await;
        }

        let db = Database::new(path).unwrap();
        let store = PlaylistStore::load(db).await.unwrap();
        let playlist = store.snapshot().await;
        assert_eq!(playlist.tasks().len(), 2);
        assert_eq!(playlist.cursor(), 1);
        assert!(playlist.is_active());
        assert_eq!(store.current_task().await.unwrap().name, "Rest");
    }

    #[tokio::test]
    async fn test_unreadable_playlist_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("focus.sqlite3")).unwrap();
        db.save_state_raw(PLAYLIST_KEY, "[1,2".into()).await.unwrap();
        let store = PlaylistStore::load(db).await.unwrap();
        assert!(store.snapshot().await.is_empty());
        assert!(store.remove_task("nope").await.is_err());
    }
}

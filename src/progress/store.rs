use std::sync::Arc;

use anyhow::{bail, Result};
use log::{error, info, warn};
use tokio::sync::Mutex;

use super::ledger::{ProgressLedger, SessionReward};
use crate::db::{repositories::app_state::PROGRESS_KEY, Database};
use crate::timer::{Clock, TimerMode};

enum Phase {
    Uninitialized,
    Hydrated(ProgressLedger),
}

/// Owner of the progress ledger. Every mutation runs against a copy under
/// one lock, is written to the database, then replaces the committed value,
/// so concurrent callers never interleave.
#[derive(Clone)]
pub struct LedgerStore {
    db: Database,
    clock: Arc<dyn Clock>,
    phase: Arc<Mutex<Phase>>,
}

impl LedgerStore {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            phase: Arc::new(Mutex::new(Phase::Uninitialized)),
        }
    }

    /// Load the stored ledger. Missing or unreadable data starts a fresh
    /// ledger. Calling again after hydration is a no-op.
    pub async fn hydrate(&self) -> Result<()> {
        let mut phase = self.phase.lock().await;
        if matches!(*phase, Phase::Hydrated(_)) {
            return Ok(());
        }

        let today = self.clock.today();
        let ledger = match self.db.load_state_raw(PROGRESS_KEY).await? {
            Some(raw) => match serde_json::from_str::<ProgressLedger>(&raw) {
                Ok(mut ledger) => {
                    ledger.normalize(today);
                    ledger
                }
                Err(err) => {
                    warn!("Stored progress is unreadable, starting fresh: {err}");
                    ProgressLedger::new(today)
                }
            },
            None => ProgressLedger::new(today),
        };

        info!(
            "Progress hydrated: level {}, {} xp, streak {}",
            ledger.level, ledger.total_xp, ledger.current_streak
        );
        *phase = Phase::Hydrated(ledger);
        Ok(())
    }

    pub async fn is_hydrated(&self) -> bool {
        matches!(*self.phase.lock().await, Phase::Hydrated(_))
    }

    pub async fn snapshot(&self) -> Result<ProgressLedger> {
        match &*self.phase.lock().await {
            Phase::Hydrated(ledger) => Ok(ledger.clone()),
            Phase::Uninitialized => bail!("progress ledger used before hydration"),
        }
    }

    async fn mutate<F, T>(&self, apply: F) -> Result<T>
    where
        F: FnOnce(&mut ProgressLedger, &dyn Clock) -> T,
    {
        let mut phase = self.phase.lock().await;
        let Phase::Hydrated(committed) = &mut *phase else {
            bail!("progress ledger used before hydration");
        };

        let mut draft = committed.clone();
        draft.roll_window(self.clock.today());
        let outcome = apply(&mut draft, self.clock.as_ref());
        draft.recompute_level();

        if let Err(err) = self.db.save_state(PROGRESS_KEY, &draft).await {
            error!("Failed to persist progress: {err:?}");
        }
        *committed = draft;
        Ok(outcome)
    }

    pub async fn on_session_complete(
        &self,
        minutes: u64,
        mode: TimerMode,
    ) -> Result<SessionReward> {
        self.mutate(|ledger, clock| ledger.on_session_complete(minutes, mode, clock))
            .await
    }

    pub async fn add_pending_xp(&self, amount: u64) -> Result<()> {
        self.mutate(|ledger, _| ledger.add_pending_xp(amount)).await
    }

    pub async fn claim_pending_xp(&self) -> Result<u64> {
        self.mutate(|ledger, _| ledger.claim_pending_xp()).await
    }

    pub async fn claim_quest(&self, quest_id: &str) -> Result<Option<u64>> {
        self.mutate(|ledger, _| ledger.claim_quest(quest_id)).await
    }

    pub async fn complete_quest(&self, quest_id: &str) -> Result<bool> {
        self.mutate(|ledger, clock| ledger.complete_quest(quest_id, clock.now_utc()))
            .await
    }

    pub async fn update_quest_progress(&self, quest_id: &str, progress: u64) -> Result<bool> {
        self.mutate(|ledger, clock| {
            ledger.update_quest_progress(quest_id, progress, clock.now_utc())
        })
        .await
    }

    pub async fn reset(&self) -> Result<()> {
        self.mutate(|ledger, clock| ledger.reset(clock.today())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualClock;

    async fn open(dir: &tempfile::TempDir) -> (Database, LedgerStore) {
        let db = Database::new(dir.path().join("focus.sqlite3")).unwrap();
        let store = LedgerStore::new(db.clone(), Arc::new(ManualClock::starting_now()));
        (db, store)
    }

    #[tokio::test]
    async fn test_mutations_rejected_before_hydration() {
        let dir = tempfile::tempdir().unwrap();
        let (_db, store) = open(&dir).await;
        assert!(!store.is_hydrated().await);
        assert!(store.claim_pending_xp().await.is_err());
        assert!(store.snapshot().await.is_err());

        store.hydrate().await.unwrap();
        assert!(store.is_hydrated().await);
        assert_eq!(store.claim_pending_xp().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_progress_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (_db, store) = open(&dir).await;
            store.hydrate().await.unwrap();
            let reward = store.on_session_complete(25, TimerMode::Focus).await.unwrap();
            assert_eq!(reward.xp, 51);
            store.claim_pending_xp().await.unwrap();
        }

        let (_db, store) = open(&dir).await;
        store.hydrate().await.unwrap();
        let ledger = store.snapshot().await.unwrap();
        assert_eq!(ledger.total_xp, 51);
        assert_eq!(ledger.pending_xp, 0);
        assert_eq!(ledger.sessions_completed, 1);
    }

    #[tokio::test]
    async fn test_corrupt_progress_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let (db, store) = open(&dir).await;
        db.save_state_raw(PROGRESS_KEY, "{\"totalXp\": \"lots\"".into())
            .await
            .unwrap();
        store.hydrate().await.unwrap();
        assert_eq!(store.snapshot().await.unwrap().total_xp, 0);
    }

    #[tokio::test]
    async fn test_concurrent_completions_are_serialised() {
        let dir = tempfile::tempdir().unwrap();
        let (_db, store) = open(&dir).await;
        store.hydrate().await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.on_session_complete(10, TimerMode::Focus).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let ledger = store.snapshot().await.unwrap();
        assert_eq!(ledger.sessions_completed, 8);
        assert_eq!(ledger.pending_xp, 8 * 20);
        assert_eq!(ledger.total_minutes, 80);
    }

    #[tokio::test]
    async fn test_reset_restores_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (_db, store) = open(&dir).await;
        store.hydrate().await.unwrap();
        store.on_session_complete(30, TimerMode::Focus).await.unwrap();
        assert!(store.complete_quest("weekly-2").await.unwrap());
        assert_eq!(store.claim_quest("weekly-2").await.unwrap(), Some(250));

        store.reset().await.unwrap();
        let ledger = store.snapshot().await.unwrap();
        assert_eq!(ledger.pending_xp, 0);
        assert_eq!(ledger.sessions_completed, 0);
        assert!(ledger.quests.iter().all(|q| q.progress == 0));
    }
}

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use log::info;
use tokio::sync::broadcast;

use crate::{
    celebration::{Celebration, LogCelebration},
    db::Database,
    events::{BroadcastSink, TimerEvent},
    playlist::PlaylistStore,
    progress::LedgerStore,
    settings::SettingsStore,
    timer::{Clock, ControllerConfig, ControllerDeps, SystemClock, TimerController},
};

const DB_FILE: &str = "focusrun.sqlite3";
const SETTINGS_FILE: &str = "settings.json";

/// Everything a host needs, wired together and recovered.
pub struct FocusApp {
    pub db: Database,
    pub settings: Arc<SettingsStore>,
    pub ledger: LedgerStore,
    pub playlist: PlaylistStore,
    pub timer: TimerController,
    events: BroadcastSink,
}

impl FocusApp {
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(
            data_dir,
            Arc::new(SystemClock),
            Arc::new(LogCelebration),
            ControllerConfig::default(),
        )
        .await
    }

    pub async fn open_with(
        data_dir: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
        celebration: Arc<dyn Celebration>,
        config: ControllerConfig,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::new(data_dir.join(DB_FILE))?;
        let settings = Arc::new(SettingsStore::new(data_dir.join(SETTINGS_FILE))?);

        let ledger = LedgerStore::new(db.clone(), clock.clone());
        ledger.hydrate().await?;
        let playlist = PlaylistStore::load(db.clone()).await?;

        let events = BroadcastSink::new();
        let timer = TimerController::new(
            ControllerDeps {
                db: db.clone(),
                settings: settings.clone(),
                ledger: ledger.clone(),
                playlist: playlist.clone(),
                clock,
                sink: Arc::new(events.clone()),
                celebration,
            },
            config,
        );
        timer.recover().await?;

        info!("Focus core ready at {}", data_dir.display());
        Ok(Self {
            db,
            settings,
            ledger,
            playlist,
            timer,
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.events.subscribe()
    }

    pub fn shutdown(&self) {
        self.timer.shutdown();
    }
}

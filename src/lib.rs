//! Core of a gamified focus timer: a wall-clock anchored countdown running
//! in the background, the session state machine around it, and the
//! XP/streak/quest ledger fed by completed sessions.

pub mod app;
pub mod celebration;
pub mod db;
pub mod events;
pub mod playlist;
pub mod progress;
pub mod settings;
pub mod timer;
pub mod utils;

pub use app::FocusApp;
pub use celebration::{Celebration, LogCelebration, SoundType};
pub use events::{BroadcastSink, EventSink, SessionCompletedEvent, TimerEvent};
pub use playlist::{Playlist, PlaylistStore, PlaylistTask};
pub use progress::{LedgerStore, ProgressLedger, SessionReward};
pub use settings::{BreakPolicy, SettingsStore, TimerSettings};
pub use timer::{TimerController, TimerMode, TimerSnapshot, TimerStatus};
pub use utils::logging::init_logging;

pub mod clock;
pub mod controller;
pub mod countdown;
pub mod engine;
pub mod recovery;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{ControllerConfig, ControllerDeps, TimerController};
pub use countdown::{format_clock, Countdown, Progress};
pub use engine::{CountdownDriver, CountdownEngine, EngineCommand, EngineEvent, InlineCountdown};
pub use recovery::{plan_recovery, RecoveryPlan, RecoveryRecord};
pub use state::{TimerMode, TimerSnapshot, TimerState, TimerStatus};

//! Countdown engine.
//!
//! The engine runs in its own task and is reachable only through
//! [`EngineCommand`]s; it answers with [`EngineEvent`]s on a channel. Every
//! event carries the generation of the START it belongs to so callers can
//! drop events from superseded sessions.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::{
    runtime::Handle,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::{
    clock::Clock,
    countdown::{Countdown, Progress},
};

// Ticks are frequent; keep debug chatter behind this flag.
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Start { generation: u64, duration_secs: u64 },
    Pause,
    Reset,
    GetTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    Tick {
        generation: u64,
        remaining: u64,
        elapsed: u64,
    },
    Complete {
        generation: u64,
        elapsed: u64,
    },
    TimeUpdate {
        generation: u64,
        remaining: u64,
        elapsed: u64,
    },
}

impl EngineEvent {
    pub fn generation(&self) -> u64 {
        match self {
            EngineEvent::Tick { generation, .. }
            | EngineEvent::Complete { generation, .. }
            | EngineEvent::TimeUpdate { generation, .. } => *generation,
        }
    }
}

/// Command surface shared by the background worker and the inline fallback.
pub trait CountdownDriver: Send + Sync {
    /// Queue a START and return the generation its events will carry.
    ///
    /// A START that arrives while a countdown is active is ignored, and the
    /// returned generation never sees an event. Call [`reset`] first.
    ///
    /// [`reset`]: CountdownDriver::reset
    fn start(&self, duration_secs: u64) -> u64;
    fn pause(&self);
    fn reset(&self);
    /// Ask for a TIME_UPDATE right now instead of waiting for a tick.
    fn poll(&self);
    fn is_background(&self) -> bool;
    /// Stop the driver for good. Later commands are dropped.
    fn shutdown(&self) {}
}

#[derive(Debug, Clone, Copy)]
struct ActiveCountdown {
    generation: u64,
    countdown: Countdown,
}

/// Engine bookkeeping, independent of how commands are delivered.
#[derive(Debug, Default)]
pub(crate) struct EngineCore {
    active: Option<ActiveCountdown>,
    /// Generation and duration of the most recent START, kept across PAUSE.
    last_start: Option<(u64, u64)>,
}

impl EngineCore {
    pub(crate) fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub(crate) fn handle(&mut self, command: EngineCommand, now_ms: i64) -> Vec<EngineEvent> {
        match command {
            EngineCommand::Start {
                generation,
                duration_secs,
            } => {
                if let Some(active) = self.active {
                    log_debug!(
                        "ignoring START for generation {generation}; generation {} still running",
                        active.generation
                    );
                    return Vec::new();
                }
                self.active = Some(ActiveCountdown {
                    generation,
                    countdown: Countdown::start(duration_secs, now_ms),
                });
                self.last_start = Some((generation, duration_secs));
                self.check(now_ms).into_iter().collect()
            }
            EngineCommand::Pause => {
                // a countdown that already ran out still owes its COMPLETE
                let finished = self
                    .check(now_ms)
                    .filter(|event| matches!(event, EngineEvent::Complete { .. }));
                self.active = None;
                finished.into_iter().collect()
            }
            EngineCommand::Reset => {
                self.active = None;
                self.last_start = None;
                Vec::new()
            }
            EngineCommand::GetTime => self.time_update(now_ms),
        }
    }

    /// Progress for the running countdown: a TICK, or the single COMPLETE
    /// once nothing remains (after which the core is stopped).
    pub(crate) fn check(&mut self, now_ms: i64) -> Option<EngineEvent> {
        let active = self.active?;
        let progress = active.countdown.progress(now_ms);
        if progress.is_finished() {
            self.active = None;
            Some(EngineEvent::Complete {
                generation: active.generation,
                elapsed: active.countdown.duration_secs(),
            })
        } else {
            Some(EngineEvent::Tick {
                generation: active.generation,
                remaining: progress.remaining,
                elapsed: progress.elapsed,
            })
        }
    }

    fn time_update(&mut self, now_ms: i64) -> Vec<EngineEvent> {
        match self.active {
            Some(active) => {
                let Progress { remaining, elapsed } = active.countdown.progress(now_ms);
                let mut events = vec![EngineEvent::TimeUpdate {
                    generation: active.generation,
                    remaining,
                    elapsed,
                }];
                if remaining == 0 {
                    events.extend(self.check(now_ms));
                }
                events
            }
            None => {
                let (generation, duration_secs) = self.last_start.unwrap_or((0, 0));
                vec![EngineEvent::TimeUpdate {
                    generation,
                    remaining: duration_secs,
                    elapsed: 0,
                }]
            }
        }
    }
}

#[derive(Debug)]
struct GenerationCounter(AtomicU64);

impl GenerationCounter {
    fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Background countdown worker running on the tokio runtime.
pub struct CountdownEngine {
    commands: UnboundedSender<EngineCommand>,
    generations: GenerationCounter,
    cancel_token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CountdownEngine {
    pub fn spawn(
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
    ) -> Result<(Self, UnboundedReceiver<EngineEvent>)> {
        if tick_interval.is_zero() {
            bail!("countdown tick interval must be greater than zero");
        }
        let runtime =
            Handle::try_current().context("countdown engine requires a running tokio runtime")?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        let handle = runtime.spawn(engine_loop(
            clock,
            tick_interval,
            command_rx,
            event_tx,
            cancel_token.clone(),
        ));

        Ok((
            Self {
                commands: command_tx,
                generations: GenerationCounter::new(),
                cancel_token,
                handle: Mutex::new(Some(handle)),
            },
            event_rx,
        ))
    }

    fn send(&self, command: EngineCommand) {
        if self.commands.send(command).is_err() {
            log_warn!("countdown engine is gone; dropped {command:?}");
        }
    }
}

impl Drop for CountdownEngine {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl CountdownDriver for CountdownEngine {
    fn start(&self, duration_secs: u64) -> u64 {
        let generation = self.generations.next();
        self.send(EngineCommand::Start {
            generation,
            duration_secs,
        });
        generation
    }

    fn pause(&self) {
        self.send(EngineCommand::Pause);
    }

    fn reset(&self) {
        self.send(EngineCommand::Reset);
    }

    fn poll(&self) {
        self.send(EngineCommand::GetTime);
    }

    fn is_background(&self) -> bool {
        true
    }

    fn shutdown(&self) {
        self.cancel_token.cancel();
        if let Some(handle) = lock_ignoring_poison(&self.handle).take() {
            handle.abort();
        }
    }
}

async fn engine_loop(
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    mut commands: UnboundedReceiver<EngineCommand>,
    events: UnboundedSender<EngineEvent>,
    cancel_token: CancellationToken,
) {
    let mut core = EngineCore::default();
    let mut ticker = time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log_info!("countdown engine started ({}ms cadence)", tick_interval.as_millis());

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log_info!("countdown engine shutting down");
                break;
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    log_info!("countdown engine command channel closed");
                    break;
                };
                for event in core.handle(command, clock.now_ms()) {
                    if events.send(event).is_err() {
                        return;
                    }
                }
            }
            _ = ticker.tick(), if core.is_active() => {
                if let Some(event) = core.check(clock.now_ms()) {
                    if let EngineEvent::Complete { generation, elapsed } = event {
                        log_debug!("countdown generation {generation} complete after {elapsed}s");
                    }
                    if events.send(event).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Foreground-only countdown used when no background worker can be
/// started. Same arithmetic, but there are no periodic ticks: progress and
/// completion surface only when the caller polls.
pub struct InlineCountdown {
    clock: Arc<dyn Clock>,
    core: Mutex<EngineCore>,
    events: UnboundedSender<EngineEvent>,
    generations: GenerationCounter,
}

impl InlineCountdown {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, UnboundedReceiver<EngineEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                clock,
                core: Mutex::new(EngineCore::default()),
                events: event_tx,
                generations: GenerationCounter::new(),
            },
            event_rx,
        )
    }

    fn dispatch(&self, command: EngineCommand) {
        let events = {
            let mut core = lock_ignoring_poison(&self.core);
            core.handle(command, self.clock.now_ms())
        };
        for event in events {
            if self.events.send(event).is_err() {
                log_warn!("inline countdown receiver dropped");
                return;
            }
        }
    }
}

impl CountdownDriver for InlineCountdown {
    fn start(&self, duration_secs: u64) -> u64 {
        let generation = self.generations.next();
        self.dispatch(EngineCommand::Start {
            generation,
            duration_secs,
        });
        generation
    }

    fn pause(&self) {
        self.dispatch(EngineCommand::Pause);
    }

    fn reset(&self) {
        self.dispatch(EngineCommand::Reset);
    }

    fn poll(&self) {
        self.dispatch(EngineCommand::GetTime);
    }

    fn is_background(&self) -> bool {
        false
    }
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::clock::ManualClock;

    const START: i64 = 1_700_000_000_000;

    fn start(generation: u64, duration_secs: u64) -> EngineCommand {
        EngineCommand::Start {
            generation,
            duration_secs,
        }
    }

    #[test]
    fn test_core_start_emits_initial_tick() {
        let mut core = EngineCore::default();
        let events = core.handle(start(1, 25), START);
        assert_eq!(
            events,
            vec![EngineEvent::Tick {
                generation: 1,
                remaining: 25,
                elapsed: 0
            }]
        );
    }

    #[test]
    fn test_core_start_while_running_is_ignored() {
        let mut core = EngineCore::default();
        core.handle(start(1, 25), START);
        assert!(core.handle(start(2, 5), START + 1_000).is_empty());
        assert_eq!(
            core.check(START + 10_000),
            Some(EngineEvent::Tick {
                generation: 1,
                remaining: 15,
                elapsed: 10
            })
        );
    }

    #[test]
    fn test_core_completes_once_and_stops() {
        let mut core = EngineCore::default();
        core.handle(start(7, 3), START);
        assert_eq!(
            core.check(START + 3_000),
            Some(EngineEvent::Complete {
                generation: 7,
                elapsed: 3
            })
        );
        assert!(!core.is_active());
        assert_eq!(core.check(START + 4_000), None);
        assert_eq!(core.check(START + 400_000), None);
    }

    #[test]
    fn test_core_pause_then_restart_reanchors() {
        let mut core = EngineCore::default();
        core.handle(start(1, 25), START);
        core.handle(EngineCommand::Pause, START + 10_000);
        assert_eq!(core.check(START + 60_000), None);

        // caller resumes with what was left when it paused
        core.handle(start(2, 15), START + 60_000);
        assert_eq!(
            core.check(START + 65_000),
            Some(EngineEvent::Tick {
                generation: 2,
                remaining: 10,
                elapsed: 5
            })
        );
    }

    #[test]
    fn test_core_time_update_when_idle_reports_last_duration() {
        let mut core = EngineCore::default();
        assert_eq!(
            core.handle(EngineCommand::GetTime, START),
            vec![EngineEvent::TimeUpdate {
                generation: 0,
                remaining: 0,
                elapsed: 0
            }]
        );
        core.handle(start(3, 90), START);
        core.handle(EngineCommand::Pause, START + 5_000);
        assert_eq!(
            core.handle(EngineCommand::GetTime, START + 6_000),
            vec![EngineEvent::TimeUpdate {
                generation: 3,
                remaining: 90,
                elapsed: 0
            }]
        );
        core.handle(EngineCommand::Reset, START + 7_000);
        core.handle(EngineCommand::Reset, START + 7_000);
        assert_eq!(
            core.handle(EngineCommand::GetTime, START + 8_000)[0].generation(),
            0
        );
    }

    #[test]
    fn test_core_time_update_past_end_completes() {
        let mut core = EngineCore::default();
        core.handle(start(4, 10), START);
        let events = core.handle(EngineCommand::GetTime, START + 30_000);
        assert_eq!(
            events,
            vec![
                EngineEvent::TimeUpdate {
                    generation: 4,
                    remaining: 0,
                    elapsed: 10
                },
                EngineEvent::Complete {
                    generation: 4,
                    elapsed: 10
                }
            ]
        );
        assert!(core
            .handle(EngineCommand::GetTime, START + 31_000)
            .iter()
            .all(|event| !matches!(event, EngineEvent::Complete { .. })));
    }

    #[test]
    fn test_core_pause_after_end_still_completes() {
        let mut core = EngineCore::default();
        core.handle(start(5, 10), START);
        assert_eq!(
            core.handle(EngineCommand::Pause, START + 30_000),
            vec![EngineEvent::Complete {
                generation: 5,
                elapsed: 10
            }]
        );
        assert!(!core.is_active());
        assert!(core.handle(EngineCommand::Pause, START + 31_000).is_empty());

        // pausing early stays silent
        core.handle(start(6, 10), START);
        assert!(core.handle(EngineCommand::Pause, START + 4_000).is_empty());
    }

    async fn next_event(rx: &mut UnboundedReceiver<EngineEvent>) -> EngineEvent {
        time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("engine produced no event")
            .expect("engine channel closed")
    }

    #[tokio::test]
    async fn test_worker_follows_wall_clock_not_tick_count() {
        let clock = ManualClock::new(START);
        let (engine, mut rx) =
            CountdownEngine::spawn(Arc::new(clock.clone()), Duration::from_millis(5)).unwrap();

        let generation = engine.start(25);
        assert_eq!(
            next_event(&mut rx).await,
            EngineEvent::Tick {
                generation,
                remaining: 25,
                elapsed: 0
            }
        );

        // many ticks with a frozen clock still read 25
        for _ in 0..3 {
            assert!(matches!(
                next_event(&mut rx).await,
                EngineEvent::Tick { remaining: 25, .. }
            ));
        }

        clock.advance_secs(15);
        loop {
            if let EngineEvent::Tick { remaining, elapsed, .. } = next_event(&mut rx).await {
                if remaining == 10 {
                    assert_eq!(elapsed, 15);
                    break;
                }
            }
        }
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_worker_emits_single_completion() {
        let clock = ManualClock::new(START);
        let (engine, mut rx) =
            CountdownEngine::spawn(Arc::new(clock.clone()), Duration::from_millis(5)).unwrap();

        let generation = engine.start(1500);
        assert!(matches!(next_event(&mut rx).await, EngineEvent::Tick { .. }));
        clock.advance_secs(4_000);

        let mut completions = 0;
        loop {
            match next_event(&mut rx).await {
                EngineEvent::Complete { generation: g, elapsed } => {
                    assert_eq!(g, generation);
                    assert_eq!(elapsed, 1500);
                    completions += 1;
                    break;
                }
                EngineEvent::Tick { .. } => {}
                other => panic!("unexpected {other:?}"),
            }
        }

        // nothing after completion until the next START
        let quiet = time::timeout(Duration::from_millis(60), rx.recv()).await;
        assert!(quiet.is_err());
        assert_eq!(completions, 1);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_worker_reset_then_start_uses_new_generation() {
        let clock = ManualClock::new(START);
        let (engine, mut rx) =
            CountdownEngine::spawn(Arc::new(clock.clone()), Duration::from_millis(5)).unwrap();

        let first = engine.start(30);
        engine.reset();
        let second = engine.start(60);
        assert_ne!(first, second);

        engine.pause();
        engine.poll();
        let mut seen_update = false;
        while !seen_update {
            if let EngineEvent::TimeUpdate { generation, remaining, .. } = next_event(&mut rx).await
            {
                assert_eq!(generation, second);
                assert_eq!(remaining, 60);
                seen_update = true;
            }
        }
        engine.shutdown();
    }

    #[test]
    fn test_worker_requires_runtime() {
        let clock = ManualClock::new(START);
        let result = CountdownEngine::spawn(Arc::new(clock), Duration::from_millis(100));
        assert!(result.is_err());
    }

    #[test]
    fn test_inline_countdown_only_progresses_on_poll() {
        let clock = ManualClock::new(START);
        let (inline, mut rx) = InlineCountdown::new(Arc::new(clock.clone()));
        assert!(!inline.is_background());

        let generation = inline.start(20);
        assert!(matches!(rx.try_recv(), Ok(EngineEvent::Tick { remaining: 20, .. })));

        clock.advance_secs(8);
        assert!(rx.try_recv().is_err());
        inline.poll();
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::TimeUpdate {
                generation,
                remaining: 12,
                elapsed: 8
            }
        );

        clock.advance_secs(100);
        inline.poll();
        assert!(matches!(rx.try_recv(), Ok(EngineEvent::TimeUpdate { remaining: 0, .. })));
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::Complete {
                generation,
                elapsed: 20
            }
        );
        inline.poll();
        assert!(matches!(rx.try_recv(), Ok(EngineEvent::TimeUpdate { .. })));
        assert!(rx.try_recv().is_err());
    }
}

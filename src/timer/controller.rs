use std::{
    ops::Deref,
    sync::{Arc, Mutex as StdMutex, MutexGuard, Weak},
    time::Duration,
};

use anyhow::{bail, Result};
use log::{debug, error, info, warn};
use rand::Rng;
use tokio::{
    runtime::Handle,
    sync::{mpsc::UnboundedReceiver, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    clock::Clock,
    countdown::format_clock,
    engine::{CountdownDriver, CountdownEngine, EngineEvent, InlineCountdown},
    recovery::{plan_recovery, RecoveryPlan, RecoveryRecord},
    state::{TimerMode, TimerSnapshot, TimerState, TimerStatus},
};
use crate::{
    celebration::Celebration,
    db::{repositories::app_state::RECOVERY_KEY, Database, SessionRecord, SessionStatus},
    events::{EventSink, SessionCompletedEvent, TimerEvent},
    playlist::{Advance, PlaylistStore},
    progress::LedgerStore,
    settings::{BreakPolicy, SettingsStore},
};

const LONG_BREAK_PROBABILITY: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Cadence of background ticks. Cosmetic: progress is always derived
    /// from the wall clock.
    pub tick_interval: Duration,
    /// Pause between a completed playlist task and the next one.
    pub playlist_advance_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            playlist_advance_delay: Duration::from_secs(3),
        }
    }
}

/// Collaborators the controller is wired to.
#[derive(Clone)]
pub struct ControllerDeps {
    pub db: Database,
    pub settings: Arc<SettingsStore>,
    pub ledger: LedgerStore,
    pub playlist: PlaylistStore,
    pub clock: Arc<dyn Clock>,
    pub sink: Arc<dyn EventSink>,
    pub celebration: Arc<dyn Celebration>,
}

struct FinishedSession {
    session_id: Option<String>,
    mode: TimerMode,
    task_name: Option<String>,
    duration: u64,
    snapshot: TimerSnapshot,
}

/// The session state machine. Owns the foreground view of the timer, drives
/// the countdown engine and runs the completion pipeline.
///
/// Clones share one controller. Background tasks only hold weak references,
/// so dropping the last handle stops the engine like [`shutdown`] does.
///
/// [`shutdown`]: TimerController::shutdown
#[derive(Clone)]
pub struct TimerController(Arc<ControllerInner>);

/// Shared state behind every [`TimerController`] clone.
pub struct ControllerInner {
    state: Arc<Mutex<TimerState>>,
    driver: Arc<dyn CountdownDriver>,
    /// Present only when running on the inline fallback; events are
    /// drained after each command instead of by the pump.
    inline_events: Option<Arc<Mutex<UnboundedReceiver<EngineEvent>>>>,
    db: Database,
    settings: Arc<SettingsStore>,
    ledger: LedgerStore,
    playlist: PlaylistStore,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    celebration: Arc<dyn Celebration>,
    config: ControllerConfig,
    cancel_token: CancellationToken,
    pump: Arc<StdMutex<Option<JoinHandle<()>>>>,
    auto_advance: Arc<StdMutex<Option<JoinHandle<()>>>>,
}

impl Deref for TimerController {
    type Target = ControllerInner;

    fn deref(&self) -> &ControllerInner {
        &self.0
    }
}

impl ControllerInner {
    fn stop_tasks(&self) {
        self.cancel_token.cancel();
        for slot in [&self.pump, &self.auto_advance] {
            if let Some(handle) = lock_slot(slot).take() {
                handle.abort();
            }
        }
        self.driver.shutdown();
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

impl TimerController {
    pub fn new(deps: ControllerDeps, config: ControllerConfig) -> Self {
        let ControllerDeps {
            db,
            settings,
            ledger,
            playlist,
            clock,
            sink,
            celebration,
        } = deps;

        let (driver, events) = match CountdownEngine::spawn(clock.clone(), config.tick_interval) {
            Ok((engine, events)) => {
                let driver: Arc<dyn CountdownDriver> = Arc::new(engine);
                (driver, events)
            }
            Err(err) => {
                warn!("Background countdown unavailable, falling back to polled countdown: {err:#}");
                let (inline, events) = InlineCountdown::new(clock.clone());
                let driver: Arc<dyn CountdownDriver> = Arc::new(inline);
                (driver, events)
            }
        };

        let mut state = TimerState::new();
        state.reset_to(TimerMode::Focus, settings.duration_for(TimerMode::Focus));

        let (inline_events, pump_events) = if driver.is_background() {
            (None, Some(events))
        } else {
            (Some(Arc::new(Mutex::new(events))), None)
        };

        let controller = Self(Arc::new(ControllerInner {
            state: Arc::new(Mutex::new(state)),
            driver,
            inline_events,
            db,
            settings,
            ledger,
            playlist,
            clock,
            sink,
            celebration,
            config,
            cancel_token: CancellationToken::new(),
            pump: Arc::new(StdMutex::new(None)),
            auto_advance: Arc::new(StdMutex::new(None)),
        }));

        if let Some(events) = pump_events {
            controller.spawn_pump(events);
        }
        controller
    }

    fn downgrade(&self) -> Weak<ControllerInner> {
        Arc::downgrade(&self.0)
    }

    /// True when counting relies on the foreground-only fallback.
    pub fn is_degraded(&self) -> bool {
        !self.driver.is_background()
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        let mut state = self.state.lock().await;
        state.sync_from_anchor(self.clock.now_ms());
        state.snapshot(self.is_degraded())
    }

    pub async fn status(&self) -> TimerStatus {
        self.state.lock().await.status
    }

    /// Start a session in `mode`, or the queued playlist task when playlist
    /// mode is on. A no-op while a session is running or paused.
    pub async fn start_timer(&self, mode: TimerMode) -> Result<TimerSnapshot> {
        self.cancel_auto_advance();
        let (mode, duration, task_name) = match self.playlist.current_task().await {
            Some(task) => (task.task_type, task.duration, Some(task.name)),
            None => (mode, self.settings.duration_for(mode), None),
        };
        self.begin_session(mode, duration, task_name).await
    }

    /// Freeze a running session. A session whose time is already up is
    /// completed instead.
    pub async fn pause_timer(&self) -> Result<TimerSnapshot> {
        if self.complete_if_elapsed().await? {
            return Ok(self.snapshot().await);
        }
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.status != TimerStatus::Running {
                return Ok(state.snapshot(self.is_degraded()));
            }
            self.driver.pause();
            state.pause(self.clock.now_ms());
            info!("Paused session with {} left", format_clock(state.remaining));
            state.snapshot(self.is_degraded())
        };
        self.clear_recovery_record().await;
        self.emit_state(snapshot.clone());
        Ok(snapshot)
    }

    pub async fn resume_timer(&self) -> Result<TimerSnapshot> {
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.status != TimerStatus::Paused {
                return Ok(state.snapshot(self.is_degraded()));
            }
            self.driver.reset();
            let generation = self.driver.start(state.remaining);
            state.resume(self.clock.now_ms(), generation);
            state.snapshot(self.is_degraded())
        };
        self.emit_state(snapshot);
        self.drain_inline().await?;
        Ok(self.snapshot().await)
    }

    /// Abandon the current session. Idle timers are left alone. A session
    /// that already ran its full length is credited before going idle.
    pub async fn reset_timer(&self) -> Result<TimerSnapshot> {
        self.complete_if_elapsed().await?;
        self.cancel_auto_advance();
        let (snapshot, cancelled) = {
            let mut state = self.state.lock().await;
            if state.status == TimerStatus::Idle {
                return Ok(state.snapshot(self.is_degraded()));
            }
            self.driver.reset();
            state.sync_from_anchor(self.clock.now_ms());
            let cancelled = if state.is_running() {
                state.session_id.clone().map(|id| (id, state.elapsed))
            } else {
                None
            };
            let mode = state.mode;
            state.reset_to(mode, self.settings.duration_for(mode));
            (state.snapshot(self.is_degraded()), cancelled)
        };

        if let Some((session_id, elapsed)) = cancelled {
            info!("Session {session_id} cancelled after {elapsed}s");
            let now = self.clock.now_utc();
            if let Err(err) = self
                .db
                .mark_session_status(&session_id, SessionStatus::Cancelled, elapsed, Some(now), now)
                .await
            {
                error!("Failed to mark session {session_id} cancelled: {err:?}");
            }
        }
        self.clear_recovery_record().await;
        self.emit_state(snapshot.clone());
        Ok(snapshot)
    }

    /// Pick the next interval after a completion: the next playlist task, or
    /// the same mode again.
    pub async fn handle_session_continue(&self) -> Result<TimerSnapshot> {
        self.cancel_auto_advance();
        self.continue_after_completion().await
    }

    /// "Take a break". Goes idle on the break mode, or starts it straight
    /// away under [`BreakPolicy::AutoStart`].
    pub async fn handle_session_break(&self) -> Result<TimerSnapshot> {
        self.cancel_auto_advance();
        let policy = self.settings.timer().break_policy;
        let (next_mode, snapshot) = {
            let mut state = self.state.lock().await;
            if state.status != TimerStatus::Completed {
                return Ok(state.snapshot(self.is_degraded()));
            }
            let next_mode = next_interval(state.mode);
            state.reset_to(next_mode, self.settings.duration_for(next_mode));
            (next_mode, state.snapshot(self.is_degraded()))
        };

        match policy {
            BreakPolicy::AutoStart => {
                self.begin_session(next_mode, self.settings.duration_for(next_mode), None)
                    .await
            }
            BreakPolicy::Idle => {
                self.emit_state(snapshot.clone());
                Ok(snapshot)
            }
        }
    }

    pub async fn dismiss_session_complete(&self) -> TimerSnapshot {
        self.cancel_auto_advance();
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.status != TimerStatus::Completed {
                return state.snapshot(self.is_degraded());
            }
            let mode = state.mode;
            state.reset_to(mode, self.settings.duration_for(mode));
            state.snapshot(self.is_degraded())
        };
        self.emit_state(snapshot.clone());
        snapshot
    }

    /// Select the mode shown while idle. Ignored while a session is active.
    pub async fn set_mode(&self, mode: TimerMode) -> TimerSnapshot {
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.is_running() {
                return state.snapshot(self.is_degraded());
            }
            state.reset_to(mode, self.settings.duration_for(mode));
            state.snapshot(self.is_degraded())
        };
        self.cancel_auto_advance();
        self.emit_state(snapshot.clone());
        snapshot
    }

    /// Rewind the playlist and start its first task, abandoning any session
    /// in progress.
    pub async fn start_playlist(&self) -> Result<TimerSnapshot> {
        self.cancel_auto_advance();
        let first = self.playlist.update(|p| p.start()).await?;
        self.reset_timer().await?;
        match self
            .begin_session(first.task_type, first.duration, Some(first.name))
            .await
        {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => {
                self.playlist.set_mode(false).await;
                Err(err)
            }
        }
    }

    /// Leave playlist mode. The current session, if any, keeps running.
    pub async fn stop_playlist(&self) {
        self.cancel_auto_advance();
        self.playlist.set_mode(false).await;
    }

    /// Shift the default duration of `mode`. Returns the new duration.
    pub async fn adjust_time(&self, mode: TimerMode, delta_secs: i64) -> Result<u64> {
        let duration = self.settings.adjust_duration(mode, delta_secs)?;
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.status == TimerStatus::Idle && state.mode == mode {
                state.reset_to(mode, duration);
                Some(state.snapshot(self.is_degraded()))
            } else {
                None
            }
        };
        if let Some(snapshot) = snapshot {
            self.emit_state(snapshot);
        }
        Ok(duration)
    }

    pub async fn on_visibility_change(&self, hidden: bool) -> Result<TimerSnapshot> {
        if self.status().await != TimerStatus::Running {
            return Ok(self.snapshot().await);
        }
        if !hidden {
            return self.refresh().await;
        }
        if self.complete_if_elapsed().await? {
            return Ok(self.snapshot().await);
        }
        if self.settings.timer().keeps_running_when_hidden() {
            self.persist_for_unload().await?;
            Ok(self.snapshot().await)
        } else {
            debug!("Page hidden; pausing timer");
            self.pause_timer().await
        }
    }

    /// Write the recovery record for a running session. Returns whether one
    /// was written.
    pub async fn persist_for_unload(&self) -> Result<bool> {
        let record = {
            let mut state = self.state.lock().await;
            state.sync_from_anchor(self.clock.now_ms());
            RecoveryRecord::from_state(&state)
        };
        match record {
            Some(record) => {
                self.db.save_state(RECOVERY_KEY, &record).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Ask the engine for the current time and apply whatever it reports.
    pub async fn refresh(&self) -> Result<TimerSnapshot> {
        self.driver.poll();
        self.drain_inline().await?;
        self.complete_if_elapsed().await?;
        Ok(self.snapshot().await)
    }

    /// Continue, complete or discard the session recorded before the last
    /// shutdown, then mark any other unfinished history rows interrupted.
    /// Safe to call more than once.
    pub async fn recover(&self) -> Result<()> {
        let now_ms = self.clock.now_ms();
        if let Some(raw) = self.db.load_state_raw(RECOVERY_KEY).await? {
            match plan_recovery(&raw, now_ms) {
                RecoveryPlan::Resume {
                    record,
                    elapsed,
                    remaining,
                } => self.resume_recorded(record, elapsed, remaining).await,
                RecoveryPlan::CompleteWhileAway { record, elapsed } => {
                    self.complete_recorded(record, elapsed).await?
                }
                RecoveryPlan::Discard { reason } => {
                    warn!("Discarding recovery record: {reason}");
                    self.clear_recovery_record().await;
                }
            }
        }

        let active = {
            let state = self.state.lock().await;
            if state.is_running() {
                state.session_id.clone()
            } else {
                None
            }
        };
        self.mark_orphaned_sessions(active.as_deref()).await;
        self.drain_inline().await
    }

    pub fn shutdown(&self) {
        self.stop_tasks();
    }

    async fn begin_session(
        &self,
        mode: TimerMode,
        duration: u64,
        task_name: Option<String>,
    ) -> Result<TimerSnapshot> {
        if duration == 0 {
            bail!("session duration must be greater than zero");
        }

        let snapshot = {
            let mut state = self.state.lock().await;
            if state.is_running() {
                debug!("Start ignored; a session is already active");
                return Ok(state.snapshot(self.is_degraded()));
            }

            let session_id = Uuid::new_v4().to_string();
            let started_at = self.clock.now_utc();
            self.db
                .insert_session(&SessionRecord {
                    id: session_id.clone(),
                    mode,
                    task_name: task_name.clone(),
                    started_at,
                    stopped_at: None,
                    status: SessionStatus::Running,
                    duration_secs: duration,
                    elapsed_secs: 0,
                    created_at: started_at,
                    updated_at: started_at,
                })
                .await?;

            self.driver.reset();
            let generation = self.driver.start(duration);
            state.begin_session(
                session_id.clone(),
                mode,
                task_name,
                duration,
                self.clock.now_ms(),
                generation,
            );
            info!(
                "Started {} session {session_id} for {}",
                mode.as_str(),
                format_clock(duration)
            );
            state.snapshot(self.is_degraded())
        };

        self.clear_recovery_record().await;
        self.emit_state(snapshot);
        self.drain_inline().await?;
        Ok(self.snapshot().await)
    }

    async fn continue_after_completion(&self) -> Result<TimerSnapshot> {
        let next = {
            let mut state = self.state.lock().await;
            if state.status != TimerStatus::Completed {
                return Ok(state.snapshot(self.is_degraded()));
            }
            let mode = state.mode;
            let next = if self.playlist.is_active().await {
                match self.playlist.update(|p| p.advance()).await {
                    Advance::Next(task) => Some((task.task_type, task.duration, Some(task.name))),
                    Advance::Exhausted => None,
                }
            } else {
                Some((mode, self.settings.duration_for(mode), None))
            };
            // leave Completed before unlocking so a second caller is a no-op
            let shown = next.as_ref().map(|(mode, _, _)| *mode).unwrap_or(mode);
            state.reset_to(shown, self.settings.duration_for(shown));
            next
        };

        match next {
            Some((mode, duration, task_name)) => {
                self.begin_session(mode, duration, task_name).await
            }
            None => {
                info!("Playlist finished");
                self.sink.emit(TimerEvent::PlaylistExhausted);
                let snapshot = self.snapshot().await;
                self.emit_state(snapshot.clone());
                Ok(snapshot)
            }
        }
    }

    async fn handle_engine_event(&self, event: EngineEvent) -> Result<()> {
        match event {
            EngineEvent::Tick {
                generation,
                remaining,
                ..
            }
            | EngineEvent::TimeUpdate {
                generation,
                remaining,
                ..
            } => {
                let snapshot = {
                    let mut state = self.state.lock().await;
                    if state.status != TimerStatus::Running
                        || state.generation != Some(generation)
                    {
                        return Ok(());
                    }
                    state.apply_progress(remaining);
                    state.snapshot(self.is_degraded())
                };
                self.emit_state(snapshot);
                Ok(())
            }
            EngineEvent::Complete { generation, .. } => {
                self.complete_session(Some(generation)).await
            }
        }
    }

    /// Complete a running session whose anchor says nothing is left, without
    /// waiting for the engine to report it. Returns whether it did.
    async fn complete_if_elapsed(&self) -> Result<bool> {
        let generation = {
            let mut state = self.state.lock().await;
            if state.status != TimerStatus::Running {
                return Ok(false);
            }
            state.sync_from_anchor(self.clock.now_ms());
            if state.remaining > 0 {
                return Ok(false);
            }
            state.generation
        };
        self.driver.pause();
        self.complete_session(generation).await?;
        self.drain_inline().await?;
        Ok(true)
    }

    /// The completion pipeline. Runs at most once per session: the state
    /// leaves `Running` under the lock before anything else happens.
    /// `generation` is `None` for completions synthesized during recovery.
    async fn complete_session(&self, generation: Option<u64>) -> Result<()> {
        let finished = {
            let mut state = self.state.lock().await;
            let accepted = match generation {
                Some(generation) => {
                    state.status == TimerStatus::Running && state.generation == Some(generation)
                }
                None => state.is_running(),
            };
            if !accepted {
                debug!("Ignoring completion for superseded generation {generation:?}");
                return Ok(());
            }
            state.complete();
            FinishedSession {
                session_id: state.session_id.clone(),
                mode: state.mode,
                task_name: state.task_name.clone(),
                duration: state.duration,
                snapshot: state.snapshot(self.is_degraded()),
            }
        };

        info!(
            "Session {} complete ({} {}s)",
            finished.session_id.as_deref().unwrap_or("-"),
            finished.mode.as_str(),
            finished.duration
        );
        self.clear_recovery_record().await;

        if let Some(session_id) = &finished.session_id {
            let now = self.clock.now_utc();
            if let Err(err) = self
                .db
                .mark_session_status(
                    session_id,
                    SessionStatus::Completed,
                    finished.duration,
                    Some(now),
                    now,
                )
                .await
            {
                error!("Failed to mark session {session_id} completed: {err:?}");
            }
        }

        let minutes = finished.duration / 60;
        let reward = match self.ledger.on_session_complete(minutes, finished.mode).await {
            Ok(reward) => Some(reward),
            Err(err) => {
                error!("Failed to record progress for completed session: {err:#}");
                None
            }
        };

        self.celebrate();
        self.emit_state(finished.snapshot);
        self.sink.emit(TimerEvent::SessionCompleted(SessionCompletedEvent {
            session_id: finished.session_id.clone(),
            mode: finished.mode,
            task_name: finished.task_name,
            duration: finished.duration,
            reward,
        }));

        if self.playlist.is_active().await {
            self.playlist.update(|p| p.mark_current_completed()).await;
            self.schedule_auto_advance(finished.session_id);
        }
        Ok(())
    }

    async fn resume_recorded(&self, record: RecoveryRecord, elapsed: u64, remaining: u64) {
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.is_running() {
                debug!("Recovery skipped; a session is already active");
                return;
            }
            let session_id = record
                .session_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());

            self.driver.reset();
            let generation = self.driver.start(remaining);
            state.begin_session(
                session_id.clone(),
                record.mode,
                record.task_name.clone(),
                record.total_duration(),
                record.start_time,
                generation,
            );
            state.apply_progress(remaining);
            info!("Resumed session {session_id}: {elapsed}s elapsed, {remaining}s left");
            state.snapshot(self.is_degraded())
        };
        self.emit_state(snapshot);
    }

    async fn complete_recorded(&self, record: RecoveryRecord, elapsed: u64) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.is_running() {
                warn!("Recorded session finished while away, but another session is active");
                drop(state);
                self.clear_recovery_record().await;
                return Ok(());
            }
            let session_id = record
                .session_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            state.begin_session(
                session_id,
                record.mode,
                record.task_name.clone(),
                elapsed,
                record.start_time,
                0,
            );
            state.generation = None;
        }
        info!("Session finished while away; completing it now");
        self.complete_session(None).await
    }

    async fn mark_orphaned_sessions(&self, keep: Option<&str>) {
        let running = match self.db.get_running_sessions().await {
            Ok(running) => running,
            Err(err) => {
                error!("Failed to load unfinished sessions: {err:?}");
                return;
            }
        };
        let now = self.clock.now_utc();
        for session in running.into_iter().filter(|s| Some(s.id.as_str()) != keep) {
            warn!("Session {} never finished; marking interrupted", session.id);
            if let Err(err) = self.db.mark_session_interrupted(&session.id, now).await {
                error!("Failed to mark session {} interrupted: {err:?}", session.id);
            }
        }
    }

    fn celebrate(&self) {
        let sound = self.settings.timer().completion_sound;
        if let Err(err) = self.celebration.play_sound(sound) {
            warn!("Completion sound failed: {err:#}");
        }
        if let Err(err) = self.celebration.confetti() {
            warn!("Confetti failed: {err:#}");
        }
    }

    fn emit_state(&self, snapshot: TimerSnapshot) {
        self.sink.emit(TimerEvent::StateChanged(snapshot));
    }

    async fn clear_recovery_record(&self) {
        if let Err(err) = self.db.delete_state(RECOVERY_KEY).await {
            error!("Failed to clear recovery record: {err:?}");
        }
    }

    async fn drain_inline(&self) -> Result<()> {
        let Some(events) = &self.inline_events else {
            return Ok(());
        };
        loop {
            let next = events.lock().await.try_recv();
            match next {
                Ok(event) => self.handle_engine_event(event).await?,
                Err(_) => return Ok(()),
            }
        }
    }

    fn spawn_pump(&self, mut events: UnboundedReceiver<EngineEvent>) {
        let controller = self.downgrade();
        let cancel_token = self.cancel_token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    event = events.recv() => {
                        let Some(event) = event else {
                            break;
                        };
                        let Some(inner) = controller.upgrade() else {
                            break;
                        };
                        if let Err(err) = TimerController(inner).handle_engine_event(event).await {
                            error!("Failed to handle countdown event: {err:#}");
                        }
                    }
                }
            }
        });
        *lock_slot(&self.pump) = Some(handle);
    }

    fn schedule_auto_advance(&self, session_id: Option<String>) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No runtime to schedule playlist auto-advance on");
            return;
        };
        let controller = self.downgrade();
        let delay = self.config.playlist_advance_delay;
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = controller.upgrade() else {
                return;
            };
            let controller = TimerController(inner);
            let still_waiting = {
                let state = controller.state.lock().await;
                state.status == TimerStatus::Completed && state.session_id == session_id
            };
            if !still_waiting || !controller.playlist.is_active().await {
                return;
            }
            if let Err(err) = controller.continue_after_completion().await {
                error!("Playlist auto-advance failed: {err:#}");
            }
        });
        if let Some(previous) = lock_slot(&self.auto_advance).replace(handle) {
            previous.abort();
        }
    }

    fn cancel_auto_advance(&self) {
        if let Some(handle) = lock_slot(&self.auto_advance).take() {
            handle.abort();
        }
    }
}

/// Interval that follows a finished session of `finished` mode.
fn next_interval(finished: TimerMode) -> TimerMode {
    if finished.is_break() {
        return TimerMode::Focus;
    }
    if rand::thread_rng().gen_bool(LONG_BREAK_PROBABILITY) {
        TimerMode::Long
    } else {
        TimerMode::Short
    }
}

fn lock_slot<T>(slot: &StdMutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use chrono::{Local, Utc};
use log::{error, info};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time,
};
use uuid::Uuid;

use crate::{
    models::SessionRecord,
    progression::{level_for_minutes, progress_within_level, LevelProgress},
    store::AccountStore,
};

use super::state::{SessionConfig, TimerPhase, TimerState};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Timer state plus the derived display values consumers re-read after a
/// change notification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub study_minutes: f64,
    pub coin_balance: i64,
    pub level: u32,
    pub level_progress: LevelProgress,
}

/// Notifications emitted after every state mutation. Consumers subscribe;
/// nothing in the crate polls.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    StateChanged(TimerSnapshot),
    AccountChanged {
        study_minutes: f64,
        coin_balance: i64,
    },
    SessionCompleted(SessionRecord),
}

/// What a single clock tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No running session; the tick was a no-op.
    Ignored,
    /// One second accrued.
    Accrued,
    /// The session just finished and its record was written.
    Completed,
}

#[derive(Clone, Copy)]
enum ClockMode {
    /// The engine spawns its own 1 Hz ticker while a session runs.
    Internal(Duration),
    /// The owner drives [`SessionAccrualEngine::tick`] from an outside clock.
    External,
}

/// Owns the single active timer session: applies the per-second accrual,
/// credits coins on whole-minute boundaries, persists counters through the
/// [`AccountStore`], and materializes a [`SessionRecord`] on completion.
#[derive(Clone)]
pub struct SessionAccrualEngine {
    state: Arc<Mutex<TimerState>>,
    account: AccountStore,
    events: broadcast::Sender<EngineEvent>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    clock: ClockMode,
}

impl SessionAccrualEngine {
    pub fn new(account: AccountStore, config: SessionConfig) -> Self {
        Self::with_clock(account, config, ClockMode::Internal(Duration::from_secs(1)))
    }

    /// Engine without the built-in ticker; the caller invokes [`tick`] once
    /// per elapsed second. Tick spacing only needs to be approximate.
    ///
    /// [`tick`]: SessionAccrualEngine::tick
    pub fn with_external_clock(account: AccountStore, config: SessionConfig) -> Self {
        Self::with_clock(account, config, ClockMode::External)
    }

    fn with_clock(account: AccountStore, config: SessionConfig, clock: ClockMode) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(TimerState::new(config))),
            account,
            events,
            ticker: Arc::new(Mutex::new(None)),
            clock,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn account(&self) -> &AccountStore {
        &self.account
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        let state = self.state.lock().await.clone();
        self.snapshot_for(state)
    }

    fn snapshot_for(&self, state: TimerState) -> TimerSnapshot {
        let study_minutes = match state.phase {
            TimerPhase::Running | TimerPhase::Paused | TimerPhase::Completed
                if state.session_id.is_some() =>
            {
                state.total_minutes()
            }
            _ => self.account.study_minutes(),
        };
        let level = level_for_minutes(study_minutes);

        TimerSnapshot {
            study_minutes,
            coin_balance: self.account.coins(),
            level,
            level_progress: progress_within_level(level, study_minutes),
            state,
        }
    }

    /// Applies a new session configuration. Accepted only while idle; a
    /// running or paused session keeps its shape.
    pub async fn configure(&self, config: SessionConfig) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.phase != TimerPhase::Idle {
                return Err(anyhow!(
                    "cannot change session configuration while a session is active"
                ));
            }
            state.apply_config(config);
        }
        self.emit_state_changed().await;
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        let baseline = self.account.study_minutes();
        {
            let mut state = self.state.lock().await;
            if state.phase != TimerPhase::Idle {
                return Err(anyhow!("timer already active"));
            }

            let session_id = Uuid::new_v4().to_string();
            info!(
                "Session {} started: {} for {} min",
                session_id,
                state.config.session_type.as_str(),
                state.planned_minutes()
            );
            state.begin_session(session_id, Utc::now(), baseline);
        }

        self.spawn_ticker().await;
        self.emit_state_changed().await;
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.phase != TimerPhase::Running {
                return Err(anyhow!("no running session to pause"));
            }
            state.phase = TimerPhase::Paused;
        }

        self.cancel_ticker().await;
        self.emit_state_changed().await;
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.phase != TimerPhase::Paused {
                return Err(anyhow!("no paused session to resume"));
            }
            state.phase = TimerPhase::Running;
        }

        self.spawn_ticker().await;
        self.emit_state_changed().await;
        Ok(())
    }

    /// Abandons the active session. No record is written; counters already
    /// persisted by earlier ticks stay as they are.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            match state.phase {
                TimerPhase::Running | TimerPhase::Paused => {}
                _ => return Err(anyhow!("no active session to stop")),
            }
            info!(
                "Session {} stopped after {}s; no record written",
                state.session_id.as_deref().unwrap_or("?"),
                state.accrued_secs
            );
            state.reset();
        }

        self.cancel_ticker().await;
        self.emit_state_changed().await;
        Ok(())
    }

    /// Leaves the completed state, ready for a new session.
    pub async fn reset(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.phase != TimerPhase::Completed {
                return Err(anyhow!("no completed session to reset"));
            }
            state.reset();
        }

        self.emit_state_changed().await;
        Ok(())
    }

    /// Records the foreground/visibility signal. Display-only state; accrual
    /// keeps running either way.
    pub async fn set_focused(&self, focused: bool) {
        {
            let mut state = self.state.lock().await;
            state.is_focused = focused;
        }
        self.emit_state_changed().await;
    }

    /// One clock tick: a second of accrual while a session is running.
    ///
    /// Decrements the remaining time, advances the persisted study-minutes
    /// total by 1/60, credits one coin when the total crosses a whole
    /// minute, and finalizes the session when the clock hits zero.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let (new_total, earned_coin, completed) = {
            let mut state = self.state.lock().await;
            if state.phase != TimerPhase::Running {
                return Ok(TickOutcome::Ignored);
            }

            let prev_total = state.total_minutes();
            state.accrued_secs += 1;
            state.time_remaining_secs = state.time_remaining_secs.saturating_sub(1);
            let new_total = state.total_minutes();
            let earned_coin = new_total.floor() > prev_total.floor();

            let completed = if state.time_remaining_secs == 0 {
                state.phase = TimerPhase::Completed;
                Some(SessionRecord {
                    id: state
                        .session_id
                        .clone()
                        .unwrap_or_else(|| Uuid::new_v4().to_string()),
                    date: Local::now().date_naive(),
                    session_type: state.config.session_type,
                    planned_minutes: state.planned_minutes(),
                    // The engine counts every running second as focused; the
                    // visibility flag stays advisory.
                    effective_minutes: state.planned_minutes(),
                    completed_at: Utc::now(),
                })
            } else {
                None
            };

            (new_total, earned_coin, completed)
        };

        self.account.set_study_minutes(new_total)?;
        let coin_balance = if earned_coin {
            self.account.credit_coins(1)?
        } else {
            self.account.coins()
        };
        let _ = self.events.send(EngineEvent::AccountChanged {
            study_minutes: new_total,
            coin_balance,
        });

        if let Some(record) = completed {
            self.account.append_session(record.clone())?;
            self.account.touch_activity(record.completed_at)?;
            info!(
                "Session {} completed: {} effective min",
                record.id, record.effective_minutes
            );

            self.emit_state_changed().await;
            let _ = self.events.send(EngineEvent::SessionCompleted(record));
            return Ok(TickOutcome::Completed);
        }

        Ok(TickOutcome::Accrued)
    }

    async fn spawn_ticker(&self) {
        let interval = match self.clock {
            ClockMode::Internal(interval) => interval,
            ClockMode::External => return,
        };

        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(interval);
            // The first tick of a tokio interval completes immediately;
            // swallow it so accrual starts one period after start/resume.
            interval.tick().await;
            loop {
                interval.tick().await;
                match engine.tick().await {
                    Ok(TickOutcome::Accrued) => {}
                    Ok(TickOutcome::Completed) | Ok(TickOutcome::Ignored) => break,
                    Err(err) => {
                        // Accrual is anchored to elapsed seconds, so the next
                        // successful tick also covers this one.
                        error!("Tick failed to persist: {err:#}");
                    }
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    async fn emit_state_changed(&self) {
        let snapshot = self.snapshot().await;
        let _ = self.events.send(EngineEvent::StateChanged(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionType;
    use crate::store::{MemoryStore, StateStore, KEY_COINS, KEY_STUDY_MINUTES};

    fn engine_with(config: SessionConfig) -> SessionAccrualEngine {
        let account = AccountStore::new(Arc::new(MemoryStore::new()));
        SessionAccrualEngine::with_external_clock(account, config)
    }

    fn seeded_engine(config: SessionConfig, minutes: &str, coins: &str) -> SessionAccrualEngine {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY_STUDY_MINUTES, minutes).unwrap();
        store.set(KEY_COINS, coins).unwrap();
        SessionAccrualEngine::with_external_clock(AccountStore::new(store), config)
    }

    async fn run_ticks(engine: &SessionAccrualEngine, count: u32) -> TickOutcome {
        let mut outcome = TickOutcome::Ignored;
        for _ in 0..count {
            outcome = engine.tick().await.unwrap();
        }
        outcome
    }

    #[tokio::test]
    async fn pomodoro_runs_to_completion() {
        let engine = engine_with(SessionConfig::pomodoro());
        engine.start().await.unwrap();

        let outcome = run_ticks(&engine, 25 * 60).await;
        assert_eq!(outcome, TickOutcome::Completed);

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.state.phase, TimerPhase::Completed);
        assert_eq!(snapshot.state.time_remaining_secs, 0);
        assert_eq!(engine.account().study_minutes(), 25.0);
        assert_eq!(engine.account().coins(), 25);

        let sessions = engine.account().sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_type, SessionType::Pomodoro);
        assert_eq!(sessions[0].planned_minutes, 25);
        assert_eq!(sessions[0].effective_minutes, 25);
        assert!(engine.account().last_activity().is_some());

        // The session is over; further ticks do nothing.
        assert_eq!(engine.tick().await.unwrap(), TickOutcome::Ignored);
        assert_eq!(engine.account().study_minutes(), 25.0);
    }

    #[tokio::test]
    async fn accrual_is_exact_per_tick() {
        let engine = engine_with(SessionConfig::custom(5));
        engine.start().await.unwrap();

        run_ticks(&engine, 90).await;
        assert_eq!(engine.account().study_minutes(), 1.5);
        assert_eq!(engine.account().coins(), 1);

        run_ticks(&engine, 30).await;
        assert_eq!(engine.account().study_minutes(), 2.0);
        assert_eq!(engine.account().coins(), 2);
    }

    #[tokio::test]
    async fn coins_credit_against_the_persisted_total() {
        // 0.5 minutes already on the account: the first boundary arrives
        // after 30 seconds, not 60.
        let engine = seeded_engine(SessionConfig::custom(5), "0.5", "3");
        engine.start().await.unwrap();

        run_ticks(&engine, 29).await;
        assert_eq!(engine.account().coins(), 3);

        run_ticks(&engine, 1).await;
        assert_eq!(engine.account().coins(), 4);
        assert_eq!(engine.account().study_minutes(), 1.0);
    }

    #[tokio::test]
    async fn stop_discards_the_record_but_keeps_accrual() {
        let engine = engine_with(SessionConfig::custom(10));
        engine.start().await.unwrap();
        run_ticks(&engine, 90).await;

        engine.stop().await.unwrap();

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.state.phase, TimerPhase::Idle);
        assert_eq!(snapshot.state.time_remaining_secs, 600);
        assert!(engine.account().sessions().is_empty());
        // Persisted counters are not rolled back.
        assert_eq!(engine.account().study_minutes(), 1.5);
        assert_eq!(engine.account().coins(), 1);
    }

    #[tokio::test]
    async fn paused_sessions_do_not_accrue() {
        let engine = engine_with(SessionConfig::custom(5));
        engine.start().await.unwrap();
        run_ticks(&engine, 10).await;

        engine.pause().await.unwrap();
        assert_eq!(engine.tick().await.unwrap(), TickOutcome::Ignored);
        assert_eq!(engine.account().study_minutes(), 10.0 / 60.0);

        engine.resume().await.unwrap();
        assert_eq!(engine.tick().await.unwrap(), TickOutcome::Accrued);
        assert_eq!(engine.account().study_minutes(), 11.0 / 60.0);
    }

    #[tokio::test]
    async fn configure_is_rejected_while_active() {
        let engine = engine_with(SessionConfig::pomodoro());
        engine.start().await.unwrap();

        assert!(engine.configure(SessionConfig::custom(50)).await.is_err());
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.state.planned_minutes(), 25);

        engine.pause().await.unwrap();
        assert!(engine.configure(SessionConfig::custom(50)).await.is_err());
    }

    #[tokio::test]
    async fn configure_while_idle_resets_the_clock_without_side_effects() {
        let engine = seeded_engine(SessionConfig::pomodoro(), "7.5", "12");

        engine.configure(SessionConfig::custom(40)).await.unwrap();

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.state.time_remaining_secs, 2400);
        assert_eq!(snapshot.state.phase, TimerPhase::Idle);
        assert_eq!(engine.account().study_minutes(), 7.5);
        assert_eq!(engine.account().coins(), 12);
    }

    #[tokio::test]
    async fn invalid_transitions_are_rejected() {
        let engine = engine_with(SessionConfig::pomodoro());

        assert!(engine.pause().await.is_err());
        assert!(engine.resume().await.is_err());
        assert!(engine.stop().await.is_err());
        assert!(engine.reset().await.is_err());

        engine.start().await.unwrap();
        assert!(engine.start().await.is_err());
        assert!(engine.resume().await.is_err());

        engine.pause().await.unwrap();
        assert!(engine.pause().await.is_err());
        assert!(engine.start().await.is_err());
    }

    #[tokio::test]
    async fn reset_leaves_the_completed_state() {
        let engine = engine_with(SessionConfig::custom(5));
        engine.start().await.unwrap();
        run_ticks(&engine, 5 * 60).await;

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.state.phase, TimerPhase::Completed);

        engine.reset().await.unwrap();
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.state.phase, TimerPhase::Idle);
        assert_eq!(snapshot.state.time_remaining_secs, 300);

        // A fresh session starts from the persisted total.
        engine.start().await.unwrap();
        run_ticks(&engine, 60).await;
        assert_eq!(engine.account().study_minutes(), 6.0);
    }

    #[tokio::test]
    async fn focus_flag_is_advisory_only() {
        let engine = engine_with(SessionConfig::custom(5));
        engine.start().await.unwrap();

        engine.set_focused(false).await;
        assert_eq!(engine.tick().await.unwrap(), TickOutcome::Accrued);
        assert_eq!(engine.account().study_minutes(), 1.0 / 60.0);

        let snapshot = engine.snapshot().await;
        assert!(!snapshot.state.is_focused);
    }

    #[tokio::test]
    async fn ticks_emit_account_change_notifications() {
        let engine = engine_with(SessionConfig::custom(5));
        let mut events = engine.subscribe();
        engine.start().await.unwrap();

        // start emits a state change first
        match events.recv().await.unwrap() {
            EngineEvent::StateChanged(snapshot) => {
                assert_eq!(snapshot.state.phase, TimerPhase::Running)
            }
            other => panic!("expected state change, got {other:?}"),
        }

        engine.tick().await.unwrap();
        match events.recv().await.unwrap() {
            EngineEvent::AccountChanged { study_minutes, .. } => {
                assert_eq!(study_minutes, 1.0 / 60.0)
            }
            other => panic!("expected account change, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn completion_emits_a_session_completed_event() {
        let engine = engine_with(SessionConfig::custom(5));
        engine.start().await.unwrap();
        run_ticks(&engine, 5 * 60).await;

        let mut saw_completion = false;
        let mut events = engine.subscribe();
        // Events were emitted before this late subscription; re-run the
        // check through a second session instead.
        engine.reset().await.unwrap();
        engine.start().await.unwrap();
        run_ticks(&engine, 5 * 60).await;

        loop {
            match events.try_recv() {
                Ok(EngineEvent::SessionCompleted(record)) => {
                    assert_eq!(record.effective_minutes, 5);
                    saw_completion = true;
                }
                Ok(_) => {}
                // The channel only retains the most recent events; skip the gap.
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        assert!(saw_completion);
        assert_eq!(engine.account().sessions().len(), 2);
    }

    #[tokio::test]
    async fn snapshot_derives_level_from_the_running_total() {
        // 9.5 minutes on the account: 30 ticks pushes it to 10.0, level 2.
        let engine = seeded_engine(SessionConfig::custom(5), "9.5", "0");

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.level, 1);

        engine.start().await.unwrap();
        run_ticks(&engine, 30).await;

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.study_minutes, 10.0);
        assert_eq!(snapshot.level, 2);
        assert_eq!(snapshot.level_progress.current, 0.0);
    }

    #[tokio::test]
    async fn internal_ticker_drives_accrual() {
        let account = AccountStore::new(Arc::new(MemoryStore::new()));
        let engine = SessionAccrualEngine::with_clock(
            account,
            SessionConfig::custom(5),
            ClockMode::Internal(Duration::from_millis(5)),
        );
        engine.start().await.unwrap();

        // Wait for the spawned ticker to apply a few ticks.
        for _ in 0..200 {
            if engine.account().study_minutes() >= 3.0 / 60.0 {
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(engine.account().study_minutes() >= 3.0 / 60.0);

        engine.stop().await.unwrap();
        let after_stop = engine.account().study_minutes();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.account().study_minutes(), after_stop);
    }
}

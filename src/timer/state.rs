use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SessionType;
use crate::progression::{MAX_SESSION_MINUTES, MIN_SESSION_MINUTES};

pub const POMODORO_MINUTES: u32 = 25;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerPhase {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
}

/// What the next session will run as. Out-of-band custom durations are
/// clamped, never rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub session_type: SessionType,
    pub custom_minutes: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::pomodoro()
    }
}

impl SessionConfig {
    pub fn pomodoro() -> Self {
        Self {
            session_type: SessionType::Pomodoro,
            custom_minutes: POMODORO_MINUTES,
        }
    }

    pub fn custom(minutes: u32) -> Self {
        Self {
            session_type: SessionType::Custom,
            custom_minutes: minutes.clamp(MIN_SESSION_MINUTES, MAX_SESSION_MINUTES),
        }
    }

    /// Duration the session will run for. Clamps again on read so a
    /// hand-edited settings file cannot smuggle in an out-of-band value.
    pub fn planned_minutes(&self) -> u32 {
        match self.session_type {
            SessionType::Pomodoro => POMODORO_MINUTES,
            SessionType::Custom => self
                .custom_minutes
                .clamp(MIN_SESSION_MINUTES, MAX_SESSION_MINUTES),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub phase: TimerPhase,
    pub config: SessionConfig,
    pub time_remaining_secs: u32,
    /// Advisory foreground/visibility flag. Display-only; it does not gate
    /// accrual.
    pub is_focused: bool,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds of accrual applied in the current session; combines with
    /// `baseline_minutes` to give the exact persisted total.
    #[serde(skip)]
    pub accrued_secs: u32,
    /// Persisted study-minutes total captured at session start.
    #[serde(skip)]
    pub baseline_minutes: f64,
}

impl TimerState {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            phase: TimerPhase::Idle,
            config,
            time_remaining_secs: config.planned_minutes() * 60,
            is_focused: true,
            session_id: None,
            started_at: None,
            accrued_secs: 0,
            baseline_minutes: 0.0,
        }
    }

    pub fn planned_minutes(&self) -> u32 {
        self.config.planned_minutes()
    }

    pub fn planned_secs(&self) -> u32 {
        self.planned_minutes() * 60
    }

    /// Account-wide study-minutes total as of the latest tick.
    pub fn total_minutes(&self) -> f64 {
        self.baseline_minutes + f64::from(self.accrued_secs) / 60.0
    }

    pub fn begin_session(
        &mut self,
        session_id: String,
        started_at: DateTime<Utc>,
        baseline_minutes: f64,
    ) {
        self.phase = TimerPhase::Running;
        self.time_remaining_secs = self.planned_secs();
        self.session_id = Some(session_id);
        self.started_at = Some(started_at);
        self.accrued_secs = 0;
        self.baseline_minutes = baseline_minutes;
    }

    /// Back to idle with the same configuration; any in-progress session is
    /// forgotten.
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    pub fn apply_config(&mut self, config: SessionConfig) {
        self.config = config;
        self.time_remaining_secs = config.planned_minutes() * 60;
    }
}

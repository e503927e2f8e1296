pub mod models;
pub mod progression;
pub mod settings;
pub mod stats;
pub mod store;
pub mod timer;

pub use models::{SessionRecord, SessionType};
pub use progression::{
    coins_for_level, is_session_valid, level_for_minutes, minutes_for_level,
    progress_within_level, session_experience, LevelProgress, MAX_SESSION_MINUTES,
    MIN_SESSION_MINUTES,
};
pub use settings::SettingsStore;
pub use stats::{
    current_streak, daily_totals, experience_summary, qualifying_sessions, summarize, DayTotal,
    StatsSummary,
};
pub use store::{AccountStore, MemoryStore, SqliteStore, StateStore};
pub use timer::{
    EngineEvent, SessionAccrualEngine, SessionConfig, TickOutcome, TimerPhase, TimerSnapshot,
    POMODORO_MINUTES,
};

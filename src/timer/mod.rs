pub mod engine;
pub mod state;

pub use engine::{EngineEvent, SessionAccrualEngine, TickOutcome, TimerSnapshot};
pub use state::{SessionConfig, TimerPhase, TimerState, POMODORO_MINUTES};

pub mod levels;
pub mod rewards;

pub use levels::{level_for_minutes, minutes_for_level, progress_within_level, LevelProgress};
pub use rewards::{
    coins_for_level, is_session_valid, session_experience, MAX_SESSION_MINUTES,
    MIN_SESSION_MINUTES,
};

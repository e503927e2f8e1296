use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionType {
    /// Fixed 25-minute focus block.
    Pomodoro,
    /// User-chosen duration, clamped to the accepted band.
    Custom,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Pomodoro => "pomodoro",
            SessionType::Custom => "custom",
        }
    }
}

/// One completed focus session. Written exactly once, at natural completion
/// of a running session, and never updated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    /// Calendar day in the user's local timezone.
    pub date: NaiveDate,
    pub session_type: SessionType,
    pub planned_minutes: u32,
    pub effective_minutes: u32,
    pub completed_at: DateTime<Utc>,
}

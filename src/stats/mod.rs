//! Aggregation over the persisted session history: daily totals for the
//! trailing week, the current streak, and reward summaries.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::models::SessionRecord;
use crate::progression::{is_session_valid, session_experience};

pub const STAT_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayTotal {
    pub date: NaiveDate,
    pub effective_minutes: u32,
    pub planned_minutes: u32,
    pub sessions: u32,
}

/// Per-day totals for the window ending at `today`, oldest day first. Days
/// without sessions appear with zeroed totals so the week always has seven
/// entries.
pub fn daily_totals(records: &[SessionRecord], today: NaiveDate) -> Vec<DayTotal> {
    (0..STAT_WINDOW_DAYS)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            let mut total = DayTotal {
                date,
                effective_minutes: 0,
                planned_minutes: 0,
                sessions: 0,
            };
            for record in records.iter().filter(|r| r.date == date) {
                total.effective_minutes += record.effective_minutes;
                total.planned_minutes += record.planned_minutes;
                total.sessions += 1;
            }
            total
        })
        .collect()
}

/// Consecutive days ending at the window's last day with any effective
/// study time.
pub fn current_streak(daily: &[DayTotal]) -> u32 {
    daily
        .iter()
        .rev()
        .take_while(|day| day.effective_minutes > 0)
        .count() as u32
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub today_minutes: u32,
    pub week_minutes: u32,
    pub streak: u32,
    pub total_sessions: u32,
}

pub fn summarize(records: &[SessionRecord], today: NaiveDate) -> StatsSummary {
    let daily = daily_totals(records, today);
    let today_minutes = daily.last().map(|day| day.effective_minutes).unwrap_or(0);

    StatsSummary {
        today_minutes,
        week_minutes: daily.iter().map(|day| day.effective_minutes).sum(),
        streak: current_streak(&daily),
        total_sessions: daily.iter().map(|day| day.sessions).sum(),
    }
}

/// Sessions that qualify for rewards under the validity rules.
pub fn qualifying_sessions(records: &[SessionRecord]) -> impl Iterator<Item = &SessionRecord> {
    records
        .iter()
        .filter(|r| is_session_valid(r.effective_minutes, r.planned_minutes))
}

/// Total experience the qualifying history is worth, with the current
/// streak's bonus applied.
pub fn experience_summary(records: &[SessionRecord], today: NaiveDate) -> u32 {
    let streak = current_streak(&daily_totals(records, today));
    qualifying_sessions(records)
        .map(|r| session_experience(r.effective_minutes, streak))
        .sum()
}

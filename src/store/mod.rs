use std::{fmt, str::FromStr, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::warn;

use crate::models::SessionRecord;

mod migrations;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub const KEY_STUDY_MINUTES: &str = "study_minutes";
pub const KEY_COINS: &str = "coins";
pub const KEY_SESSIONS: &str = "sessions";
pub const KEY_LAST_ACTIVITY: &str = "last_activity";

/// Key-value persistence contract consumed by the core. Implementations are
/// local and always available; callers treat write failures as exceptional
/// and missing/garbled reads as defaults.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Typed access to the study account counters. All reads degrade to defaults
/// on missing or malformed values; mutations go through here so every
/// consumer sees the same encoding.
#[derive(Clone)]
pub struct AccountStore {
    store: Arc<dyn StateStore>,
}

impl AccountStore {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn study_minutes(&self) -> f64 {
        self.read_or_default(KEY_STUDY_MINUTES)
    }

    pub fn set_study_minutes(&self, minutes: f64) -> Result<()> {
        self.store.set(KEY_STUDY_MINUTES, &minutes.to_string())
    }

    pub fn coins(&self) -> i64 {
        self.read_or_default(KEY_COINS)
    }

    /// Adds `amount` coins and returns the new balance.
    pub fn credit_coins(&self, amount: i64) -> Result<i64> {
        let balance = self.coins() + amount;
        self.store.set(KEY_COINS, &balance.to_string())?;
        Ok(balance)
    }

    /// Deducts `cost` coins if the balance covers it. Returns whether the
    /// spend happened; the balance never goes negative.
    pub fn try_spend(&self, cost: i64) -> Result<bool> {
        let balance = self.coins();
        if balance < cost {
            return Ok(false);
        }
        self.store.set(KEY_COINS, &(balance - cost).to_string())?;
        self.touch_activity(Utc::now())?;
        Ok(true)
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        match self.store.get(KEY_SESSIONS) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!("Discarding unreadable session list: {err}");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("Failed to read session list: {err:#}");
                Vec::new()
            }
        }
    }

    /// Appends one completed session to the persisted list. Records are
    /// immutable once written; the list only shrinks via [`clear_sessions`].
    ///
    /// [`clear_sessions`]: AccountStore::clear_sessions
    pub fn append_session(&self, record: SessionRecord) -> Result<()> {
        let mut sessions = self.sessions();
        sessions.push(record);
        self.store
            .set(KEY_SESSIONS, &serde_json::to_string(&sessions)?)
    }

    /// Drops the whole session history (account reset / sign-out).
    pub fn clear_sessions(&self) -> Result<()> {
        self.store.set(KEY_SESSIONS, "[]")
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        match self.store.get(KEY_LAST_ACTIVITY) {
            Ok(Some(raw)) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(dt) => Some(dt.with_timezone(&Utc)),
                Err(err) => {
                    warn!("Ignoring invalid last-activity timestamp '{raw}': {err}");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!("Failed to read last-activity timestamp: {err:#}");
                None
            }
        }
    }

    pub fn touch_activity(&self, at: DateTime<Utc>) -> Result<()> {
        self.store.set(KEY_LAST_ACTIVITY, &at.to_rfc3339())
    }

    fn read_or_default<T>(&self, key: &str) -> T
    where
        T: FromStr + Default,
        T::Err: fmt::Display,
    {
        match self.store.get(key) {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or_else(|err| {
                warn!("Treating unreadable '{key}' value '{raw}' as default: {err}");
                T::default()
            }),
            Ok(None) => T::default(),
            Err(err) => {
                warn!("Failed to read '{key}', using default: {err:#}");
                T::default()
            }
        }
    }
}

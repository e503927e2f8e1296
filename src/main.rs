use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::broadcast::error::RecvError;

use focuspet::{
    stats, AccountStore, EngineEvent, SessionAccrualEngine, SessionConfig, SettingsStore,
    SqliteStore, TimerPhase,
};

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("focuspet")
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let minutes: Option<u32> = std::env::args()
        .nth(1)
        .map(|arg| arg.parse())
        .transpose()
        .context("duration must be a whole number of minutes")?;

    let data_dir = data_dir();
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let store = Arc::new(SqliteStore::new(data_dir.join("focuspet.sqlite3"))?);
    let account = AccountStore::new(store);
    let settings = SettingsStore::new(data_dir.join("settings.json"))?;

    let config = match minutes {
        Some(minutes) => SessionConfig::custom(minutes),
        None => settings.timer(),
    };
    settings.update_timer(config)?;

    let engine = SessionAccrualEngine::new(account.clone(), config);
    let mut events = engine.subscribe();

    engine.start().await?;
    let snapshot = engine.snapshot().await;
    println!(
        "Focusing for {} minutes (level {}, {} coins). Ctrl-C abandons the session.",
        snapshot.state.planned_minutes(),
        snapshot.level,
        snapshot.coin_balance
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(EngineEvent::AccountChanged { .. }) => {
                    let snapshot = engine.snapshot().await;
                    let remaining = snapshot.state.time_remaining_secs;
                    if remaining > 0 && remaining % 60 == 0 {
                        println!(
                            "{:>3} min left · level {} ({:.0}%) · {} coins",
                            remaining / 60,
                            snapshot.level,
                            snapshot.level_progress.percent,
                            snapshot.coin_balance
                        );
                    }
                }
                Ok(EngineEvent::SessionCompleted(record)) => {
                    println!(
                        "Session complete: {} effective minutes recorded.",
                        record.effective_minutes
                    );
                    break;
                }
                Ok(EngineEvent::StateChanged(_)) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                let snapshot = engine.snapshot().await;
                if snapshot.state.phase != TimerPhase::Completed {
                    engine.stop().await?;
                    println!("\nSession abandoned; minutes and coins already earned are kept.");
                }
                break;
            }
        }
    }

    let snapshot = engine.snapshot().await;
    let summary = stats::summarize(&account.sessions(), Local::now().date_naive());
    println!(
        "Level {} ({:.0}% to next) · {:.1} study minutes · {} coins",
        snapshot.level,
        snapshot.level_progress.percent,
        snapshot.study_minutes,
        snapshot.coin_balance
    );
    println!(
        "Today {} min · week {} min · streak {} day(s) · {} session(s) this week",
        summary.today_minutes, summary.week_minutes, summary.streak, summary.total_sessions
    );

    Ok(())
}

//! Persistence sync: periodically flushes the runtime usage caches to
//! storage, with one unconditional final flush on shutdown so no RAM-only
//! usage or strike data is lost on a controlled stop.

use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use log::{error, info};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::state::StateStore;

const FLUSH_INTERVAL_SECS: u64 = 60;

/// Write the current in-memory totals under the day they were accumulated,
/// then handle day rollover: once yesterday's totals are safely flushed, the
/// per-day caches are cleared and the cache date advances.
pub async fn flush_usage(db: &Database, state: &StateStore) -> Result<()> {
    let snapshot = state.usage_snapshot();
    for row in &snapshot.rows {
        db.upsert_usage(&row.package, snapshot.date, row.seconds, row.strikes)
            .await?;
    }

    let today = Local::now().date_naive();
    if today != snapshot.date {
        info!(
            "day rollover: {} -> {}, clearing daily caches",
            snapshot.date, today
        );
        state.roll_over(today);
    }

    Ok(())
}

pub async fn sync_loop(db: Database, state: Arc<StateStore>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(FLUSH_INTERVAL_SECS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first interval tick fires immediately; skip it so startup does not
    // rewrite what was just loaded.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // On failure the in-memory state is kept and the flush is
                // retried on the next tick.
                if let Err(err) = flush_usage(&db, &state).await {
                    error!("usage flush failed: {err:#}");
                }
            }
            _ = cancel.cancelled() => {
                info!("persistence sync shutting down, final flush");
                if let Err(err) = flush_usage(&db, &state).await {
                    error!("final usage flush failed: {err:#}");
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flush_writes_merged_totals() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("sync.db")).unwrap();
        let today = Local::now().date_naive();
        let state = StateStore::new(today);

        state.add_usage("com.a", 120);
        state.add_strike("com.a");
        state.add_strike("com.b");

        flush_usage(&db, &state).await.unwrap();

        let rows = db.load_usage(today).await.unwrap();
        assert_eq!(rows.len(), 2);
        let a = rows.iter().find(|r| r.package == "com.a").unwrap();
        assert_eq!((a.seconds, a.strikes), (120, 1));

        // A second flush overwrites with the newer totals.
        state.add_usage("com.a", 60);
        flush_usage(&db, &state).await.unwrap();
        let rows = db.load_usage(today).await.unwrap();
        let a = rows.iter().find(|r| r.package == "com.a").unwrap();
        assert_eq!(a.seconds, 180);
    }

    #[tokio::test]
    async fn rollover_flushes_old_day_then_clears() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("sync.db")).unwrap();
        let yesterday = Local::now().date_naive() - chrono::Duration::days(1);
        let state = StateStore::new(yesterday);

        state.add_usage("com.a", 900);
        flush_usage(&db, &state).await.unwrap();

        // Yesterday's totals landed under yesterday's date.
        let rows = db.load_usage(yesterday).await.unwrap();
        assert_eq!(rows[0].seconds, 900);

        // Caches were cleared for the new day.
        assert_eq!(state.usage_secs("com.a"), 0);
        assert_eq!(state.usage_date(), Local::now().date_naive());
    }
}

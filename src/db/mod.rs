use std::{
    convert::TryFrom,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::oneshot;

mod migrations;

use crate::models::{AppPolicy, PunishmentKind, ScheduleRule};
use crate::state::UsageRow;
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("value {value} is negative"))
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .map_err(|err| anyhow!("invalid time-of-day '{value}': {err}"))
}

/// Handle to the durable store. All access is serialized through one
/// dedicated worker thread owning the SQLite connection; async callers get
/// their result back over a oneshot channel.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("appwarden-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(
                            Err(anyhow::Error::new(err).context("failed to open SQLite database")),
                        );
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    // --- app policy ---

    pub async fn load_app_policies(&self) -> Result<Vec<AppPolicy>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT package, friendly_name, daily_limit_secs, blocked
                 FROM app_policy
                 ORDER BY package",
            )?;

            let mut rows = stmt.query([])?;
            let mut policies = Vec::new();
            while let Some(row) = rows.next()? {
                policies.push(AppPolicy {
                    package: row.get(0)?,
                    friendly_name: row.get(1)?,
                    daily_limit_secs: row.get(2)?,
                    blocked: row.get::<_, i64>(3)? != 0,
                });
            }
            Ok(policies)
        })
        .await
    }

    pub async fn get_app_policy(&self, package: &str) -> Result<Option<AppPolicy>> {
        let package = package.to_string();
        self.execute(move |conn| {
            conn.query_row(
                "SELECT package, friendly_name, daily_limit_secs, blocked
                 FROM app_policy WHERE package = ?1",
                params![package],
                |row| {
                    Ok(AppPolicy {
                        package: row.get(0)?,
                        friendly_name: row.get(1)?,
                        daily_limit_secs: row.get(2)?,
                        blocked: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
        })
        .await
    }

    /// Upsert keyed on package. A `None` friendly name preserves whatever is
    /// already stored.
    pub async fn upsert_app_policy(&self, policy: &AppPolicy) -> Result<()> {
        let record = policy.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO app_policy (package, friendly_name, daily_limit_secs, blocked)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(package) DO UPDATE SET
                     friendly_name = COALESCE(excluded.friendly_name, app_policy.friendly_name),
                     daily_limit_secs = excluded.daily_limit_secs,
                     blocked = excluded.blocked",
                params![
                    record.package,
                    record.friendly_name,
                    record.daily_limit_secs,
                    record.blocked as i64,
                ],
            )
            .with_context(|| "failed to upsert app policy")?;
            Ok(())
        })
        .await
    }

    // --- daily usage ---

    pub async fn load_usage(&self, date: NaiveDate) -> Result<Vec<UsageRow>> {
        let date = date.format("%Y-%m-%d").to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT package, seconds_spent, strikes
                 FROM daily_usage WHERE usage_date = ?1",
            )?;

            let mut rows = stmt.query(params![date])?;
            let mut usage = Vec::new();
            while let Some(row) = rows.next()? {
                usage.push(UsageRow {
                    package: row.get(0)?,
                    seconds: to_u64(row.get::<_, i64>(1)?)?,
                    strikes: u32::try_from(row.get::<_, i64>(2)?).unwrap_or(0),
                });
            }
            Ok(usage)
        })
        .await
    }

    /// Overwrites seconds/strikes with the latest in-memory totals: the
    /// runtime cache, not storage, is the accumulator of record during a run.
    pub async fn upsert_usage(
        &self,
        package: &str,
        date: NaiveDate,
        seconds: u64,
        strikes: u32,
    ) -> Result<()> {
        let package = package.to_string();
        let date = date.format("%Y-%m-%d").to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO daily_usage (package, usage_date, seconds_spent, strikes)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(package, usage_date) DO UPDATE SET
                     seconds_spent = excluded.seconds_spent,
                     strikes = excluded.strikes",
                params![package, date, to_i64(seconds)?, strikes as i64],
            )
            .with_context(|| "failed to upsert daily usage")?;
            Ok(())
        })
        .await
    }

    // --- schedule rules ---

    pub async fn list_schedule_rules(&self) -> Result<Vec<ScheduleRule>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, start_time, end_time, label, study_mode, content_mode,
                        punishment_type, punishment_target
                 FROM schedule_rule
                 ORDER BY start_time",
            )?;

            let mut rows = stmt.query([])?;
            let mut rules = Vec::new();
            while let Some(row) = rows.next()? {
                rules.push(ScheduleRule {
                    id: row.get(0)?,
                    start_time: parse_time(&row.get::<_, String>(1)?)?,
                    end_time: parse_time(&row.get::<_, String>(2)?)?,
                    label: row.get(3)?,
                    study_mode: row.get::<_, i64>(4)? != 0,
                    content_mode: row.get::<_, i64>(5)? != 0,
                    punishment: PunishmentKind::parse(&row.get::<_, String>(6)?),
                    punishment_target: row.get(7)?,
                });
            }
            Ok(rules)
        })
        .await
    }

    pub async fn insert_schedule_rule(&self, rule: &ScheduleRule) -> Result<()> {
        let record = rule.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO schedule_rule
                     (id, start_time, end_time, label, study_mode, content_mode,
                      punishment_type, punishment_target)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.start_time.format("%H:%M:%S").to_string(),
                    record.end_time.format("%H:%M:%S").to_string(),
                    record.label,
                    record.study_mode as i64,
                    record.content_mode as i64,
                    record.punishment.as_str(),
                    record.punishment_target,
                ],
            )
            .with_context(|| "failed to insert schedule rule")?;
            Ok(())
        })
        .await
    }

    /// Returns `true` if a rule with that id existed.
    pub async fn delete_schedule_rule(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.execute(move |conn| {
            let affected = conn
                .execute("DELETE FROM schedule_rule WHERE id = ?1", params![id])
                .with_context(|| "failed to delete schedule rule")?;
            Ok(affected > 0)
        })
        .await
    }
}

//! Control surface: one facade owning the stores, the enforcement
//! controller, and the background tasks (schedule resolver, persistence
//! sync). Everything an operator can do goes through here.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, NaiveDate, NaiveTime};
use log::info;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classify::Classifier;
use crate::config::{ConfigStore, EffectivePolicy, ManualPreferences, PreferenceUpdate};
use crate::db::Database;
use crate::device::Device;
use crate::enforcer::{EnforcerController, EnforcerDeps};
use crate::models::{AppPolicy, PunishmentKind, ScheduleRule};
use crate::scheduler;
use crate::state::StateStore;
use crate::sync;

const STATUS_EVENT_COUNT: usize = 50;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub running: bool,
    pub current_app: String,
    pub last_verdict: String,
    pub recent_events: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReport {
    pub manual: ManualPreferences,
    pub effective: EffectivePolicy,
    pub active_schedule: Option<String>,
}

/// One managed (or merely observed) app with its live daily counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppReport {
    pub package: String,
    pub name: String,
    pub daily_limit_secs: Option<u32>,
    pub blocked: bool,
    pub seconds_today: u64,
    pub strikes_today: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEntry {
    pub package: String,
    pub name: String,
    pub minutes: u64,
    pub strikes: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub date: NaiveDate,
    pub total_minutes: u64,
    pub breakdown: Vec<AnalyticsEntry>,
}

/// Fields an operator supplies when creating a schedule rule; the id is
/// assigned on insert.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRuleDraft {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub label: String,
    pub study_mode: bool,
    pub content_mode: bool,
    #[serde(default)]
    pub punishment: PunishmentKind,
    #[serde(default)]
    pub punishment_target: String,
}

/// The daemon, assembled. Construction loads the durable caches and spawns
/// the background tasks; enforcement itself stays off until `start`.
pub struct Warden<D, C> {
    db: Database,
    state: Arc<StateStore>,
    config: Arc<ConfigStore>,
    device: D,
    classifier: C,
    enforcer: Mutex<EnforcerController>,
    background_cancel: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl<D, C> Warden<D, C>
where
    D: Device + Clone + Send + Sync + 'static,
    C: Classifier + Clone + Send + Sync + 'static,
{
    pub async fn new(
        db: Database,
        config: ConfigStore,
        device: D,
        classifier: C,
    ) -> Result<Self> {
        let today = Local::now().date_naive();
        let state = Arc::new(StateStore::new(today));
        let config = Arc::new(config);

        let policies = db.load_app_policies().await?;
        let usage = db.load_usage(today).await?;
        info!(
            "loaded {} app policies, {} usage rows for {today}",
            policies.len(),
            usage.len()
        );
        state.load(policies, usage);

        let background_cancel = CancellationToken::new();
        let resolver = tokio::spawn(scheduler::resolver_loop(
            db.clone(),
            Arc::clone(&config),
            background_cancel.clone(),
        ));
        let syncer = tokio::spawn(sync::sync_loop(
            db.clone(),
            Arc::clone(&state),
            background_cancel.clone(),
        ));

        Ok(Self {
            db,
            state,
            config,
            device,
            classifier,
            enforcer: Mutex::new(EnforcerController::new()),
            background_cancel,
            background: Mutex::new(vec![resolver, syncer]),
        })
    }

    /// Begin enforcement. Reloads the durable caches first so an edit made
    /// while stopped is picked up.
    pub async fn start(&self) -> Result<()> {
        let policies = self.db.load_app_policies().await?;
        let usage = self.db.load_usage(self.state.usage_date()).await?;
        self.state.load(policies, usage);

        let deps = EnforcerDeps {
            device: self.device.clone(),
            classifier: self.classifier.clone(),
            state: Arc::clone(&self.state),
            config: Arc::clone(&self.config),
        };
        self.enforcer.lock().await.start(deps)
    }

    /// Stop enforcement and flush the counters accumulated so far.
    pub async fn stop(&self) -> Result<()> {
        self.enforcer.lock().await.stop().await?;
        sync::flush_usage(&self.db, &self.state).await
    }

    /// Controlled teardown: stop the loop if running, then cancel the
    /// background tasks (the sync task performs its final flush on the way
    /// out) and wait for them.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut enforcer = self.enforcer.lock().await;
            if enforcer.is_active() {
                enforcer.stop().await?;
            }
        }

        self.background_cancel.cancel();
        for handle in self.background.lock().await.drain(..) {
            let _ = handle.await;
        }
        Ok(())
    }

    pub async fn status(&self) -> StatusReport {
        StatusReport {
            running: self.enforcer.lock().await.is_active(),
            current_app: self.state.current_app(),
            last_verdict: self.state.last_verdict(),
            recent_events: self.state.recent_events(STATUS_EVENT_COUNT),
        }
    }

    pub fn get_config(&self) -> ConfigReport {
        ConfigReport {
            manual: self.config.manual(),
            effective: self.config.effective(),
            active_schedule: self.config.active_schedule(),
        }
    }

    pub fn update_config(&self, update: PreferenceUpdate) -> Result<ManualPreferences> {
        self.config.update_manual(update)
    }

    /// All apps with a policy or with observed usage today, heaviest first.
    pub async fn list_apps(&self) -> Result<Vec<AppReport>> {
        let policies = self.db.load_app_policies().await?;
        let snapshot = self.state.usage_snapshot();

        let mut reports: Vec<AppReport> = policies
            .into_iter()
            .map(|policy| AppReport {
                name: display_name(&policy.package, policy.friendly_name.as_deref()),
                seconds_today: self.state.usage_secs(&policy.package),
                strikes_today: self.state.strikes(&policy.package),
                package: policy.package,
                daily_limit_secs: policy.daily_limit_secs,
                blocked: policy.blocked,
            })
            .collect();

        // Apps without a policy still accumulate usage; show them too.
        for row in snapshot.rows {
            if reports.iter().any(|r| r.package == row.package) {
                continue;
            }
            reports.push(AppReport {
                name: display_name(&row.package, None),
                package: row.package,
                daily_limit_secs: None,
                blocked: false,
                seconds_today: row.seconds,
                strikes_today: row.strikes,
            });
        }

        reports.sort_by(|a, b| b.seconds_today.cmp(&a.seconds_today));
        Ok(reports)
    }

    /// Upsert a policy and mirror the stored result into the runtime cache so
    /// the very next cycle enforces it.
    pub async fn set_app_policy(&self, policy: AppPolicy) -> Result<AppPolicy> {
        self.db.upsert_app_policy(&policy).await?;
        let stored = self
            .db
            .get_app_policy(&policy.package)
            .await?
            .unwrap_or(policy);
        self.state.set_policy(stored.clone());
        Ok(stored)
    }

    pub async fn list_schedules(&self) -> Result<Vec<ScheduleRule>> {
        self.db.list_schedule_rules().await
    }

    pub async fn add_schedule(&self, draft: ScheduleRuleDraft) -> Result<ScheduleRule> {
        let rule = ScheduleRule {
            id: Uuid::new_v4().to_string(),
            start_time: draft.start_time,
            end_time: draft.end_time,
            label: draft.label,
            study_mode: draft.study_mode,
            content_mode: draft.content_mode,
            punishment: draft.punishment,
            punishment_target: draft.punishment_target,
        };
        self.db.insert_schedule_rule(&rule).await?;
        // Re-resolve so a rule covering the current time takes effect now
        // instead of on the next resolver tick.
        scheduler::resolve_once(&self.db, &self.config).await?;
        Ok(rule)
    }

    pub async fn remove_schedule(&self, id: &str) -> Result<bool> {
        let removed = self.db.delete_schedule_rule(id).await?;
        if removed {
            scheduler::resolve_once(&self.db, &self.config).await?;
        }
        Ok(removed)
    }

    /// Today's totals in minutes, heaviest apps first, capped at `top`.
    pub async fn analytics(&self, top: usize) -> Result<AnalyticsReport> {
        let apps = self.list_apps().await?;
        let total_minutes = apps.iter().map(|a| a.seconds_today / 60).sum();

        let breakdown = apps
            .into_iter()
            .take(top)
            .map(|app| AnalyticsEntry {
                minutes: app.seconds_today / 60,
                strikes: app.strikes_today,
                package: app.package,
                name: app.name,
            })
            .collect();

        Ok(AnalyticsReport {
            date: self.state.usage_date(),
            total_minutes,
            breakdown,
        })
    }
}

/// Stored friendly name, or the last package segment capitalized
/// ("com.google.android.youtube" shows as "Youtube").
fn display_name(package: &str, friendly: Option<&str>) -> String {
    if let Some(name) = friendly {
        return name.to_string();
    }
    let segment = package.rsplit('.').next().unwrap_or(package);
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => package.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use serde_json::Value;

    #[derive(Clone)]
    struct NullDevice;

    impl Device for NullDevice {
        async fn snapshot(&self) -> Result<Value> {
            bail!("no device attached")
        }
        async fn tap(&self, _x: i32, _y: i32) -> Result<()> {
            Ok(())
        }
        async fn swipe(&self, _x1: i32, _y1: i32, _x2: i32, _y2: i32, _ms: u32) -> Result<()> {
            Ok(())
        }
        async fn press_key(&self, _code: u32) -> Result<()> {
            Ok(())
        }
        async fn launch(&self, _app_id: &str) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Clone)]
    struct NullClassifier;

    impl Classifier for NullClassifier {
        async fn classify(&self, _prompt: &str) -> Result<String> {
            Ok("RELEVANT".to_string())
        }
    }

    async fn warden() -> (tempfile::TempDir, Warden<NullDevice, NullClassifier>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("warden.db")).unwrap();
        let config = ConfigStore::ephemeral(ManualPreferences::default());
        let warden = Warden::new(db, config, NullDevice, NullClassifier)
            .await
            .unwrap();
        (dir, warden)
    }

    #[tokio::test]
    async fn policy_updates_mirror_into_runtime_cache() {
        let (_dir, warden) = warden().await;

        warden
            .set_app_policy(AppPolicy {
                package: "com.zhiliaoapp.musically".to_string(),
                friendly_name: Some("TikTok".to_string()),
                daily_limit_secs: Some(900),
                blocked: false,
            })
            .await
            .unwrap();

        let cached = warden.state.policy("com.zhiliaoapp.musically").unwrap();
        assert_eq!(cached.daily_limit_secs, Some(900));

        warden.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn list_apps_merges_policies_and_untracked_usage() {
        let (_dir, warden) = warden().await;

        warden
            .set_app_policy(AppPolicy {
                package: "com.instagram.android".to_string(),
                friendly_name: Some("Instagram".to_string()),
                daily_limit_secs: None,
                blocked: false,
            })
            .await
            .unwrap();
        warden.state.add_usage("com.instagram.android", 300);
        warden.state.add_usage("com.google.android.youtube", 600);

        let apps = warden.list_apps().await.unwrap();
        assert_eq!(apps.len(), 2);
        // Heaviest first; the policy-less app still appears, with a derived name.
        assert_eq!(apps[0].package, "com.google.android.youtube");
        assert_eq!(apps[0].name, "Youtube");
        assert_eq!(apps[1].name, "Instagram");

        warden.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn analytics_reports_minutes_and_caps_breakdown() {
        let (_dir, warden) = warden().await;

        warden.state.add_usage("com.a", 360);
        warden.state.add_usage("com.b", 120);
        warden.state.add_usage("com.c", 60);
        warden.state.add_strike("com.a");

        let report = warden.analytics(2).await.unwrap();
        assert_eq!(report.total_minutes, 9);
        assert_eq!(report.breakdown.len(), 2);
        assert_eq!(report.breakdown[0].minutes, 6);
        assert_eq!(report.breakdown[0].strikes, 1);

        warden.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn schedule_crud_assigns_ids_and_resolves() {
        let (_dir, warden) = warden().await;

        // A rule covering the whole day is active the moment it is added.
        let rule = warden
            .add_schedule(ScheduleRuleDraft {
                start_time: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
                label: "All day".to_string(),
                study_mode: true,
                content_mode: true,
                punishment: PunishmentKind::Home,
                punishment_target: String::new(),
            })
            .await
            .unwrap();
        assert!(!rule.id.is_empty());
        assert_eq!(warden.config.active_schedule().as_deref(), Some("All day"));
        assert!(warden.config.effective().study_mode);

        assert!(warden.remove_schedule(&rule.id).await.unwrap());
        assert!(warden.config.active_schedule().is_none());
        assert!(!warden.remove_schedule(&rule.id).await.unwrap());

        warden.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn status_reflects_idle_defaults() {
        let (_dir, warden) = warden().await;

        let status = warden.status().await;
        assert!(!status.running);
        assert_eq!(status.current_app, "Waiting...");
        assert_eq!(status.last_verdict, "SAFE");

        warden.shutdown().await.unwrap();
    }
}

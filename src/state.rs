use std::{
    collections::{HashMap, VecDeque},
    sync::RwLock,
    time::{Duration, Instant},
};

use chrono::NaiveDate;
use log::info;
use serde::Serialize;

use crate::models::AppPolicy;

const EVENT_CAPACITY: usize = 100;

/// One row of today's usage, as flushed to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRow {
    pub package: String,
    pub seconds: u64,
    pub strikes: u32,
}

/// Point-in-time copy of the usage caches, tagged with the calendar day the
/// data was accumulated under.
#[derive(Debug, Clone)]
pub struct UsageSnapshot {
    pub date: NaiveDate,
    pub rows: Vec<UsageRow>,
}

struct StateInner {
    policies: HashMap<String, AppPolicy>,
    usage_secs: HashMap<String, u64>,
    strikes: HashMap<String, u32>,
    penalties: HashMap<String, Instant>,
    usage_date: NaiveDate,
    current_app: String,
    last_verdict: String,
    events: VecDeque<String>,
}

/// Process-lifetime mutable caches: per-app accumulated seconds, strike
/// counts, penalty expiries, and the static policy mirror. The cache, not
/// storage, is the accumulator of record while the process runs.
pub struct StateStore {
    inner: RwLock<StateInner>,
}

impl StateStore {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            inner: RwLock::new(StateInner {
                policies: HashMap::new(),
                usage_secs: HashMap::new(),
                strikes: HashMap::new(),
                penalties: HashMap::new(),
                usage_date: today,
                current_app: "Waiting...".to_string(),
                last_verdict: "SAFE".to_string(),
                events: VecDeque::new(),
            }),
        }
    }

    /// Mirror storage into RAM at startup and on every explicit start.
    pub fn load(&self, policies: Vec<AppPolicy>, usage: Vec<UsageRow>) {
        let mut guard = self.inner.write().unwrap();
        guard.policies = policies
            .into_iter()
            .map(|p| (p.package.clone(), p))
            .collect();
        guard.usage_secs.clear();
        guard.strikes.clear();
        for row in usage {
            guard.usage_secs.insert(row.package.clone(), row.seconds);
            if row.strikes > 0 {
                guard.strikes.insert(row.package, row.strikes);
            }
        }
    }

    pub fn policy(&self, package: &str) -> Option<AppPolicy> {
        self.inner.read().unwrap().policies.get(package).cloned()
    }

    /// Administrative updates mirror into the cache immediately.
    pub fn set_policy(&self, policy: AppPolicy) {
        self.inner
            .write()
            .unwrap()
            .policies
            .insert(policy.package.clone(), policy);
    }

    /// Add observed seconds for a package; returns the new daily total.
    pub fn add_usage(&self, package: &str, seconds: u64) -> u64 {
        let mut guard = self.inner.write().unwrap();
        let total = guard.usage_secs.entry(package.to_string()).or_insert(0);
        *total += seconds;
        *total
    }

    pub fn usage_secs(&self, package: &str) -> u64 {
        self.inner
            .read()
            .unwrap()
            .usage_secs
            .get(package)
            .copied()
            .unwrap_or(0)
    }

    pub fn add_strike(&self, package: &str) -> u32 {
        let mut guard = self.inner.write().unwrap();
        let count = guard.strikes.entry(package.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn strikes(&self, package: &str) -> u32 {
        self.inner
            .read()
            .unwrap()
            .strikes
            .get(package)
            .copied()
            .unwrap_or(0)
    }

    /// Open (or extend) the penalty window for a package.
    pub fn set_penalty(&self, package: &str, duration: Duration) {
        let expiry = Instant::now() + duration;
        self.inner
            .write()
            .unwrap()
            .penalties
            .insert(package.to_string(), expiry);
    }

    /// Entries are never deleted; expiry comparison clears them implicitly.
    pub fn is_penalized(&self, package: &str) -> bool {
        self.inner
            .read()
            .unwrap()
            .penalties
            .get(package)
            .map(|expiry| Instant::now() < *expiry)
            .unwrap_or(false)
    }

    /// Merged view over the usage and strike caches (a package may have
    /// strikes without accumulated time, and vice versa).
    pub fn usage_snapshot(&self) -> UsageSnapshot {
        let guard = self.inner.read().unwrap();
        let mut packages: Vec<&String> = guard
            .usage_secs
            .keys()
            .chain(guard.strikes.keys())
            .collect();
        packages.sort();
        packages.dedup();

        let rows = packages
            .into_iter()
            .map(|pkg| UsageRow {
                package: pkg.clone(),
                seconds: guard.usage_secs.get(pkg).copied().unwrap_or(0),
                strikes: guard.strikes.get(pkg).copied().unwrap_or(0),
            })
            .collect();

        UsageSnapshot {
            date: guard.usage_date,
            rows,
        }
    }

    pub fn usage_date(&self) -> NaiveDate {
        self.inner.read().unwrap().usage_date
    }

    /// Day rollover: clear the per-day caches and advance the cache date.
    /// Called by the persistence sync after the old day has been flushed.
    pub fn roll_over(&self, today: NaiveDate) {
        let mut guard = self.inner.write().unwrap();
        guard.usage_secs.clear();
        guard.strikes.clear();
        guard.penalties.clear();
        guard.usage_date = today;
    }

    pub fn set_current_app(&self, name: &str) {
        self.inner.write().unwrap().current_app = name.to_string();
    }

    pub fn current_app(&self) -> String {
        self.inner.read().unwrap().current_app.clone()
    }

    pub fn set_last_verdict(&self, verdict: &str) {
        self.inner.write().unwrap().last_verdict = verdict.to_string();
    }

    pub fn last_verdict(&self) -> String {
        self.inner.read().unwrap().last_verdict.clone()
    }

    /// Append to the dashboard event buffer (capped) and the process log.
    pub fn record_event(&self, message: String) {
        info!("{message}");
        let mut guard = self.inner.write().unwrap();
        guard.events.push_back(message);
        while guard.events.len() > EVENT_CAPACITY {
            guard.events.pop_front();
        }
    }

    pub fn recent_events(&self, count: usize) -> Vec<String> {
        let guard = self.inner.read().unwrap();
        let skip = guard.events.len().saturating_sub(count);
        guard.events.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> StateStore {
        StateStore::new(NaiveDate::from_ymd_opt(2026, 8, 24).unwrap())
    }

    #[test]
    fn usage_and_strikes_accumulate() {
        let s = store();
        assert_eq!(s.add_usage("com.a", 2), 2);
        assert_eq!(s.add_usage("com.a", 2), 4);
        assert_eq!(s.usage_secs("com.a"), 4);
        assert_eq!(s.usage_secs("com.b"), 0);

        assert_eq!(s.add_strike("com.a"), 1);
        assert_eq!(s.add_strike("com.a"), 2);
        assert_eq!(s.strikes("com.b"), 0);
    }

    #[test]
    fn penalty_expires() {
        let s = store();
        assert!(!s.is_penalized("com.a"));
        s.set_penalty("com.a", Duration::from_secs(60));
        assert!(s.is_penalized("com.a"));
        s.set_penalty("com.a", Duration::ZERO);
        assert!(!s.is_penalized("com.a"));
    }

    #[test]
    fn snapshot_merges_usage_and_strike_keys() {
        let s = store();
        s.add_usage("com.a", 120);
        s.add_strike("com.b");

        let snap = s.usage_snapshot();
        assert_eq!(snap.rows.len(), 2);
        let a = snap.rows.iter().find(|r| r.package == "com.a").unwrap();
        assert_eq!((a.seconds, a.strikes), (120, 0));
        let b = snap.rows.iter().find(|r| r.package == "com.b").unwrap();
        assert_eq!((b.seconds, b.strikes), (0, 1));
    }

    #[test]
    fn roll_over_clears_daily_caches_but_keeps_policies() {
        let s = store();
        s.set_policy(AppPolicy {
            package: "com.a".to_string(),
            friendly_name: None,
            daily_limit_secs: Some(600),
            blocked: false,
        });
        s.add_usage("com.a", 500);
        s.add_strike("com.a");

        let next = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        s.roll_over(next);

        assert_eq!(s.usage_secs("com.a"), 0);
        assert_eq!(s.strikes("com.a"), 0);
        assert_eq!(s.usage_date(), next);
        assert!(s.policy("com.a").is_some());
    }

    #[test]
    fn event_buffer_is_capped() {
        let s = store();
        for i in 0..150 {
            s.record_event(format!("event {i}"));
        }
        let recent = s.recent_events(200);
        assert_eq!(recent.len(), EVENT_CAPACITY);
        assert_eq!(recent.last().unwrap(), "event 149");

        assert_eq!(s.recent_events(2), vec!["event 148", "event 149"]);
    }
}

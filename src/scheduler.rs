//! Schedule-priority resolver: a small independent task that keeps the
//! effective policy in sync with the configured time windows. Runs on its own
//! cadence; the enforcement loop only ever reads the result.

use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, NaiveTime};
use log::{info, warn};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ConfigStore;
use crate::db::Database;
use crate::models::ScheduleRule;

const RESOLVE_INTERVAL_SECS: u64 = 5;

/// First matching rule wins; rules arrive ordered by start time. Overlaps are
/// a configuration smell, so a multi-match logs a warning but still resolves.
pub fn resolve_active(rules: &[ScheduleRule], now: NaiveTime) -> Option<&ScheduleRule> {
    let mut matching = rules.iter().filter(|rule| rule_matches(rule, now));
    let first = matching.next();
    if first.is_some() && matching.next().is_some() {
        warn!("overlapping schedule rules match {now}; first match wins");
    }
    first
}

/// An end before the start means the window wraps past midnight.
fn rule_matches(rule: &ScheduleRule, now: NaiveTime) -> bool {
    if rule.start_time <= rule.end_time {
        rule.start_time <= now && now <= rule.end_time
    } else {
        now >= rule.start_time || now <= rule.end_time
    }
}

pub async fn resolve_once(db: &Database, config: &ConfigStore) -> Result<()> {
    let rules = db.list_schedule_rules().await?;
    let now = Local::now().time();
    match resolve_active(&rules, now) {
        Some(rule) => config.apply_schedule(rule),
        None => config.restore_manual(),
    }
    Ok(())
}

pub async fn resolver_loop(db: Database, config: Arc<ConfigStore>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(RESOLVE_INTERVAL_SECS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = resolve_once(&db, &config).await {
                    warn!("schedule resolution failed: {err:#}");
                }
            }
            _ = cancel.cancelled() => {
                info!("schedule resolver shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PunishmentKind;

    fn rule(id: &str, start: (u32, u32), end: (u32, u32)) -> ScheduleRule {
        ScheduleRule {
            id: id.to_string(),
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            label: id.to_string(),
            study_mode: true,
            content_mode: true,
            punishment: PunishmentKind::Home,
            punishment_target: String::new(),
        }
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn daytime_window() {
        let rules = vec![rule("work", (9, 0), (17, 0))];
        assert!(resolve_active(&rules, at(12, 0)).is_some());
        assert!(resolve_active(&rules, at(9, 0)).is_some());
        assert!(resolve_active(&rules, at(17, 0)).is_some());
        assert!(resolve_active(&rules, at(20, 0)).is_none());
        assert!(resolve_active(&rules, at(8, 59)).is_none());
    }

    #[test]
    fn overnight_window_wraps_past_midnight() {
        let rules = vec![rule("night", (22, 0), (2, 0))];
        assert!(resolve_active(&rules, at(23, 30)).is_some());
        assert!(resolve_active(&rules, at(1, 0)).is_some());
        assert!(resolve_active(&rules, at(10, 0)).is_none());
        assert!(resolve_active(&rules, at(21, 59)).is_none());
    }

    #[test]
    fn first_match_wins_on_overlap() {
        let rules = vec![rule("first", (9, 0), (17, 0)), rule("second", (12, 0), (18, 0))];
        assert_eq!(resolve_active(&rules, at(13, 0)).unwrap().id, "first");
        assert_eq!(resolve_active(&rules, at(17, 30)).unwrap().id, "second");
    }

    #[test]
    fn no_rules_no_match() {
        assert!(resolve_active(&[], at(12, 0)).is_none());
    }
}

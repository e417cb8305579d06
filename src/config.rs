use std::{fs, path::PathBuf, sync::RwLock};

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::models::{PunishmentKind, ScheduleRule};

/// Administrator-set preferences. These survive restarts (JSON file) and are
/// the fallback the effective policy reverts to whenever no schedule rule is
/// active.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManualPreferences {
    pub persona: String,
    pub focus: String,
    pub study_mode: bool,
    pub content_mode: bool,
    pub grace_period_secs: u64,
    pub max_strikes: u32,
    pub penalty_secs: u64,
    pub punishment: PunishmentKind,
    pub punishment_target: String,
}

impl Default for ManualPreferences {
    fn default() -> Self {
        Self {
            persona: "CS Undergrad".to_string(),
            focus: "Data Structures and Algorithms, Maths, Development, AI".to_string(),
            study_mode: false,
            content_mode: true,
            grace_period_secs: 10,
            max_strikes: 3,
            penalty_secs: 60,
            punishment: PunishmentKind::Home,
            punishment_target: String::new(),
        }
    }
}

/// The policy actually enforced this instant, read by the enforcement loop
/// once per cycle. Mutated only by the schedule resolver and by manual
/// updates when no schedule is overriding.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectivePolicy {
    pub persona: String,
    pub focus: String,
    pub study_mode: bool,
    pub content_mode: bool,
    pub punishment: PunishmentKind,
    pub punishment_target: String,
    pub grace_period_secs: u64,
    pub penalty_secs: u64,
}

/// Partial update from the control surface; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreferenceUpdate {
    pub persona: Option<String>,
    pub focus: Option<String>,
    pub study_mode: Option<bool>,
    pub content_mode: Option<bool>,
    pub grace_period_secs: Option<u64>,
    pub max_strikes: Option<u32>,
    pub penalty_secs: Option<u64>,
    pub punishment: Option<PunishmentKind>,
    pub punishment_target: Option<String>,
}

struct ConfigInner {
    manual: ManualPreferences,
    effective: EffectivePolicy,
    /// Label of the schedule rule currently overriding, if any.
    active_schedule: Option<String>,
}

/// Process-wide policy configuration. Single-writer lock: the resolver and
/// the control surface write, the enforcement loop takes one snapshot per
/// cycle so a rule change never lands mid-iteration.
pub struct ConfigStore {
    path: Option<PathBuf>,
    data: RwLock<ConfigInner>,
}

impl ConfigStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let manual = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read preferences from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            ManualPreferences::default()
        };
        Ok(Self::with_manual(Some(path), manual))
    }

    /// In-memory store, used by tests.
    pub fn ephemeral(manual: ManualPreferences) -> Self {
        Self::with_manual(None, manual)
    }

    fn with_manual(path: Option<PathBuf>, manual: ManualPreferences) -> Self {
        let effective = effective_from_manual(&manual);
        Self {
            path,
            data: RwLock::new(ConfigInner {
                manual,
                effective,
                active_schedule: None,
            }),
        }
    }

    pub fn effective(&self) -> EffectivePolicy {
        self.data.read().unwrap().effective.clone()
    }

    pub fn manual(&self) -> ManualPreferences {
        self.data.read().unwrap().manual.clone()
    }

    pub fn active_schedule(&self) -> Option<String> {
        self.data.read().unwrap().active_schedule.clone()
    }

    /// Schedule override: the effective policy is overwritten wholesale from
    /// the rule's quadruple and the rule label becomes the focus description.
    pub fn apply_schedule(&self, rule: &ScheduleRule) {
        let mut guard = self.data.write().unwrap();
        if guard.active_schedule.as_deref() != Some(rule.label.as_str()) {
            info!("schedule rule active: {}", rule.label);
        }
        guard.effective = EffectivePolicy {
            persona: guard.manual.persona.clone(),
            focus: format!("SCHEDULE: {}", rule.label),
            study_mode: rule.study_mode,
            content_mode: rule.content_mode,
            punishment: rule.punishment,
            punishment_target: rule.punishment_target.clone(),
            grace_period_secs: guard.manual.grace_period_secs,
            penalty_secs: guard.manual.penalty_secs,
        };
        guard.active_schedule = Some(rule.label.clone());
    }

    /// No rule active: the effective policy reverts exactly to the last
    /// manually-set preferences.
    pub fn restore_manual(&self) {
        let mut guard = self.data.write().unwrap();
        if guard.active_schedule.take().is_some() {
            info!("no schedule rule active, manual preferences restored");
        }
        guard.effective = effective_from_manual(&guard.manual);
    }

    /// Control-surface update. Touches the manual record always, and the live
    /// effective policy only when no schedule is currently overriding.
    pub fn update_manual(&self, update: PreferenceUpdate) -> Result<ManualPreferences> {
        let updated = {
            let mut guard = self.data.write().unwrap();
            let manual = &mut guard.manual;
            if let Some(persona) = update.persona {
                manual.persona = persona;
            }
            if let Some(focus) = update.focus {
                manual.focus = focus;
            }
            if let Some(study) = update.study_mode {
                manual.study_mode = study;
            }
            if let Some(content) = update.content_mode {
                manual.content_mode = content;
            }
            if let Some(grace) = update.grace_period_secs {
                manual.grace_period_secs = grace;
            }
            if let Some(max) = update.max_strikes {
                manual.max_strikes = max;
            }
            if let Some(penalty) = update.penalty_secs {
                manual.penalty_secs = penalty;
            }
            if let Some(punishment) = update.punishment {
                manual.punishment = punishment;
            }
            if let Some(target) = update.punishment_target {
                manual.punishment_target = target;
            }
            // Study mode implies content checks.
            if manual.study_mode {
                manual.content_mode = true;
            }

            if guard.active_schedule.is_none() {
                guard.effective = effective_from_manual(&guard.manual);
            }
            guard.manual.clone()
        };

        self.persist(&updated)?;
        Ok(updated)
    }

    fn persist(&self, manual: &ManualPreferences) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(manual)?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write preferences to {}", path.display()))
    }
}

fn effective_from_manual(manual: &ManualPreferences) -> EffectivePolicy {
    EffectivePolicy {
        persona: manual.persona.clone(),
        focus: manual.focus.clone(),
        study_mode: manual.study_mode,
        // Mirrors the manual-update path: study mode forces content checks.
        content_mode: manual.content_mode || manual.study_mode,
        punishment: manual.punishment,
        punishment_target: manual.punishment_target.clone(),
        grace_period_secs: manual.grace_period_secs,
        penalty_secs: manual.penalty_secs,
    }
}

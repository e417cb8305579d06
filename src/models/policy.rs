use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Corrective action taken when a policy violation is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PunishmentKind {
    Home,
    Back,
    OpenApp,
}

impl PunishmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PunishmentKind::Home => "HOME",
            PunishmentKind::Back => "BACK",
            PunishmentKind::OpenApp => "OPEN_APP",
        }
    }

    /// Unknown values fall back to `Home`, the default corrective action.
    pub fn parse(value: &str) -> Self {
        match value {
            "BACK" => PunishmentKind::Back,
            "OPEN_APP" => PunishmentKind::OpenApp,
            _ => PunishmentKind::Home,
        }
    }
}

impl Default for PunishmentKind {
    fn default() -> Self {
        PunishmentKind::Home
    }
}

/// Static per-app rule mirrored from storage into the runtime state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPolicy {
    pub package: String,
    pub friendly_name: Option<String>,
    /// `None` means no daily limit.
    pub daily_limit_secs: Option<u32>,
    pub blocked: bool,
}

/// Time-of-day window that overrides the manual preferences while active.
/// An `end_time` earlier than `start_time` represents an overnight window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRule {
    pub id: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub label: String,
    pub study_mode: bool,
    pub content_mode: bool,
    pub punishment: PunishmentKind,
    pub punishment_target: String,
}

//! appwarden: screen-usage policy enforcement for a monitored Android
//! device. A fixed-cadence loop observes the foreground app over adb,
//! accumulates usage against per-app policies, runs heuristic and semantic
//! distraction checks, and executes the configured punishment when a policy
//! is violated.

pub mod classify;
pub mod config;
pub mod db;
pub mod device;
pub mod enforcer;
pub mod heuristics;
pub mod models;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod surface;
pub mod sync;

pub use classify::{Classifier, OllamaClassifier};
pub use config::{ConfigStore, EffectivePolicy, ManualPreferences, PreferenceUpdate};
pub use db::Database;
pub use device::{AdbDevice, Device};
pub use models::{AppPolicy, PunishmentKind, ScheduleRule};
pub use state::StateStore;
pub use surface::Warden;

mod policy;
mod ui;

pub use policy::{AppPolicy, PunishmentKind, ScheduleRule};
pub use ui::{Bounds, DeviceState, UiNode};

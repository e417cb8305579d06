//! Device-automation seam: the primitive input/observation contract the
//! enforcement loop is written against, plus the adb-backed production
//! implementation.

use std::future::Future;

use anyhow::Result;
use serde_json::Value;

mod adb;

pub use adb::AdbDevice;

/// Android key codes used by the punishment executor.
pub const KEY_HOME: u32 = 3;
pub const KEY_BACK: u32 = 4;

/// Device automation collaborator. All calls are fire-and-forget beyond
/// success/failure and must be internally bounded in time so a stalled
/// device cannot wedge the loop.
pub trait Device {
    /// One internally-consistent snapshot of the device UI (raw payload,
    /// decoded defensively by the caller).
    fn snapshot(&self) -> impl Future<Output = Result<Value>> + Send;

    fn tap(&self, x: i32, y: i32) -> impl Future<Output = Result<()>> + Send;

    fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    ) -> impl Future<Output = Result<()>> + Send;

    fn press_key(&self, code: u32) -> impl Future<Output = Result<()>> + Send;

    fn launch(&self, app_id: &str) -> impl Future<Output = Result<()>> + Send;
}

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use tokio::process::Command;

use super::Device;

const COMMAND_TIMEOUT_SECS: u64 = 10;

/// Production device bridge: shells out to the `adb` binary. UI snapshots
/// come from the on-device portal's state provider; input actions go through
/// `input`/`monkey`.
#[derive(Clone)]
pub struct AdbDevice {
    adb_path: String,
    serial: Option<String>,
}

impl AdbDevice {
    pub fn new(adb_path: impl Into<String>, serial: Option<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            serial,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.adb_path);
        if let Some(serial) = &self.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.args(args);

        let output = tokio::time::timeout(
            Duration::from_secs(COMMAND_TIMEOUT_SECS),
            cmd.output(),
        )
        .await
        .map_err(|_| anyhow!("adb command timed out after {COMMAND_TIMEOUT_SECS}s: {args:?}"))?
        .with_context(|| format!("failed to run {} {:?}", self.adb_path, args))?;

        if !output.status.success() {
            bail!(
                "adb exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Device for AdbDevice {
    async fn snapshot(&self) -> Result<Value> {
        let raw = self
            .run(&[
                "shell",
                "content",
                "read",
                "--uri",
                "content://com.droidrun.portal/state",
            ])
            .await?;
        serde_json::from_str(raw.trim()).context("device returned malformed state payload")
    }

    async fn tap(&self, x: i32, y: i32) -> Result<()> {
        let (x, y) = (x.to_string(), y.to_string());
        self.run(&["shell", "input", "tap", &x, &y]).await?;
        Ok(())
    }

    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u32) -> Result<()> {
        let args: Vec<String> = [x1, y1, x2, y2, duration_ms as i32]
            .iter()
            .map(|v| v.to_string())
            .collect();
        self.run(&[
            "shell", "input", "swipe", &args[0], &args[1], &args[2], &args[3], &args[4],
        ])
        .await?;
        Ok(())
    }

    async fn press_key(&self, code: u32) -> Result<()> {
        let code = code.to_string();
        self.run(&["shell", "input", "keyevent", &code]).await?;
        Ok(())
    }

    async fn launch(&self, app_id: &str) -> Result<()> {
        self.run(&[
            "shell",
            "monkey",
            "-p",
            app_id,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::device::KEY_BACK;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    /// Stand-in adb binary that appends its argument list to a log file.
    fn fake_adb(dir: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let log = dir.join("calls.log");
        let bin = dir.join("adb");
        fs::write(
            &bin,
            format!("#!/bin/sh\necho \"$@\" >> '{}'\n", log.display()),
        )
        .unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
        (bin, log)
    }

    #[tokio::test]
    async fn input_actions_build_full_invocations() {
        let dir = tempfile::tempdir().unwrap();
        let (bin, log) = fake_adb(dir.path());
        let device = AdbDevice::new(
            bin.to_string_lossy(),
            Some("emulator-5554".to_string()),
        );

        device.tap(1200, 500).await.unwrap();
        device.swipe(1200, 500, 1200, 500, 50).await.unwrap();
        device.press_key(KEY_BACK).await.unwrap();
        device.launch("com.duolingo").await.unwrap();

        let calls = fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(lines[0], "-s emulator-5554 shell input tap 1200 500");
        assert_eq!(
            lines[1],
            "-s emulator-5554 shell input swipe 1200 500 1200 500 50"
        );
        assert_eq!(lines[2], "-s emulator-5554 shell input keyevent 4");
        assert_eq!(
            lines[3],
            "-s emulator-5554 shell monkey -p com.duolingo -c android.intent.category.LAUNCHER 1"
        );
    }

    #[tokio::test]
    async fn serial_flag_is_omitted_without_a_serial() {
        let dir = tempfile::tempdir().unwrap();
        let (bin, log) = fake_adb(dir.path());
        let device = AdbDevice::new(bin.to_string_lossy(), None);

        device.tap(10, 20).await.unwrap();

        let calls = fs::read_to_string(&log).unwrap();
        assert_eq!(calls.trim(), "shell input tap 10 20");
    }
}

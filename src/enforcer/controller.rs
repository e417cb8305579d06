use anyhow::{bail, Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classify::Classifier;
use crate::device::Device;

use super::loop_worker::{enforcement_loop, EnforcerDeps};

/// Owns the enforcement loop task: start spawns it, stop cancels between
/// cycles and waits for the task to join.
pub struct EnforcerController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl EnforcerController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn start<D, C>(&mut self, deps: EnforcerDeps<D, C>) -> Result<()>
    where
        D: Device + Send + Sync + 'static,
        C: Classifier + Send + Sync + 'static,
    {
        if self.is_active() {
            bail!("enforcement already active");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        let handle = tokio::spawn(enforcement_loop(deps, token_clone));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("enforcement loop task failed to join")?;
        }
        Ok(())
    }
}

impl Default for EnforcerController {
    fn default() -> Self {
        Self::new()
    }
}

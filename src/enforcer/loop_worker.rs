use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::classify::{build_prompt, is_distraction, Classifier};
use crate::config::{ConfigStore, EffectivePolicy};
use crate::device::{Device, KEY_BACK, KEY_HOME};
use crate::heuristics::{
    clean_for_prompt, is_browser, is_browser_distraction, is_exempt, is_messaging_safe,
    is_short_form_video, needs_deep_analysis,
};
use crate::models::{DeviceState, PunishmentKind};
use crate::session::SessionTracker;
use crate::snapshot::{flatten, FlattenedSignal};
use crate::state::StateStore;

const CYCLE_INTERVAL_SECS: u64 = 2;
/// Upper bound on one whole cycle, classification included. A stalled device
/// or model must not wedge the loop.
const CYCLE_TIMEOUT_SECS: u64 = 45;
const IDLE_SLEEP_SECS: u64 = 2;
const GRACE_SLEEP_SECS: u64 = 1;
const ERROR_SLEEP_SECS: u64 = 5;

/// Tap point for the landscape reveal probe, and how long the overlay needs
/// to fade in afterwards.
const PROBE_X: i32 = 1200;
const PROBE_Y: i32 = 500;
const PROBE_TAP_MS: u32 = 50;
const PROBE_SETTLE_MS: u64 = 1000;

/// Below this many characters of cleaned text the semantic call is skipped
/// entirely (insufficient signal, no verdict recorded).
const MIN_PROMPT_LEN: usize = 10;

/// Everything one enforcement cycle needs. The device and classifier are the
/// only operations that may suspend.
pub struct EnforcerDeps<D, C> {
    pub device: D,
    pub classifier: C,
    pub state: Arc<StateStore>,
    pub config: Arc<ConfigStore>,
}

pub async fn enforcement_loop<D, C>(deps: EnforcerDeps<D, C>, cancel: CancellationToken)
where
    D: Device + Send + Sync + 'static,
    C: Classifier + Send + Sync + 'static,
{
    let mut tracker = SessionTracker::new();
    info!("enforcement loop started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let delay = tokio::select! {
            outcome = tokio::time::timeout(
                Duration::from_secs(CYCLE_TIMEOUT_SECS),
                run_cycle(&deps, &mut tracker),
            ) => match outcome {
                Ok(Ok(delay)) => delay,
                Ok(Err(err)) => {
                    error!("enforcement cycle failed: {err:#}");
                    Duration::from_secs(ERROR_SLEEP_SECS)
                }
                Err(_) => {
                    warn!("enforcement cycle timed out (> {CYCLE_TIMEOUT_SECS}s)");
                    Duration::from_secs(ERROR_SLEEP_SECS)
                }
            },
            _ = cancel.cancelled() => break,
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => break,
        }
    }

    info!("enforcement loop shutting down");
}

/// One full observe-decide-enforce cycle. Returns how long to idle before the
/// next cycle.
pub(crate) async fn run_cycle<D: Device, C: Classifier>(
    deps: &EnforcerDeps<D, C>,
    tracker: &mut SessionTracker,
) -> Result<Duration> {
    let payload = deps.device.snapshot().await?;
    let snap = DeviceState::from_payload(&payload);
    let package = snap.package.clone();
    let display = if snap.app_name.is_empty() {
        package.clone()
    } else {
        snap.app_name.clone()
    };
    deps.state.set_current_app(&display);

    let policy = deps.config.effective();

    let switched = tracker.observe(
        &package,
        &display,
        Instant::now(),
        Duration::from_secs(policy.penalty_secs),
        is_exempt(&package),
    );
    if switched {
        deps.state.record_event(format!("App switch: {display}"));
    }

    if is_exempt(&package) {
        return Ok(Duration::from_secs(IDLE_SLEEP_SECS));
    }

    let used = deps.state.add_usage(&package, CYCLE_INTERVAL_SECS);

    // Hard limits come before any content inspection.
    if let Some(rule) = deps.state.policy(&package) {
        if rule.blocked {
            deps.state.record_event(format!("Blocked app: {package}"));
            punish(&deps.device, &policy).await;
            return Ok(Duration::from_secs(CYCLE_INTERVAL_SECS));
        }
        if let Some(limit) = rule.daily_limit_secs {
            if used >= u64::from(limit) {
                deps.state
                    .record_event(format!("Daily limit reached: {package}"));
                punish(&deps.device, &policy).await;
                return Ok(Duration::from_secs(CYCLE_INTERVAL_SECS));
            }
        }
    }

    // An active penalty or an anti-cheat reopen collapses the grace period
    // to zero. Browsers are checked even during grace: they reach
    // distracting content faster than the grace period accounts for.
    let grace = if deps.state.is_penalized(&package) || tracker.instant_check() {
        Duration::ZERO
    } else {
        Duration::from_secs(policy.grace_period_secs)
    };
    if tracker.session_elapsed(Instant::now()) < grace && !is_browser(&package) {
        return Ok(Duration::from_secs(GRACE_SLEEP_SECS));
    }

    let signal = flatten(&snap.tree);

    if is_browser(&package) {
        if let Some(reason) = is_browser_distraction(&signal.texts) {
            violation(deps, &package, &reason, &policy).await;
            return Ok(Duration::from_secs(CYCLE_INTERVAL_SECS));
        }
    }

    if policy.content_mode || policy.study_mode {
        if package.contains("youtube") {
            if let Some(reason) = is_short_form_video(&signal.texts) {
                violation(deps, &package, reason, &policy).await;
                return Ok(Duration::from_secs(CYCLE_INTERVAL_SECS));
            }
        }
        if package.contains("instagram") && !is_messaging_safe(&signal.texts) {
            violation(deps, &package, "Feed scrolling detected", &policy).await;
            return Ok(Duration::from_secs(CYCLE_INTERVAL_SECS));
        }
    }

    if policy.study_mode && needs_deep_analysis(&package) {
        semantic_check(deps, tracker, &package, &signal, &policy).await?;
    }

    Ok(Duration::from_secs(CYCLE_INTERVAL_SECS))
}

/// Slow lane: landscape reveal probe, content-hash deduplication, then the
/// external classification call. Classification failure is fail-open: logged,
/// no verdict recorded, no enforcement this cycle.
async fn semantic_check<D: Device, C: Classifier>(
    deps: &EnforcerDeps<D, C>,
    tracker: &mut SessionTracker,
    package: &str,
    signal: &FlattenedSignal,
    policy: &EffectivePolicy,
) -> Result<()> {
    // Landscape already probed this session: keep the previous verdict in
    // force without another device round-trip.
    if signal.is_landscape && tracker.landscape_probed() {
        if is_distraction(tracker.last_verdict()) {
            punish(&deps.device, policy).await;
        }
        return Ok(());
    }

    let (texts, content_key) = if signal.is_landscape {
        // Landscape players hide their chrome; one synthetic tap reveals the
        // title overlay. Probe at most once per session.
        deps.state
            .record_event("Landscape player: tapping to reveal overlay".to_string());
        deps.device
            .swipe(PROBE_X, PROBE_Y, PROBE_X, PROBE_Y, PROBE_TAP_MS)
            .await?;
        tokio::time::sleep(Duration::from_millis(PROBE_SETTLE_MS)).await;

        let payload = deps.device.snapshot().await?;
        let probed = flatten(&DeviceState::from_payload(&payload).tree);
        tracker.set_landscape_probed(true);
        let key = probed.content_key();
        (probed.texts, key)
    } else {
        tracker.set_landscape_probed(false);
        (signal.texts.clone(), signal.content_key())
    };

    // Static screen: re-apply the cached verdict instead of paying for
    // another classification.
    if content_key == tracker.content_hash() {
        if is_distraction(tracker.last_verdict()) {
            punish(&deps.device, policy).await;
        }
        return Ok(());
    }

    let content = clean_for_prompt(&texts);
    if content.len() < MIN_PROMPT_LEN {
        return Ok(());
    }

    let preview: String = content.chars().take(40).collect();
    deps.state.record_event(format!("Analyzing: {preview}..."));

    let prompt = build_prompt(&policy.persona, &policy.focus, &content);
    match deps.classifier.classify(&prompt).await {
        Ok(reply) => {
            let verdict = reply.trim().to_uppercase();
            deps.state.record_event(format!("Verdict: {verdict}"));
            deps.state.set_last_verdict(&verdict);
            tracker.set_last_verdict(verdict.clone());
            tracker.set_content_hash(content_key);

            if is_distraction(&verdict) {
                violation(deps, package, "Semantic distraction", policy).await;
            }
        }
        Err(err) => {
            warn!("classification call failed: {err:#}");
            deps.state
                .record_event(format!("Classifier unavailable: {err}"));
        }
    }

    Ok(())
}

/// Record a strike, open the penalty window, and execute the punishment.
async fn violation<D: Device, C: Classifier>(
    deps: &EnforcerDeps<D, C>,
    package: &str,
    reason: &str,
    policy: &EffectivePolicy,
) {
    let total = deps.state.add_strike(package);
    deps.state
        .set_penalty(package, Duration::from_secs(policy.penalty_secs));
    deps.state
        .record_event(format!("VIOLATION ({reason}): {package}, strike {total}"));
    punish(&deps.device, policy).await;
}

/// Execute the configured punishment. Any failure is logged and the cycle
/// proceeds.
pub(crate) async fn punish<D: Device>(device: &D, policy: &EffectivePolicy) {
    let result = match policy.punishment {
        PunishmentKind::Back => device.press_key(KEY_BACK).await,
        PunishmentKind::OpenApp if !policy.punishment_target.is_empty() => {
            device.launch(&policy.punishment_target).await
        }
        _ => device.press_key(KEY_HOME).await,
    };

    if let Err(err) = result {
        error!("punishment action failed: {err:#}");
    }
}

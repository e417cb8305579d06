use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

/// Per-foreground-app session state, owned by the enforcement loop.
///
/// Detects app switches, resets per-session flags, and applies the anti-cheat
/// rule: reopening a package shortly after leaving it forfeits the grace
/// period on the new session ("instant check").
pub struct SessionTracker {
    package: String,
    app_name: String,
    session_start: Instant,
    content_hash: String,
    last_verdict: String,
    landscape_probed: bool,
    instant_check: bool,
    last_left: HashMap<String, Instant>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            package: String::new(),
            app_name: String::new(),
            session_start: Instant::now(),
            content_hash: String::new(),
            last_verdict: "SAFE".to_string(),
            landscape_probed: false,
            instant_check: false,
            last_left: HashMap::new(),
        }
    }

    /// Advance the tracker with this cycle's foreground app. Returns `true`
    /// on an app switch. `reopen_window` is the anti-cheat threshold; it does
    /// not apply to exempt (whitelisted/launcher) packages.
    pub fn observe(
        &mut self,
        package: &str,
        app_name: &str,
        now: Instant,
        reopen_window: Duration,
        exempt: bool,
    ) -> bool {
        if package == self.package {
            return false;
        }

        if !self.package.is_empty() {
            self.last_left.insert(self.package.clone(), now);
        }

        self.instant_check = !exempt
            && self
                .last_left
                .get(package)
                .map(|left| now.duration_since(*left) < reopen_window)
                .unwrap_or(false);

        self.package = package.to_string();
        self.app_name = app_name.to_string();
        self.session_start = now;
        self.content_hash.clear();
        self.last_verdict = "SAFE".to_string();
        self.landscape_probed = false;
        true
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn session_elapsed(&self, now: Instant) -> Duration {
        now.duration_since(self.session_start)
    }

    /// True when the current session was opened inside the reopen window.
    pub fn instant_check(&self) -> bool {
        self.instant_check
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn set_content_hash(&mut self, hash: String) {
        self.content_hash = hash;
    }

    pub fn last_verdict(&self) -> &str {
        &self.last_verdict
    }

    pub fn set_last_verdict(&mut self, verdict: String) {
        self.last_verdict = verdict;
    }

    pub fn landscape_probed(&self) -> bool {
        self.landscape_probed
    }

    pub fn set_landscape_probed(&mut self, probed: bool) {
        self.landscape_probed = probed;
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn switch_resets_session_flags() {
        let mut t = SessionTracker::new();
        let t0 = Instant::now();

        assert!(t.observe("com.a", "A", t0, WINDOW, false));
        t.set_content_hash("hash".to_string());
        t.set_last_verdict("DISTRACTION".to_string());
        t.set_landscape_probed(true);

        assert!(!t.observe("com.a", "A", t0 + Duration::from_secs(2), WINDOW, false));
        assert_eq!(t.content_hash(), "hash");

        assert!(t.observe("com.b", "B", t0 + Duration::from_secs(4), WINDOW, false));
        assert_eq!(t.content_hash(), "");
        assert_eq!(t.last_verdict(), "SAFE");
        assert!(!t.landscape_probed());
    }

    #[test]
    fn reopen_inside_window_forces_instant_check() {
        let mut t = SessionTracker::new();
        let t0 = Instant::now();

        t.observe("com.a", "A", t0, WINDOW, false);
        // Leave at T0+10, come back at T0+30: inside the 60s window.
        t.observe("com.b", "B", t0 + Duration::from_secs(10), WINDOW, false);
        t.observe("com.a", "A", t0 + Duration::from_secs(30), WINDOW, false);
        assert!(t.instant_check());
    }

    #[test]
    fn reopen_after_window_keeps_grace() {
        let mut t = SessionTracker::new();
        let t0 = Instant::now();

        t.observe("com.a", "A", t0, WINDOW, false);
        t.observe("com.b", "B", t0 + Duration::from_secs(10), WINDOW, false);
        // Back at T0+100: 90s since leaving, outside the window.
        t.observe("com.a", "A", t0 + Duration::from_secs(100), WINDOW, false);
        assert!(!t.instant_check());
    }

    #[test]
    fn exempt_packages_never_get_instant_check() {
        let mut t = SessionTracker::new();
        let t0 = Instant::now();

        t.observe("com.android.launcher3", "Home", t0, WINDOW, true);
        t.observe("com.a", "A", t0 + Duration::from_secs(1), WINDOW, false);
        t.observe(
            "com.android.launcher3",
            "Home",
            t0 + Duration::from_secs(2),
            WINDOW,
            true,
        );
        assert!(!t.instant_check());
    }

    #[test]
    fn first_open_has_no_instant_check() {
        let mut t = SessionTracker::new();
        t.observe("com.a", "A", Instant::now(), WINDOW, false);
        assert!(!t.instant_check());
    }

    #[test]
    fn session_elapsed_counts_from_switch() {
        let mut t = SessionTracker::new();
        let t0 = Instant::now();
        t.observe("com.a", "A", t0, WINDOW, false);
        assert_eq!(
            t.session_elapsed(t0 + Duration::from_secs(7)),
            Duration::from_secs(7)
        );
    }
}

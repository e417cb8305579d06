//! Fast, local classification lane: pure substring checks over the flattened
//! signal. A positive result here short-circuits the cycle before any
//! semantic call is made.

/// Direct-message indicators that whitelist a messaging view against the feed.
const DM_INDICATORS: [&str; 4] = [
    "Type a message",
    "Message...",
    "Active now",
    "Voice message",
];

/// Player-container identifiers for short-form video. Intentionally narrow:
/// feed-level ids like `reel_feed` must not trip this.
const SHORTS_MARKERS: [&str; 2] = ["reel_recycler", "reel_player"];

/// Distraction domains as they leak into browser chrome and tab titles.
const BROWSER_TRIGGERS: [&str; 6] = [
    "instagram.com",
    "m.instagram",
    "youtube.com/shorts",
    "m.youtube.com/shorts",
    "tiktok.com",
    "facebook.com/reel",
];

/// Generic control labels stripped before prompting the classifier.
const NOISE_LABELS: [&str; 5] = ["more_vert", "Search", "Close", "Minimize", "Cast"];

/// Packages skipped by the loop entirely (launchers, system surfaces).
const WHITELIST: [&str; 7] = [
    "com.sec.android.app.launcher",
    "com.google.android.apps.nexuslauncher",
    "com.android.launcher3",
    "com.miui.home",
    "com.android.systemui",
    "com.android.settings",
    "com.google.android.inputmethod.latin",
];

/// Apps whose ambiguous content goes through the semantic lane.
const DEEP_ANALYSIS_MARKERS: [&str; 1] = ["youtube"];

pub fn is_messaging_safe(texts: &[String]) -> bool {
    let joined = texts.join(" ");
    DM_INDICATORS.iter().any(|phrase| joined.contains(phrase))
}

/// Strict player-container check. Returns the reason string on a hit.
pub fn is_short_form_video(texts: &[String]) -> Option<&'static str> {
    let joined = texts.join(" ");
    if SHORTS_MARKERS.iter().any(|marker| joined.contains(marker)) {
        Some("Shorts Player Detected")
    } else {
        None
    }
}

/// Browser URL-bar and tab-title leakage. Case-insensitive.
pub fn is_browser_distraction(texts: &[String]) -> Option<String> {
    let combined = texts.join(" ").to_lowercase();

    for trigger in BROWSER_TRIGGERS {
        if combined.contains(trigger) {
            return Some(format!("Browser URL detected: {trigger}"));
        }
    }

    // Browsers hide the URL bar on scroll; "shorts" next to browser chrome is
    // still a giveaway.
    if combined.contains("shorts") && (combined.contains("address bar") || combined.contains("tab"))
    {
        return Some("Browser Shorts detected".to_string());
    }

    None
}

/// Strip known-noise lines and join the rest for the classification prompt:
/// package/class tokens, `digits:digits` timestamps, generic control labels.
pub fn clean_for_prompt(texts: &[String]) -> String {
    let kept: Vec<&str> = texts
        .iter()
        .map(String::as_str)
        .filter(|line| {
            !line.contains("com.")
                && !line.contains("android.")
                && !line.contains("resourceId")
                && !has_clock_pattern(line)
                && !NOISE_LABELS.contains(line)
        })
        .collect();
    kept.join(" | ")
}

/// True if the line contains a `digit:digit` sequence (timestamps, durations).
fn has_clock_pattern(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.windows(3).any(|w| {
        w[0].is_ascii_digit() && w[1] == b':' && w[2].is_ascii_digit()
    })
}

pub fn is_browser(package: &str) -> bool {
    package.contains("chrome") || package.contains("browser")
}

/// Whitelisted packages plus the launcher heuristic.
pub fn is_exempt(package: &str) -> bool {
    WHITELIST.contains(&package) || package.contains("launcher")
}

pub fn needs_deep_analysis(package: &str) -> bool {
    DEEP_ANALYSIS_MARKERS
        .iter()
        .any(|marker| package.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dm_view_is_safe() {
        assert!(is_messaging_safe(&texts(&["alice", "Type a message"])));
        assert!(!is_messaging_safe(&texts(&["Suggested for you", "Follow"])));
    }

    #[test]
    fn shorts_player_detection_is_strict() {
        let hit = texts(&["watch this", "com.app:id/reel_player_overlay"]);
        assert_eq!(is_short_form_video(&hit), Some("Shorts Player Detected"));

        // Feed-level identifiers must not trigger.
        assert_eq!(is_short_form_video(&texts(&["Shorts", "Subscriptions"])), None);
    }

    #[test]
    fn browser_url_leakage() {
        // Triggers are scanned in declaration order, so the bare domain form
        // is the one reported for the mobile URL too.
        let reason = is_browser_distraction(&texts(&["m.youtube.com/shorts - Chrome"]));
        assert!(reason.unwrap().contains("youtube.com/shorts"));

        assert!(is_browser_distraction(&texts(&["TikTok.com"])).is_some());
        assert!(is_browser_distraction(&texts(&["wikipedia.org"])).is_none());
    }

    #[test]
    fn browser_shorts_needs_chrome_indicator() {
        assert!(is_browser_distraction(&texts(&["Shorts", "New tab"])).is_some());
        assert!(is_browser_distraction(&texts(&["Shorts"])).is_none());
    }

    #[test]
    fn prompt_cleaning_strips_noise() {
        let input = texts(&[
            "Graph Theory Lecture 4",
            "com.google.android.youtube:id/player",
            "12:34",
            "Search",
            "by MIT OpenCourseWare",
        ]);
        assert_eq!(
            clean_for_prompt(&input),
            "Graph Theory Lecture 4 | by MIT OpenCourseWare"
        );
    }

    #[test]
    fn clock_pattern_matches_inside_lines() {
        assert!(has_clock_pattern("duration 10:05"));
        assert!(!has_clock_pattern("score 10 : 5"));
        assert!(!has_clock_pattern("plain text"));
    }

    #[test]
    fn exemptions() {
        assert!(is_exempt("com.android.systemui"));
        assert!(is_exempt("com.oneplus.launcher"));
        assert!(!is_exempt("com.google.android.youtube"));
    }

    #[test]
    fn browser_and_deep_analysis_markers() {
        assert!(is_browser("com.android.chrome"));
        assert!(is_browser("org.mozilla.browser"));
        assert!(!is_browser("com.instagram.android"));
        assert!(needs_deep_analysis("com.google.android.youtube"));
        assert!(!needs_deep_analysis("com.instagram.android"));
    }
}

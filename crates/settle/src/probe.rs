//! Indicator probes.
//!
//! Each [`Probe`] renders a self-contained JavaScript expression that reads
//! one dimension of page activity and returns a JSON object. The matching
//! reading type deserializes that object. Page-side counters such as
//! `window.__activeRequests` are ad hoc instrumentation the application
//! may not define, so every numeric field defaults to zero.

use crate::page::SettlePage;
use crate::result::{SettleError, SettleResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Loader patterns every page is checked for
pub const BUILTIN_LOADER_SELECTORS: &[&str] = &[
    r#"[class*="loading"]"#,
    r#"[class*="spinner"]"#,
    r#"[class*="loader"]"#,
    r#"[id*="loading"]"#,
    r#"[id*="spinner"]"#,
    r#"[id*="loader"]"#,
    ".fa-spin",
    ".fa-spinner",
    ".fa-circle-o-notch",
    r#"[aria-label*="loading"]"#,
    r#"[aria-label*="Loading"]"#,
    ".loading-overlay",
    ".spinner-border",
    ".spinner-grow",
    "#loading",
];

/// Cheap loader check used by the quick-action wait
const QUICK_LOADER_SELECTOR: &str =
    r#"[class*="loading"], [class*="spinner"], .fa-spin, .loading-overlay"#;

/// Regions whose leading text is fingerprinted, first match wins
const MAIN_CONTENT_SELECTOR: &str = "main, #main, .main, body";

const IS_VISIBLE_JS: &str = r#"const isVisible = (el) => {
        const style = window.getComputedStyle(el);
        return style.display !== 'none'
            && style.visibility !== 'hidden'
            && parseFloat(style.opacity || '1') > 0
            && (el.offsetParent !== null || style.position === 'fixed');
    };"#;

const ANY_VISIBLE_JS: &str = r#"const anyVisible = (selectors) => selectors.some((selector) => {
        try {
            return Array.from(document.querySelectorAll(selector)).some(isVisible);
        } catch (e) {
            return false;
        }
    });"#;

// =============================================================================
// LOADER SELECTORS
// =============================================================================

/// Built-in loader patterns plus caller extras
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderSelectors {
    selectors: Vec<String>,
}

impl Default for LoaderSelectors {
    fn default() -> Self {
        Self {
            selectors: BUILTIN_LOADER_SELECTORS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl LoaderSelectors {
    /// Built-in set with `extra` appended
    #[must_use]
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> Self {
        let mut loaders = Self::default();
        for pattern in extra {
            loaders.push(pattern.as_ref());
        }
        loaders
    }

    /// Append one pattern.
    ///
    /// A bare identifier (`busy-overlay`) is read as a class name; anything
    /// else is used as a CSS selector verbatim. Blank patterns and
    /// duplicates are ignored.
    pub fn push(&mut self, pattern: &str) {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return;
        }
        let selector = if is_bare_identifier(pattern) {
            format!(".{pattern}")
        } else {
            pattern.to_string()
        };
        if !self.selectors.contains(&selector) {
            self.selectors.push(selector);
        }
    }

    /// All selectors, built-ins first
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.selectors
    }

    /// Number of selectors
    #[must_use]
    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    /// Always false, the built-in set is never empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Whether `selector` (already normalized) is in the set
    #[must_use]
    pub fn contains(&self, selector: &str) -> bool {
        self.selectors.iter().any(|s| s == selector)
    }

    fn to_js_array(&self) -> String {
        serde_json::Value::from(self.selectors.clone()).to_string()
    }
}

fn is_bare_identifier(pattern: &str) -> bool {
    let mut chars = pattern.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

// =============================================================================
// PROBES
// =============================================================================

/// A page-side check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<'a> {
    /// In-flight requests and promise counters
    Network {
        /// Resource entries started within this window count as recent
        recent_window_ms: u64,
    },
    /// Pending timers, intervals, animation frames and readiness
    Script,
    /// Loader visibility and the leading main-content text
    Ui {
        /// Loader patterns
        loaders: &'a LoaderSelectors,
        /// Characters of main content to sample
        sample_chars: usize,
    },
    /// Combined network-activity and loader check
    Action {
        /// Loader patterns
        loaders: &'a LoaderSelectors,
        /// Resource entries started within this window count as recent
        recent_window_ms: u64,
    },
    /// Loader visibility only
    Loaders {
        /// Loader patterns
        loaders: &'a LoaderSelectors,
    },
    /// Cheap loader and request-counter check
    QuickAction,
    /// Names of resource-timing entries that finished
    CompletedResources,
    /// Whether an element matching `selector` is visible
    SelectorVisible {
        /// CSS selector
        selector: &'a str,
    },
}

impl Probe<'_> {
    /// Short name used in logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Script => "script",
            Self::Ui { .. } => "ui",
            Self::Action { .. } => "action",
            Self::Loaders { .. } => "loaders",
            Self::QuickAction => "quick-action",
            Self::CompletedResources => "completed-resources",
            Self::SelectorVisible { .. } => "selector-visible",
        }
    }

    /// Render the JavaScript expression for this probe
    #[must_use]
    pub fn script(&self) -> String {
        match self {
            Self::Network { recent_window_ms } => format!(
                r#"(() => {{
    const now = performance.now();
    const recentRequests = performance.getEntriesByType('resource').filter((entry) => {{
        const isRecent = entry.startTime > now - {recent_window_ms};
        const isApiCall = entry.initiatorType === 'xmlhttprequest'
            || entry.initiatorType === 'fetch'
            || entry.name.includes('/api/')
            || entry.name.includes('.json')
            || entry.name.includes('ajax');
        return isRecent && isApiCall && !entry.responseEnd;
    }}).length;
    return {{
        activeRequests: Number(window.__activeRequests) || 0,
        recentRequests,
        pendingPromises: Number(window.__pendingPromises) || 0,
    }};
}})()"#
            ),
            Self::Script => r#"(() => ({
    activeTimeouts: Number(window.__activeTimeouts) || 0,
    activeIntervals: Number(window.__activeIntervals) || 0,
    animationFrames: Number(window.__activeAnimationFrames) || 0,
    documentComplete: document.readyState === 'complete',
}))()"#
                .to_string(),
            Self::Ui {
                loaders,
                sample_chars,
            } => format!(
                r#"(() => {{
    {IS_VISIBLE_JS}
    {ANY_VISIBLE_JS}
    const main = document.querySelector({main});
    const text = main && main.textContent ? main.textContent.trim() : '';
    return {{
        visibleLoaders: anyVisible({selectors}),
        content: text.substring(0, {sample_chars}),
    }};
}})()"#,
                main = js_string(MAIN_CONTENT_SELECTOR),
                selectors = loaders.to_js_array(),
            ),
            Self::Action {
                loaders,
                recent_window_ms,
            } => format!(
                r#"(() => {{
    {IS_VISIBLE_JS}
    {ANY_VISIBLE_JS}
    const now = performance.now();
    const activeRequests = Number(window.__activeRequests) || 0;
    const recentActivity = performance.getEntriesByType('resource').some((entry) =>
        entry.startTime > now - {recent_window_ms}
        && (entry.initiatorType === 'xmlhttprequest' || entry.initiatorType === 'fetch')
        && !entry.responseEnd);
    return {{
        networkActive: activeRequests > 0 || recentActivity,
        visibleLoaders: anyVisible({selectors}),
    }};
}})()"#,
                selectors = loaders.to_js_array(),
            ),
            Self::Loaders { loaders } => format!(
                r#"(() => {{
    {IS_VISIBLE_JS}
    {ANY_VISIBLE_JS}
    return {{ visibleLoaders: anyVisible({selectors}) }};
}})()"#,
                selectors = loaders.to_js_array(),
            ),
            Self::QuickAction => format!(
                r#"(() => ({{
    ready: document.querySelector({selector}) === null
        && (Number(window.__activeRequests) || 0) === 0,
}}))()"#,
                selector = js_string(QUICK_LOADER_SELECTOR),
            ),
            Self::CompletedResources => r#"(() => ({
    names: performance.getEntriesByType('resource')
        .filter((entry) => entry.responseEnd > 0)
        .map((entry) => entry.name),
}))()"#
                .to_string(),
            Self::SelectorVisible { selector } => format!(
                r#"(() => {{
    {IS_VISIBLE_JS}
    try {{
        return {{ visible: Array.from(document.querySelectorAll({selector})).some(isVisible) }};
    }} catch (e) {{
        return {{ visible: false }};
    }}
}})()"#,
                selector = js_string(selector),
            ),
        }
    }
}

/// Run `probe` on `page` and deserialize the reading it returns
pub async fn read<T, P>(page: &P, probe: &Probe<'_>) -> SettleResult<T>
where
    T: DeserializeOwned,
    P: SettlePage + ?Sized,
{
    let value = page.probe(probe).await?;
    serde_json::from_value(value).map_err(|e| {
        SettleError::evaluation(format!("{} probe returned unexpected shape: {e}", probe.name()))
    })
}

// =============================================================================
// READINGS
// =============================================================================

/// Network activity snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkReading {
    /// `window.__activeRequests`
    pub active_requests: u64,
    /// Recent API resource entries without `responseEnd`
    pub recent_requests: u64,
    /// `window.__pendingPromises`
    pub pending_promises: u64,
}

impl NetworkReading {
    /// Composite activity score
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.active_requests + self.recent_requests + self.pending_promises
    }

    /// No activity of any kind
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.total() == 0
    }
}

/// Script activity snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptReading {
    /// `window.__activeTimeouts`
    pub active_timeouts: u64,
    /// `window.__activeIntervals`
    pub active_intervals: u64,
    /// `window.__activeAnimationFrames`
    pub animation_frames: u64,
    /// `document.readyState === 'complete'`
    pub document_complete: bool,
}

impl ScriptReading {
    /// Pending timer and frame count
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.active_timeouts + self.active_intervals + self.animation_frames
    }

    /// Document ready and nothing scheduled
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.document_complete && self.total() == 0
    }
}

/// Visual state snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UiReading {
    /// Any loader pattern matched a visible element
    pub visible_loaders: bool,
    /// Leading main-content text
    pub content: String,
}

impl UiReading {
    /// Fingerprint of the content sample
    #[must_use]
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of(&self.content)
    }
}

/// Action-complete snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionReading {
    /// Request counter or recent unfinished XHR/fetch entry
    pub network_active: bool,
    /// Any loader pattern matched a visible element
    pub visible_loaders: bool,
}

impl ActionReading {
    /// Neither network nor loaders active
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        !self.network_active && !self.visible_loaders
    }
}

/// Loader visibility snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderReading {
    /// Any loader pattern matched a visible element
    pub visible_loaders: bool,
}

/// Quick readiness snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuickReading {
    /// No quick loader and no active requests
    pub ready: bool,
}

/// Finished resource names
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResourceReading {
    /// URLs of completed resource-timing entries
    pub names: Vec<String>,
}

/// Element visibility snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VisibilityReading {
    /// A matching element is visible
    pub visible: bool,
}

// =============================================================================
// CONTENT HASH
// =============================================================================

/// SHA-256 fingerprint of a content sample
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash `content`
    #[must_use]
    pub fn of(content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        let result = hasher.finalize();
        Self(format!("{result:x}"))
    }

    /// Hex digest
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0[..12.min(self.0.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod loader_selector_tests {
        use super::*;

        #[test]
        fn test_default_has_builtins() {
            let loaders = LoaderSelectors::default();
            assert_eq!(loaders.len(), BUILTIN_LOADER_SELECTORS.len());
            assert!(loaders.contains("#loading"));
            assert!(!loaders.is_empty());
        }

        #[test]
        fn test_bare_identifier_becomes_class() {
            let loaders = LoaderSelectors::with_extra(&["busy-overlay"]);
            assert!(loaders.contains(".busy-overlay"));
            assert!(!loaders.contains("busy-overlay"));
        }

        #[test]
        fn test_selector_kept_verbatim() {
            let loaders = LoaderSelectors::with_extra(&["[data-pending='true']", ".x .y"]);
            assert!(loaders.contains("[data-pending='true']"));
            assert!(loaders.contains(".x .y"));
        }

        #[test]
        fn test_blank_and_duplicate_ignored() {
            let loaders = LoaderSelectors::with_extra(&["", "  ", ".fa-spin", "busy", ".busy"]);
            assert_eq!(loaders.len(), BUILTIN_LOADER_SELECTORS.len() + 1);
        }

        #[test]
        fn test_extras_come_last() {
            let loaders = LoaderSelectors::with_extra(&["zzz"]);
            assert_eq!(loaders.as_slice().last().map(String::as_str), Some(".zzz"));
        }
    }

    mod script_tests {
        use super::*;

        #[test]
        fn test_ui_script_embeds_selectors_as_json() {
            let loaders = LoaderSelectors::with_extra(&[r#"[title="a'b"]"#]);
            let script = Probe::Ui {
                loaders: &loaders,
                sample_chars: 500,
            }
            .script();
            assert!(script.contains(r#""[title=\"a'b\"]""#));
            assert!(script.contains("substring(0, 500)"));
            assert!(script.contains(r#""main, #main, .main, body""#));
        }

        #[test]
        fn test_network_script_uses_window() {
            let script = Probe::Network {
                recent_window_ms: 2000,
            }
            .script();
            assert!(script.contains("now - 2000"));
            assert!(script.contains("__activeRequests"));
            assert!(script.contains("__pendingPromises"));
        }

        #[test]
        fn test_selector_visible_escapes() {
            let script = Probe::SelectorVisible {
                selector: "#a\"b",
            }
            .script();
            assert!(script.contains(r##""#a\"b""##));
        }

        #[test]
        fn test_probe_names_unique() {
            let loaders = LoaderSelectors::default();
            let probes = [
                Probe::Network { recent_window_ms: 1 },
                Probe::Script,
                Probe::Ui {
                    loaders: &loaders,
                    sample_chars: 1,
                },
                Probe::Action {
                    loaders: &loaders,
                    recent_window_ms: 1,
                },
                Probe::Loaders { loaders: &loaders },
                Probe::QuickAction,
                Probe::CompletedResources,
                Probe::SelectorVisible { selector: "a" },
            ];
            let mut names: Vec<_> = probes.iter().map(Probe::name).collect();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), probes.len());
        }
    }

    mod reading_tests {
        use super::*;
        use serde_json::json;

        #[test]
        fn test_missing_counters_default_to_zero() {
            let reading: NetworkReading = serde_json::from_value(json!({})).unwrap();
            assert!(reading.is_idle());
        }

        #[test]
        fn test_network_total() {
            let reading: NetworkReading = serde_json::from_value(
                json!({"activeRequests": 2, "recentRequests": 1, "pendingPromises": 3}),
            )
            .unwrap();
            assert_eq!(reading.total(), 6);
            assert!(!reading.is_idle());
        }

        #[test]
        fn test_script_requires_complete_document() {
            let loading: ScriptReading =
                serde_json::from_value(json!({"documentComplete": false})).unwrap();
            assert!(!loading.is_idle());
            let busy: ScriptReading = serde_json::from_value(
                json!({"documentComplete": true, "animationFrames": 1}),
            )
            .unwrap();
            assert!(!busy.is_idle());
            let idle: ScriptReading =
                serde_json::from_value(json!({"documentComplete": true})).unwrap();
            assert!(idle.is_idle());
        }

        #[test]
        fn test_action_complete() {
            let reading = ActionReading {
                network_active: false,
                visible_loaders: true,
            };
            assert!(!reading.is_complete());
            assert!(ActionReading::default().is_complete());
        }
    }

    mod content_hash_tests {
        use super::*;

        #[test]
        fn test_same_content_same_hash() {
            assert_eq!(ContentHash::of("Reports"), ContentHash::of("Reports"));
            assert_ne!(ContentHash::of("Reports"), ContentHash::of("Reports 1"));
        }

        #[test]
        fn test_hash_is_hex_sha256() {
            let hash = ContentHash::of("");
            assert_eq!(hash.as_str().len(), 64);
            assert!(hash
                .as_str()
                .starts_with("e3b0c44298fc1c149afbf4c8996fb924"));
            assert_eq!(hash.to_string().len(), 12);
        }
    }
}

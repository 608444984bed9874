use url::Url;

use crate::origin_policy;

/// Marker the web UI reads to tell the desktop shell apart from a browser.
pub const DESKTOP_BRIDGE_BRAND: &str = "WeChatDataAnalysisDesktop";

static DESKTOP_BRIDGE_BOOTSTRAP_TEMPLATE: &str = include_str!("bridge_bootstrap.js");

fn js_literal<T: serde::Serialize + ?Sized>(value: &T, fallback: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| fallback.to_string())
}

/// Bootstrap script registered as a webview initialization script, so it runs
/// before any page script on every navigation. Pages outside
/// `trusted_origins` (and the bundled loading page) get no bridge.
pub fn render_bootstrap_script(debug_enabled: bool, trusted_origins: &[Url]) -> String {
    let origins = origin_policy::trusted_origin_strings(trusted_origins);
    DESKTOP_BRIDGE_BOOTSTRAP_TEMPLATE
        .replace("{BRIDGE_BRAND}", &js_literal(DESKTOP_BRIDGE_BRAND, "\"\""))
        .replace("{TRUSTED_ORIGINS}", &js_literal(&origins, "[]"))
        .replace("{DEBUG_ENABLED}", if debug_enabled { "true" } else { "false" })
}

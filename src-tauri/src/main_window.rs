use std::time::Duration;

use serde::Serialize;
use tauri::{AppHandle, Manager, WebviewUrl, WebviewWindow, WebviewWindowBuilder};
use url::Url;

use crate::{backend_readiness::Clock, startup_error::StartupError};

pub const MAIN_WINDOW_LABEL: &str = "main";
pub const MAIN_WINDOW_TITLE: &str = "WeChatDataAnalysis";
pub const LOADING_PAGE: &str = "index.html";

const DEFAULT_WIDTH: f64 = 1200.0;
const DEFAULT_HEIGHT: f64 = 800.0;
const MIN_WIDTH: f64 = 980.0;
const MIN_HEIGHT: f64 = 700.0;

pub const LOAD_RETRY_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct WindowOptions {
    pub title: String,
    pub debug_enabled: bool,
    /// Runs before page scripts on every navigation of the main window.
    pub init_script: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowSession {
    pub label: String,
    pub maximized: bool,
    pub debug_enabled: bool,
}

/// Frameless main window showing the bundled loading page until the real UI
/// is navigated to.
pub fn create_main_window(
    app_handle: &AppHandle,
    options: &WindowOptions,
) -> Result<WindowSession, StartupError> {
    if let Some(existing) = app_handle.get_webview_window(MAIN_WINDOW_LABEL) {
        return Ok(WindowSession {
            label: existing.label().to_string(),
            maximized: existing.is_maximized().unwrap_or(false),
            debug_enabled: options.debug_enabled,
        });
    }

    let window = WebviewWindowBuilder::new(
        app_handle,
        MAIN_WINDOW_LABEL,
        WebviewUrl::App(LOADING_PAGE.into()),
    )
    .title(&options.title)
    .inner_size(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    .min_inner_size(MIN_WIDTH, MIN_HEIGHT)
    .decorations(false)
    .center()
    .devtools(options.debug_enabled)
    .initialization_script(options.init_script.as_str())
    .build()
    .map_err(|error| StartupError::WindowCreation(error.to_string()))?;

    Ok(WindowSession {
        label: window.label().to_string(),
        maximized: false,
        debug_enabled: options.debug_enabled,
    })
}

pub fn main_window(app_handle: &AppHandle) -> Result<WebviewWindow, String> {
    app_handle
        .get_webview_window(MAIN_WINDOW_LABEL)
        .ok_or_else(|| "main window is unavailable".to_string())
}

pub fn navigate_main_window(app_handle: &AppHandle, url: &Url) -> Result<(), String> {
    main_window(app_handle)?
        .navigate(url.clone())
        .map_err(|error| format!("failed to navigate main window to {url}: {error}"))
}

pub fn toggle_devtools(window: &WebviewWindow) {
    if window.is_devtools_open() {
        window.close_devtools();
    } else {
        window.open_devtools();
    }
}

#[derive(Debug, Clone)]
pub struct LoadPolicy {
    pub url: Url,
    pub retry_interval: Duration,
    pub max_wait: Duration,
}

impl LoadPolicy {
    pub fn new(url: Url, max_wait_ms: u64) -> Self {
        Self {
            url,
            retry_interval: Duration::from_millis(LOAD_RETRY_INTERVAL_MS),
            max_wait: Duration::from_millis(max_wait_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Retries `attempt` until it succeeds once or `policy.max_wait` passes.
pub fn load_initial_content<A, C, F>(
    mut attempt: A,
    clock: &C,
    policy: &LoadPolicy,
    log: F,
) -> Result<LoadOutcome, StartupError>
where
    A: FnMut(&Url) -> Result<(), String>,
    C: Clock + ?Sized,
    F: Fn(&str),
{
    let started = clock.now();
    let mut attempts = 0_u32;
    loop {
        attempts += 1;
        let result = attempt(&policy.url);
        let elapsed = clock.now().saturating_duration_since(started);
        match result {
            Ok(()) => {
                log(&format!(
                    "loaded {} after {attempts} attempt(s), elapsed_ms={}",
                    policy.url,
                    elapsed.as_millis()
                ));
                return Ok(LoadOutcome { attempts, elapsed });
            }
            Err(error) => {
                if elapsed >= policy.max_wait {
                    return Err(StartupError::LoadTimeout {
                        url: policy.url.to_string(),
                        elapsed_ms: elapsed.as_millis(),
                        last_error: error,
                    });
                }
                log(&format!(
                    "load attempt {attempts} for {} failed, retrying in {}ms: {error}",
                    policy.url,
                    policy.retry_interval.as_millis()
                ));
                clock.sleep(policy.retry_interval);
            }
        }
    }
}

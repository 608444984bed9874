use std::{sync::mpsc, time::Duration};

use tauri::{AppHandle, Manager};

use crate::{startup_error::StartupError, DesktopState};

const MAIN_THREAD_REPLY_TIMEOUT: Duration = Duration::from_secs(15);

pub fn run_on_main_thread_dispatch<F>(
    app_handle: &AppHandle,
    task_name: &str,
    task: F,
) -> Result<(), String>
where
    F: FnOnce(&AppHandle) + Send + 'static,
{
    let app_handle_for_thread = app_handle.clone();
    app_handle
        .run_on_main_thread(move || {
            task(&app_handle_for_thread);
        })
        .map_err(|error| format!("Failed to dispatch '{task_name}' on main thread: {error}"))
}

/// Runs `task` on the main thread and waits for its result. Must not be
/// called from the main thread itself.
pub fn run_on_main_thread_blocking<T, F>(
    app_handle: &AppHandle,
    task_name: &str,
    task: F,
) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce(&AppHandle) -> T + Send + 'static,
{
    let (sender, receiver) = mpsc::sync_channel(1);
    run_on_main_thread_dispatch(app_handle, task_name, move |main_app| {
        let _ = sender.send(task(main_app));
    })?;
    receiver
        .recv_timeout(MAIN_THREAD_REPLY_TIMEOUT)
        .map_err(|error| format!("No reply from main thread for '{task_name}': {error}"))
}

/// Reports a fatal startup error and exits with its code. The coordinator has
/// already stopped the backend by the time this runs.
pub fn show_startup_error<F>(app_handle: &AppHandle, error: &StartupError, log: F)
where
    F: Fn(&str),
{
    let exit_code = error.exit_code();
    let state = app_handle.state::<DesktopState>();
    log(&format!("startup error (exit code {exit_code}): {error}"));
    if let Some(report) = state.supervisor.last_exit() {
        log(&format!(
            "backend had already exited: pid={}, code={:?}, signal={:?}",
            report.pid, report.code, report.signal
        ));
    }
    eprintln!("WeChatDataAnalysis startup failed: {error}");
    state.lifecycle.allow_next_exit_request();
    app_handle.exit(exit_code);
}

pub fn show_startup_error_on_main_thread<F>(app_handle: &AppHandle, error: StartupError, log: F)
where
    F: Fn(&str) + Copy + Send + 'static,
{
    let message = error.to_string();
    let exit_code = error.exit_code();
    if let Err(dispatch_error) =
        run_on_main_thread_dispatch(app_handle, "show startup error", move |main_app| {
            show_startup_error(main_app, &error, log);
        })
    {
        log(&format!(
            "failed to dispatch startup error to main thread: {dispatch_error}; original: {message}"
        ));
        app_handle.exit(exit_code);
    }
}

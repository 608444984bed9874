use tauri::{AppHandle, Emitter, Manager};

use crate::{
    append_desktop_log, append_shutdown_log,
    backend_supervisor::ExitReport,
    lifecycle::{BackendExitKind, ShutdownTrigger},
    main_window::{WindowSession, MAIN_WINDOW_LABEL},
    DesktopState, BACKEND_EXITED_EVENT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitRequestedDecision {
    AllowImmediateExit,
    StopBackendFirst,
}

fn decide_exit_requested_flow(has_exit_request_allowance: bool) -> ExitRequestedDecision {
    if has_exit_request_allowance {
        ExitRequestedDecision::AllowImmediateExit
    } else {
        ExitRequestedDecision::StopBackendFirst
    }
}

/// The runtime exits with `requested` (0 when the last window closed); a
/// failed run must leave with its own code instead.
fn exit_code_override(requested: Option<i32>, lifecycle_exit_code: i32) -> Option<i32> {
    if requested.unwrap_or(0) == lifecycle_exit_code {
        None
    } else {
        Some(lifecycle_exit_code)
    }
}

fn describe_destroyed_window(session: Option<&WindowSession>, backend_live: bool) -> String {
    match session {
        Some(session) => format!(
            "main window destroyed: label={}, maximized={}, debug={}, backend_live={backend_live}",
            session.label, session.maximized, session.debug_enabled
        ),
        None => format!("main window destroyed before startup finished: backend_live={backend_live}"),
    }
}

pub fn handle_main_window_destroyed(app_handle: &AppHandle) {
    let state = app_handle.state::<DesktopState>();
    let session = state.lock_session().take();
    append_shutdown_log(&describe_destroyed_window(
        session.as_ref(),
        state.supervisor.is_live(),
    ));
    // Synchronous so the stop is issued before the ExitRequested that follows.
    state
        .lifecycle
        .request_shutdown(ShutdownTrigger::WindowDestroyed, &state.supervisor);
}

pub fn handle_exit_requested(
    app_handle: &AppHandle,
    requested_code: Option<i32>,
    api: &tauri::ExitRequestApi,
) {
    let state = app_handle.state::<DesktopState>();
    match decide_exit_requested_flow(state.lifecycle.take_exit_request_allowance()) {
        ExitRequestedDecision::AllowImmediateExit => {
            append_shutdown_log("exit request allowed to pass through after backend cleanup");
            return;
        }
        ExitRequestedDecision::StopBackendFirst => {}
    }

    state
        .lifecycle
        .request_shutdown(ShutdownTrigger::ExitRequested, &state.supervisor);

    if let Some(exit_code) = exit_code_override(requested_code, state.lifecycle.exit_code()) {
        api.prevent_exit();
        append_shutdown_log(&format!("re-issuing exit with code {exit_code}"));
        state.lifecycle.allow_next_exit_request();
        app_handle.exit(exit_code);
    }
}

pub fn handle_exit_event(app_handle: &AppHandle) {
    let state = app_handle.state::<DesktopState>();
    if state
        .lifecycle
        .request_shutdown(ShutdownTrigger::RuntimeExit, &state.supervisor)
    {
        append_shutdown_log("exit event triggered fallback backend cleanup");
    }
}

/// Exit observer: a backend dying on its own while the UI is up is reported
/// to the page; the shell keeps running.
pub fn handle_backend_exit(app_handle: &AppHandle, report: &ExitReport) {
    let state = app_handle.state::<DesktopState>();
    if state.lifecycle.classify_backend_exit(report) != BackendExitKind::WhileRunning {
        return;
    }
    if let Err(error) = app_handle.emit_to(MAIN_WINDOW_LABEL, BACKEND_EXITED_EVENT, *report) {
        append_desktop_log(&format!("failed to emit {BACKEND_EXITED_EVENT}: {error}"));
    }
}

use tauri::{Manager, State, WebviewWindow};

use crate::{
    app_helpers, main_window, origin_policy,
    renderer_console::{self, RendererConsoleEntry},
    DesktopState,
};

// Every command acts on the window that invoked it; the page never names a
// target window.

fn ensure_trusted_caller(window: &WebviewWindow, state: &DesktopState) -> Result<(), String> {
    let page_url = window
        .url()
        .map_err(|error| format!("failed to read caller page url: {error}"))?;
    if origin_policy::is_trusted_page(&state.trusted_origins, &page_url) {
        Ok(())
    } else {
        Err(format!(
            "page {} may not use the desktop bridge",
            page_url.origin().ascii_serialization()
        ))
    }
}

fn record_maximized(state: &DesktopState, maximized: bool) {
    if let Some(session) = state.lock_session().as_mut() {
        session.maximized = maximized;
    }
}

#[tauri::command]
pub(crate) fn window_minimize(
    window: WebviewWindow,
    state: State<'_, DesktopState>,
) -> Result<(), String> {
    ensure_trusted_caller(&window, &state)?;
    window
        .minimize()
        .map_err(|error| format!("failed to minimize window: {error}"))
}

#[tauri::command]
pub(crate) fn window_toggle_maximize(
    window: WebviewWindow,
    state: State<'_, DesktopState>,
) -> Result<bool, String> {
    ensure_trusted_caller(&window, &state)?;
    let maximized = window
        .is_maximized()
        .map_err(|error| format!("failed to query window state: {error}"))?;
    let result = if maximized {
        window.unmaximize()
    } else {
        window.maximize()
    };
    result.map_err(|error| format!("failed to toggle maximize: {error}"))?;

    let now_maximized = !maximized;
    record_maximized(&state, now_maximized);
    Ok(now_maximized)
}

#[tauri::command]
pub(crate) fn window_close(
    window: WebviewWindow,
    state: State<'_, DesktopState>,
) -> Result<(), String> {
    ensure_trusted_caller(&window, &state)?;
    window
        .close()
        .map_err(|error| format!("failed to close window: {error}"))
}

#[tauri::command]
pub(crate) fn window_is_maximized(
    window: WebviewWindow,
    state: State<'_, DesktopState>,
) -> Result<bool, String> {
    ensure_trusted_caller(&window, &state)?;
    // The user can also maximize by double-clicking the drag region.
    let maximized = window
        .is_maximized()
        .map_err(|error| format!("failed to query window state: {error}"))?;
    record_maximized(&state, maximized);
    Ok(maximized)
}

#[tauri::command]
pub(crate) fn window_toggle_devtools(
    window: WebviewWindow,
    state: State<'_, DesktopState>,
) -> Result<(), String> {
    ensure_trusted_caller(&window, &state)?;
    if !state.config.debug_enabled {
        return Err("devtools are disabled outside debug mode".to_string());
    }
    main_window::toggle_devtools(&window);
    Ok(())
}

#[tauri::command]
pub(crate) fn renderer_console_log(
    window: WebviewWindow,
    state: State<'_, DesktopState>,
    entry: RendererConsoleEntry,
) -> Result<(), String> {
    if !state.config.debug_enabled {
        return Ok(());
    }
    ensure_trusted_caller(&window, &state)?;
    renderer_console::append_renderer_console_entry(&app_helpers::renderer_console_path(), &entry)
}

#[tauri::command]
pub(crate) fn desktop_get_version(
    window: WebviewWindow,
    state: State<'_, DesktopState>,
) -> Result<String, String> {
    ensure_trusted_caller(&window, &state)?;
    Ok(window.app_handle().package_info().version.to_string())
}

#[tauri::command]
pub(crate) fn desktop_get_backend_port(
    window: WebviewWindow,
    state: State<'_, DesktopState>,
) -> Result<u16, String> {
    ensure_trusted_caller(&window, &state)?;
    Ok(state.config.port)
}

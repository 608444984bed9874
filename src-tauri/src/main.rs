#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app_helpers;
mod backend_http;
mod backend_path;
mod backend_readiness;
mod backend_supervisor;
mod desktop_bridge;
mod desktop_bridge_commands;
mod exit_events;
mod http_response;
mod launch_plan;
mod lifecycle;
mod logging;
mod main_window;
mod origin_policy;
mod process_control;
mod renderer_console;
mod runtime_paths;
mod shell_config;
mod startup_error;
mod startup_task;
mod ui_dispatch;

use std::sync::{Mutex, MutexGuard};

use tauri::{webview::PageLoadEvent, Manager, RunEvent, WindowEvent};
use url::Url;

use app_helpers::{append_desktop_log, append_shutdown_log, append_startup_log};
use backend_supervisor::ProcessSupervisor;
use desktop_bridge_commands::{
    desktop_get_backend_port, desktop_get_version, renderer_console_log, window_close,
    window_is_maximized, window_minimize, window_toggle_devtools, window_toggle_maximize,
};
use lifecycle::LifecycleCoordinator;
use main_window::{WindowSession, MAIN_WINDOW_LABEL};
use shell_config::ShellConfig;
use startup_error::StartupError;

const DESKTOP_LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
const BACKEND_LOG_MAX_BYTES: u64 = 20 * 1024 * 1024;
const LOG_BACKUP_COUNT: usize = 5;
const DESKTOP_LOG_FILE: &str = "desktop.log";
const BACKEND_EXITED_EVENT: &str = "backend://exited";
#[cfg(target_os = "windows")]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

pub(crate) struct DesktopState {
    pub(crate) config: ShellConfig,
    pub(crate) health_url: Url,
    pub(crate) start_url: Url,
    /// Origins whose pages receive the desktop bridge.
    pub(crate) trusted_origins: Vec<Url>,
    pub(crate) supervisor: ProcessSupervisor,
    pub(crate) lifecycle: LifecycleCoordinator,
    session: Mutex<Option<WindowSession>>,
}

impl DesktopState {
    fn from_config(config: ShellConfig) -> Result<Self, StartupError> {
        let backend_url = config.backend_base_url()?;
        let health_url = config.health_url()?;
        let start_url = config.start_url()?;
        let mut trusted_origins = vec![backend_url];
        if !trusted_origins
            .iter()
            .any(|trusted| origin_policy::shares_trusted_origin(trusted, &start_url))
        {
            trusted_origins.push(start_url.clone());
        }

        Ok(Self {
            config,
            health_url,
            start_url,
            trusted_origins,
            supervisor: ProcessSupervisor::new(append_shutdown_log),
            lifecycle: LifecycleCoordinator::new(append_startup_log),
            session: Mutex::new(None),
        })
    }

    pub(crate) fn lock_session(&self) -> MutexGuard<'_, Option<WindowSession>> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn load_desktop_state() -> Result<DesktopState, StartupError> {
    let config = ShellConfig::from_env(|message| append_startup_log(&message))?;
    DesktopState::from_config(config)
}

fn main() {
    append_startup_log("desktop process starting");

    let state = match load_desktop_state() {
        Ok(state) => state,
        Err(error) => {
            append_startup_log(&format!("invalid configuration: {error}"));
            eprintln!("WeChatDataAnalysis startup failed: {error}");
            std::process::exit(error.exit_code());
        }
    };
    append_startup_log(&format!(
        "mode={}, backend={}, start_url={}, debug={}",
        state.config.mode.as_str(),
        state.health_url,
        state.start_url,
        state.config.debug_enabled
    ));

    tauri::Builder::default()
        .manage(state)
        .invoke_handler(tauri::generate_handler![
            window_minimize,
            window_toggle_maximize,
            window_close,
            window_is_maximized,
            window_toggle_devtools,
            renderer_console_log,
            desktop_get_version,
            desktop_get_backend_port
        ])
        .on_window_event(|window, event| {
            if window.label() != MAIN_WINDOW_LABEL {
                return;
            }
            if let WindowEvent::Destroyed = event {
                exit_events::handle_main_window_destroyed(window.app_handle());
            }
        })
        .on_page_load(|_webview, payload| {
            let stage = match payload.event() {
                PageLoadEvent::Started => "started",
                PageLoadEvent::Finished => "finished",
            };
            append_desktop_log(&format!("page-load {stage}: {}", payload.url()));
        })
        .setup(|app| {
            let app_handle = app.handle().clone();
            let state = app_handle.state::<DesktopState>();
            match runtime_paths::resolve_user_data_dir(
                &app_handle,
                state.config.data_dir_override.as_deref(),
            ) {
                Some(data_dir) => runtime_paths::remember_user_data_dir(data_dir),
                None => append_startup_log("per-user data directory is unavailable"),
            }
            append_startup_log(&format!(
                "desktop log path: {}",
                logging::resolve_desktop_log_path(runtime_paths::user_data_dir(), DESKTOP_LOG_FILE)
                    .display()
            ));

            let observer_handle = app_handle.clone();
            state.supervisor.on_exit(move |report| {
                exit_events::handle_backend_exit(&observer_handle, report);
            });

            startup_task::spawn_startup_task(app_handle.clone(), append_startup_log);
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app_handle, event| match event {
            RunEvent::ExitRequested { code, api, .. } => {
                exit_events::handle_exit_requested(app_handle, code, &api);
            }
            RunEvent::Exit => {
                exit_events::handle_exit_event(app_handle);
            }
            _ => {}
        });
}

use std::time::Duration;

use tauri::{AppHandle, Manager};
use url::Url;

use crate::{
    app_helpers, append_startup_log, backend_http,
    backend_readiness::{ReadinessPolicy, SystemClock},
    desktop_bridge,
    launch_plan::{self, BackendLaunchSpec, LocatorPaths},
    lifecycle::{StartupOutcome, StartupPlan, WindowHost},
    main_window::{self, LoadPolicy, WindowOptions, WindowSession},
    renderer_console, runtime_paths,
    startup_error::StartupError,
    ui_dispatch, DesktopState,
};

const ORIGIN_CHECK_TIMEOUT: Duration = Duration::from_millis(1_000);

/// Main window driven from the startup worker; every webview call hops to
/// the main thread.
struct TauriWindowHost<'a> {
    app_handle: &'a AppHandle,
    options: WindowOptions,
}

impl WindowHost for TauriWindowHost<'_> {
    fn create_window(&self) -> Result<WindowSession, StartupError> {
        if self.options.debug_enabled {
            let console_path = app_helpers::renderer_console_path();
            if let Err(error) = renderer_console::append_session_header(&console_path) {
                append_startup_log(&format!("failed to open renderer console log: {error}"));
            }
        }
        let options = self.options.clone();
        ui_dispatch::run_on_main_thread_blocking(
            self.app_handle,
            "create main window",
            move |main_app| main_window::create_main_window(main_app, &options),
        )
        .map_err(StartupError::WindowCreation)
        .and_then(|result| result)
    }

    fn load(&self, url: &Url) -> Result<(), String> {
        // A webview navigation to a closed port does not fail, so check first.
        if !backend_http::is_origin_reachable(url, ORIGIN_CHECK_TIMEOUT) {
            return Err(format!(
                "{} is not accepting connections",
                url.origin().ascii_serialization()
            ));
        }
        let target = url.clone();
        ui_dispatch::run_on_main_thread_blocking(self.app_handle, "load start url", move |main_app| {
            main_window::navigate_main_window(main_app, &target)
        })
        .and_then(|result| result)
    }

    fn on_first_load(&self, session: &WindowSession) {
        if !session.debug_enabled {
            return;
        }
        if let Err(error) =
            ui_dispatch::run_on_main_thread_dispatch(self.app_handle, "open devtools", |main_app| {
                if let Ok(window) = main_window::main_window(main_app) {
                    window.open_devtools();
                }
            })
        {
            append_startup_log(&error);
        }
    }
}

fn run_startup(app_handle: &AppHandle) -> Result<StartupOutcome, StartupError> {
    let state = app_handle.state::<DesktopState>();
    let config = &state.config;
    let plan = StartupPlan {
        readiness: ReadinessPolicy::new(state.health_url.clone(), config.ready_timeout_ms),
        load: LoadPolicy::new(state.start_url.clone(), config.load_timeout_ms),
    };
    let window_host = TauriWindowHost {
        app_handle,
        options: WindowOptions {
            title: main_window::MAIN_WINDOW_TITLE.to_string(),
            debug_enabled: config.debug_enabled,
            init_script: desktop_bridge::render_bootstrap_script(
                config.debug_enabled,
                &state.trusted_origins,
            ),
        },
    };
    let locate = || -> Result<BackendLaunchSpec, StartupError> {
        let paths = LocatorPaths {
            resource_dir: runtime_paths::resource_dir(app_handle),
            user_data_dir: runtime_paths::user_data_dir(),
            project_root: runtime_paths::detect_project_root(
                config.project_root_override.as_deref(),
            ),
        };
        let spec = launch_plan::resolve_launch_spec(config, &paths, append_startup_log)?;
        append_startup_log(&format!(
            "backend launch resolved: mode={}, cmd={:?}, cwd={}",
            spec.mode.as_str(),
            spec.display_command(),
            spec.cwd.display()
        ));
        Ok(spec)
    };

    state.lifecycle.run_startup(
        locate,
        &state.supervisor,
        &window_host,
        &backend_http::HttpHealthProbe,
        &SystemClock,
        &plan,
    )
}

pub fn spawn_startup_task<F>(app_handle: AppHandle, log: F)
where
    F: Fn(&str) + Copy + Send + 'static,
{
    let startup_app_handle = app_handle.clone();
    tauri::async_runtime::spawn(async move {
        let startup_worker_handle = startup_app_handle.clone();
        let startup_result =
            tauri::async_runtime::spawn_blocking(move || run_startup(&startup_worker_handle))
                .await
                .map_err(|error| StartupError::Runtime(format!("startup worker failed: {error}")))
                .and_then(|result| result);

        match startup_result {
            Ok(StartupOutcome::Running(session)) => {
                log(&format!(
                    "main window running: label={}, debug={}",
                    session.label, session.debug_enabled
                ));
                let state = startup_app_handle.state::<DesktopState>();
                *state.lock_session() = Some(session);
            }
            Ok(StartupOutcome::Aborted) => {
                log("startup aborted: shutdown requested before the window was ready");
            }
            Err(error) => {
                // A worker panic never reached the coordinator; stop here.
                let state = startup_app_handle.state::<DesktopState>();
                if !state.lifecycle.is_shutdown_started() {
                    if let Err(error) = state.lifecycle.fail_startup(error, &state.supervisor) {
                        ui_dispatch::show_startup_error_on_main_thread(
                            &startup_app_handle,
                            error,
                            log,
                        );
                    }
                    return;
                }
                ui_dispatch::show_startup_error_on_main_thread(&startup_app_handle, error, log);
            }
        }
    });
}
